//! Binary entry point.
//!
//! Reads one analysis request as JSON on stdin, streams a JSON line per
//! stage snapshot on stdout, and logs to stderr. The final line carries
//! `"stage": "complete"` with the terminal session.
//!
//! Request shape:
//!
//! ```json
//! {
//!   "opportunity": { ... },
//!   "dataset": { ... },
//!   "feature_catalog": { ... },
//!   "business_context": "optional free text"
//! }
//! ```

use std::io::Read;
use std::sync::Arc;

use serde::Deserialize;

use retention_reasoning::config::Config;
use retention_reasoning::data::{DataTable, FeatureCatalog};
use retention_reasoning::domain::Opportunity;
use retention_reasoning::llm::{AnthropicClient, ClientConfig};
use retention_reasoning::pipeline::{CancelFlag, Engine};

/// One analysis request.
#[derive(Debug, Deserialize)]
struct AnalysisRequest {
    opportunity: Opportunity,
    dataset: DataTable,
    feature_catalog: FeatureCatalog,
    #[serde(default)]
    business_context: Option<String>,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout is reserved for snapshot JSON lines
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string())
                .parse()
                .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("retention-reasoning starting...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!("Configuration error: {error}");
            std::process::exit(1);
        }
    };

    let client_config = ClientConfig::default()
        .with_model(&config.model)
        .with_timeout_ms(config.request_timeout_ms)
        .with_max_retries(config.max_retries);
    let client = match AnthropicClient::new(config.api_key.clone(), client_config) {
        Ok(client) => client,
        Err(error) => {
            tracing::error!("Client error: {error}");
            std::process::exit(1);
        }
    };

    let mut raw = String::new();
    if let Err(error) = std::io::stdin().read_to_string(&mut raw) {
        tracing::error!("Could not read stdin: {error}");
        std::process::exit(1);
    }

    let request: AnalysisRequest = match serde_json::from_str(&raw) {
        Ok(request) => request,
        Err(error) => {
            tracing::error!("Invalid request JSON: {error}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        opportunity = %request.opportunity.title,
        rows = request.dataset.n_rows(),
        features = request.feature_catalog.len(),
        "Request accepted"
    );

    let engine = Arc::new(Engine::new(client));
    let mut snapshots = engine.analyze_streaming(
        request.opportunity,
        request.dataset,
        request.feature_catalog,
        request.business_context,
        CancelFlag::new(),
    );

    let mut exit_code = 0;
    while let Some(snapshot) = snapshots.recv().await {
        if snapshot.stage == "complete" {
            if let Some(envelope) = snapshot.session.error_envelope() {
                tracing::error!(envelope = %envelope, "Session failed");
                exit_code = 2;
            }
        }
        match serde_json::to_string(&snapshot) {
            Ok(line) => println!("{line}"),
            Err(error) => tracing::error!("Could not serialize snapshot: {error}"),
        }
    }

    tracing::info!("retention-reasoning shutdown complete");
    std::process::exit(exit_code);
}
