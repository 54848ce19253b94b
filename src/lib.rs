//! Causal Retention Reasoning Engine
//!
//! Given an opportunity (an observed deviation in a retention metric for
//! some cohort) and a tabular customer dataset, the engine produces
//! validated causal claims, ranked intervention levers, and a
//! human-readable reasoning chain.
//!
//! # Pipeline
//!
//! ```text
//! Opportunity + DataTable + FeatureCatalog
//!        │
//!        ▼
//!  profiler ─ generator ─ analyzer ─ tester ─ estimator ─ explainer
//!        │        (LLM)      (LLM)    (stats)              (LLM+fallback)
//!        ▼
//!  ReasoningSession (completed | failed | cancelled)
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use retention_reasoning::data::{DataTable, FeatureCatalog, FeatureSpec, SemanticType};
//! use retention_reasoning::domain::{Opportunity, OpportunityKind};
//! use retention_reasoning::llm::AnthropicClient;
//! use retention_reasoning::pipeline::Engine;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AnthropicClient::with_api_key("sk-ant-...")?;
//! let engine = Engine::new(client);
//!
//! let opportunity = Opportunity::new(OpportunityKind::ChurnSpike, "Referral churn", "churn_30d")
//!     .with_cohort("channel", "Referral")
//!     .with_values(0.15, 0.32)
//!     .with_sample_size(600);
//! let table = DataTable::new()
//!     .with_numeric("churn_30d", vec![Some(1.0), Some(0.0)])?
//!     .with_numeric("late_delivery", vec![Some(1.0), Some(0.0)])?;
//! let catalog = FeatureCatalog::new(vec![
//!     FeatureSpec::new("late_delivery", SemanticType::Binary),
//! ]);
//!
//! let session = engine.analyze(&opportunity, &table, &catalog, None).await;
//! println!("status: {}", session.status);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod stages;
pub mod stats;
pub mod traits;
