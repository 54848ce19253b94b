//! Pipeline orchestrator.
//!
//! Threads one [`ReasoningSession`] through the five stages in strict
//! order, catching stage errors into the session record, checking the
//! cancel flag between stages, and emitting a snapshot after every stage
//! for downstream consumers.
//!
//! ```text
//! in_progress -> completed    (all stages succeed)
//! in_progress -> failed       (data quality / generator / analyzer error)
//! in_progress -> cancelled    (cancel flag set between stages)
//! ```
//!
//! Terminal statuses freeze the record. There is no orchestrator-level
//! retry; retries live inside individual stages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::data::{DataProfile, DataTable, FeatureCatalog};
use crate::domain::{Opportunity, ReasoningSession};
use crate::stages::{
    analyze_confounders, estimate_levers, generate_explanation, generate_hypotheses,
    run_causal_tests,
};
use crate::traits::LlmClientTrait;

/// Stage names as they appear in snapshots and error envelopes.
pub mod stage_names {
    /// Data profiling (pre-stage gate).
    pub const PROFILER: &str = "profiler";
    /// Hypothesis generation.
    pub const GENERATOR: &str = "generator";
    /// Confounder analysis.
    pub const ANALYZER: &str = "analyzer";
    /// Causal testing.
    pub const TESTER: &str = "tester";
    /// Lever estimation.
    pub const ESTIMATOR: &str = "estimator";
    /// Explanation generation.
    pub const EXPLAINER: &str = "explainer";
    /// Terminal snapshot.
    pub const COMPLETE: &str = "complete";
}

/// Session-scoped cancellation flag.
///
/// Setting the flag does not interrupt an in-flight stage; the session
/// transitions to `cancelled` at the next stage boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One snapshot of the session after a stage boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSnapshot {
    /// The stage that just finished.
    pub stage: String,
    /// The session as of that boundary.
    pub session: ReasoningSession,
}

/// The reasoning engine: an injected LLM client plus analysis parameters.
///
/// One engine serves any number of independent sessions; it holds no
/// cross-session state.
#[derive(Debug)]
pub struct Engine<C: LlmClientTrait> {
    client: C,
    config: EngineConfig,
}

impl<C: LlmClientTrait> Engine<C> {
    /// Create an engine with default analysis parameters.
    pub fn new(client: C) -> Self {
        Self {
            client,
            config: EngineConfig::default(),
        }
    }

    /// Create an engine with explicit parameters.
    pub fn with_config(client: C, config: EngineConfig) -> Self {
        Self { client, config }
    }

    /// The analysis parameters.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a full analysis to a terminal session.
    pub async fn analyze(
        &self,
        opportunity: &Opportunity,
        table: &DataTable,
        catalog: &FeatureCatalog,
        business_context: Option<&str>,
    ) -> ReasoningSession {
        self.analyze_observed(
            opportunity,
            table,
            catalog,
            business_context,
            &CancelFlag::new(),
            None,
        )
        .await
    }

    /// Run a full analysis with cancellation support.
    pub async fn analyze_with_cancel(
        &self,
        opportunity: &Opportunity,
        table: &DataTable,
        catalog: &FeatureCatalog,
        business_context: Option<&str>,
        cancel: &CancelFlag,
    ) -> ReasoningSession {
        self.analyze_observed(opportunity, table, catalog, business_context, cancel, None)
            .await
    }

    /// Core driver: stages in order, snapshots at each boundary.
    async fn analyze_observed(
        &self,
        opportunity: &Opportunity,
        table: &DataTable,
        catalog: &FeatureCatalog,
        business_context: Option<&str>,
        cancel: &CancelFlag,
        observer: Option<&mpsc::Sender<StageSnapshot>>,
    ) -> ReasoningSession {
        let mut session = ReasoningSession::new(&opportunity.id);
        tracing::info!(
            session_id = %session.id,
            opportunity = %opportunity.title,
            metric = %opportunity.metric,
            "Analysis started"
        );

        // Data-quality gate before any hypothesis generation
        let profile = match DataProfile::profile(table, catalog, &opportunity.metric) {
            Ok(profile) => profile,
            Err(error) => {
                record_failure(&mut session, stage_names::PROFILER, &error.to_string());
                emit(observer, stage_names::COMPLETE, &session).await;
                return session;
            }
        };
        emit(observer, stage_names::PROFILER, &session).await;

        // Stage 1: hypothesis generation
        if check_cancel(cancel, &mut session) {
            emit(observer, stage_names::COMPLETE, &session).await;
            return session;
        }
        if let Err(error) = generate_hypotheses(
            &self.client,
            &self.config,
            opportunity,
            &profile,
            table,
            business_context,
            &mut session,
        )
        .await
        {
            record_failure(&mut session, stage_names::GENERATOR, &error.to_string());
            emit(observer, stage_names::COMPLETE, &session).await;
            return session;
        }
        emit(observer, stage_names::GENERATOR, &session).await;

        // Stage 2: confounder analysis
        if check_cancel(cancel, &mut session) {
            emit(observer, stage_names::COMPLETE, &session).await;
            return session;
        }
        if let Err(error) =
            analyze_confounders(&self.client, &self.config, &profile, table, &mut session).await
        {
            record_failure(&mut session, stage_names::ANALYZER, &error.to_string());
            emit(observer, stage_names::COMPLETE, &session).await;
            return session;
        }
        emit(observer, stage_names::ANALYZER, &session).await;

        // Stage 3: causal testing
        if check_cancel(cancel, &mut session) {
            emit(observer, stage_names::COMPLETE, &session).await;
            return session;
        }
        if let Err(error) = run_causal_tests(&self.config, table, &mut session) {
            record_failure(&mut session, stage_names::TESTER, &error.to_string());
            emit(observer, stage_names::COMPLETE, &session).await;
            return session;
        }
        emit(observer, stage_names::TESTER, &session).await;

        // Stage 4: lever estimation
        if check_cancel(cancel, &mut session) {
            emit(observer, stage_names::COMPLETE, &session).await;
            return session;
        }
        if let Err(error) = estimate_levers(&mut session) {
            record_failure(&mut session, stage_names::ESTIMATOR, &error.to_string());
            emit(observer, stage_names::COMPLETE, &session).await;
            return session;
        }
        emit(observer, stage_names::ESTIMATOR, &session).await;

        // Stage 5: explanation (never fails; deterministic fallback inside)
        if check_cancel(cancel, &mut session) {
            emit(observer, stage_names::COMPLETE, &session).await;
            return session;
        }
        generate_explanation(&self.client, opportunity, &profile, &mut session).await;
        emit(observer, stage_names::EXPLAINER, &session).await;

        if let Err(error) = session.complete() {
            tracing::error!(error = %error, "Could not complete session");
        }
        tracing::info!(
            session_id = %session.id,
            status = %session.status,
            validated = session.validated_hypotheses_count,
            "Analysis finished"
        );
        emit(observer, stage_names::COMPLETE, &session).await;
        session
    }
}

impl<C: LlmClientTrait + 'static> Engine<C> {
    /// Streaming variant: runs the analysis on a background task and
    /// yields a [`StageSnapshot`] after every stage, ending with a
    /// `complete` envelope carrying the terminal session.
    #[must_use]
    pub fn analyze_streaming(
        self: Arc<Self>,
        opportunity: Opportunity,
        table: DataTable,
        catalog: FeatureCatalog,
        business_context: Option<String>,
        cancel: CancelFlag,
    ) -> mpsc::Receiver<StageSnapshot> {
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let _session = self
                .analyze_observed(
                    &opportunity,
                    &table,
                    &catalog,
                    business_context.as_deref(),
                    &cancel,
                    Some(&tx),
                )
                .await;
            // Receiver sees the terminal session in the final envelope
        });

        rx
    }
}

fn record_failure(session: &mut ReasoningSession, stage: &str, message: &str) {
    tracing::error!(stage, message, "Stage failed");
    if let Err(error) = session.fail(stage, message) {
        tracing::error!(error = %error, "Could not record stage failure");
    }
}

fn check_cancel(cancel: &CancelFlag, session: &mut ReasoningSession) -> bool {
    if !cancel.is_cancelled() {
        return false;
    }
    tracing::info!(session_id = %session.id, "Cancellation requested, stopping at stage boundary");
    if let Err(error) = session.cancel() {
        tracing::error!(error = %error, "Could not cancel session");
    }
    true
}

async fn emit(
    observer: Option<&mpsc::Sender<StageSnapshot>>,
    stage: &str,
    session: &ReasoningSession,
) {
    if let Some(tx) = observer {
        let snapshot = StageSnapshot {
            stage: stage.to_string(),
            session: session.clone(),
        };
        if tx.send(snapshot).await.is_err() {
            tracing::debug!(stage, "Snapshot receiver dropped");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::data::{FeatureSpec, SemanticType};
    use crate::domain::{OpportunityKind, SessionStatus};
    use crate::traits::{CompletionResponse, MockLlmClientTrait, Usage};

    fn table() -> DataTable {
        let n = 120;
        let churn: Vec<Option<f64>> = (0..n).map(|i| Some(f64::from(u8::from(i % 2 == 0)))).collect();
        let late: Vec<Option<f64>> = (0..n).map(|i| Some(f64::from(u8::from(i % 2 == 0)))).collect();
        DataTable::new()
            .with_numeric("churn_30d", churn)
            .unwrap()
            .with_numeric("late_delivery", late)
            .unwrap()
    }

    fn catalog() -> FeatureCatalog {
        FeatureCatalog::new(vec![FeatureSpec::new("late_delivery", SemanticType::Binary)])
    }

    fn opportunity() -> Opportunity {
        Opportunity::new(OpportunityKind::ChurnSpike, "Spike", "churn_30d")
            .with_values(0.15, 0.32)
            .with_sample_size(120)
    }

    #[tokio::test]
    async fn test_profiler_failure_fails_session() {
        let mock = MockLlmClientTrait::new();
        let engine = Engine::new(mock);

        let bad_opportunity =
            Opportunity::new(OpportunityKind::ChurnSpike, "Spike", "missing_metric");
        let session = engine
            .analyze(&bad_opportunity, &table(), &catalog(), None)
            .await;

        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.failed_stage.as_deref(), Some("profiler"));
        assert!(session
            .error_message
            .as_deref()
            .unwrap()
            .contains("missing_metric"));
        assert!(session.error_envelope().is_some());
    }

    #[tokio::test]
    async fn test_cancel_before_first_stage() {
        let mock = MockLlmClientTrait::new();
        let engine = Engine::new(mock);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let session = engine
            .analyze_with_cancel(&opportunity(), &table(), &catalog(), None, &cancel)
            .await;

        assert_eq!(session.status, SessionStatus::Cancelled);
        assert!(session.hypotheses.is_empty());
        assert!(session.reasoning_chain.is_none());
    }

    #[tokio::test]
    async fn test_generator_failure_reported_with_stage_name() {
        let mut mock = MockLlmClientTrait::new();
        mock.expect_complete()
            .returning(|_, _| Ok(CompletionResponse::new("nonsense", Usage::new(1, 1))));
        let engine = Engine::new(mock);

        let session = engine.analyze(&opportunity(), &table(), &catalog(), None).await;

        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.failed_stage.as_deref(), Some("generator"));
        let envelope = session.error_envelope().unwrap();
        assert_eq!(envelope["stage"], "generator");
    }

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let cloned = flag.clone();
        assert!(!cloned.is_cancelled());
        flag.cancel();
        assert!(cloned.is_cancelled());
    }

    #[test]
    fn test_snapshot_serializes_with_stage_and_session() {
        let snapshot = StageSnapshot {
            stage: stage_names::GENERATOR.to_string(),
            session: ReasoningSession::new("opp-1"),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["stage"], "generator");
        assert_eq!(json["session"]["status"], "in_progress");
    }
}
