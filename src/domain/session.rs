//! The reasoning session: root record of one end-to-end analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hypothesis::{ConfidenceLevel, Hypothesis};
use crate::error::SessionError;

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Stages are still running.
    InProgress,
    /// All stages succeeded.
    Completed,
    /// A stage failed; `error_message` explains.
    Failed,
    /// The caller cancelled between stages.
    Cancelled,
}

impl SessionStatus {
    /// Whether the session can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Implementation effort for an intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    /// Days to a couple of weeks.
    Low,
    /// A few weeks.
    Medium,
    /// A quarter or more.
    High,
}

/// A recommended intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lever {
    /// Unique identifier.
    pub id: String,
    /// Short lever name.
    pub name: String,
    /// What to do.
    pub description: String,
    /// Expected fractional reduction of the outcome, in [0, 1].
    pub expected_impact: f64,
    /// Confidence in the estimate.
    pub confidence: ConfidenceLevel,
    /// Implementation effort.
    pub effort: Effort,
    /// Expected timeframe (free text).
    pub timeframe: String,
}

impl Lever {
    /// Create a lever.
    #[must_use]
    pub fn new(name: impl Into<String>, expected_impact: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            expected_impact: expected_impact.clamp(0.0, 1.0),
            confidence: ConfidenceLevel::Medium,
            effort: Effort::Medium,
            timeframe: String::new(),
        }
    }

    /// Ranking score: impact weighted by confidence.
    #[must_use]
    pub fn rank_score(&self) -> f64 {
        self.expected_impact * self.confidence.weight()
    }
}

/// One numbered step of the reasoning narrative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// 1-based step number.
    pub step_number: usize,
    /// The claim being made.
    pub claim: String,
    /// Evidence supporting the claim.
    pub evidence: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// How the evidence supports the claim.
    pub reasoning: String,
}

/// The ordered narrative justifying the recommended levers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningChain {
    /// Numbered steps.
    pub steps: Vec<ReasoningStep>,
    /// Concluding sentence.
    pub conclusion: String,
    /// The top-ranked lever name.
    pub primary_lever: String,
    /// The next-ranked lever names.
    pub secondary_levers: Vec<String>,
    /// Expected impact phrased for display.
    pub expected_impact: String,
    /// Overall confidence in [0, 1].
    pub overall_confidence: f64,
    /// Limitations the reader must know.
    pub caveats: Vec<String>,
}

/// Root record capturing one end-to-end analysis run.
///
/// Created by the orchestrator, mutated by each stage exclusively in stage
/// order, and frozen once a terminal status is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningSession {
    /// Unique identifier.
    pub id: String,
    /// The opportunity under analysis.
    pub opportunity_id: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the session reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// All hypotheses, in generation order.
    pub hypotheses: Vec<Hypothesis>,
    /// Derived: number of hypotheses.
    pub hypotheses_count: usize,
    /// Derived: number of validated hypotheses.
    pub validated_hypotheses_count: usize,
    /// Derived: deduplicated true causes of validated hypotheses.
    pub validated_causes: Vec<String>,
    /// Ranked interventions.
    pub recommended_levers: Vec<Lever>,
    /// The reasoning narrative.
    pub reasoning_chain: Option<ReasoningChain>,
    /// Mean structure confidence over validated hypotheses, in [0, 1].
    pub confidence_score: f64,
    /// Fraction of attempted tests that actually executed, in [0, 1].
    pub completeness_score: f64,
    /// Failure description for `failed` sessions.
    pub error_message: Option<String>,
    /// Stage where the failure occurred.
    pub failed_stage: Option<String>,
}

impl ReasoningSession {
    /// Create an in-progress session for an opportunity.
    #[must_use]
    pub fn new(opportunity_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            opportunity_id: opportunity_id.into(),
            status: SessionStatus::InProgress,
            started_at: Utc::now(),
            completed_at: None,
            hypotheses: Vec::new(),
            hypotheses_count: 0,
            validated_hypotheses_count: 0,
            validated_causes: Vec::new(),
            recommended_levers: Vec::new(),
            reasoning_chain: None,
            confidence_score: 0.0,
            completeness_score: 0.0,
            error_message: None,
            failed_stage: None,
        }
    }

    /// Guard for mutations: terminal sessions are frozen.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Terminal`] when the session has a terminal
    /// status.
    pub fn ensure_mutable(&self) -> Result<(), SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::Terminal {
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Recompute the derived counts, causes, and scores from the hypotheses.
    pub fn recompute_rollups(&mut self) {
        self.hypotheses_count = self.hypotheses.len();
        self.validated_hypotheses_count =
            self.hypotheses.iter().filter(|h| h.is_validated()).count();

        let mut causes: Vec<String> = Vec::new();
        for hypothesis in self.hypotheses.iter().filter(|h| h.is_validated()) {
            let cause = hypothesis.true_cause().to_string();
            if !causes.contains(&cause) {
                causes.push(cause);
            }
        }
        self.validated_causes = causes;

        let validated_confidences: Vec<f64> = self
            .hypotheses
            .iter()
            .filter(|h| h.is_validated())
            .filter_map(|h| h.causal_structure.as_ref())
            .map(|s| s.structure_confidence)
            .collect();
        self.confidence_score = mean_or_zero(&validated_confidences);

        let attempted: usize = self.hypotheses.iter().map(|h| h.test_results.len()).sum();
        let executed: usize = self
            .hypotheses
            .iter()
            .flat_map(|h| &h.test_results)
            .filter(|r| r.was_executed())
            .count();
        #[allow(clippy::cast_precision_loss)]
        let executed_fraction = executed as f64 / attempted.max(1) as f64;
        self.completeness_score = if attempted == 0 { 0.0 } else { executed_fraction };
    }

    /// Transition to `completed`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Terminal`] if the session is already terminal.
    pub fn complete(&mut self) -> Result<(), SessionError> {
        self.ensure_mutable()?;
        self.status = SessionStatus::Completed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Transition to `failed`, recording the stage and message.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Terminal`] if the session is already terminal.
    pub fn fail(
        &mut self,
        stage: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.ensure_mutable()?;
        let stage = stage.into();
        let message = message.into();
        self.error_message = Some(format!("{stage}: {message}"));
        self.failed_stage = Some(stage);
        self.status = SessionStatus::Failed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Transition to `cancelled`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Terminal`] if the session is already terminal.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        self.ensure_mutable()?;
        self.status = SessionStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Mutable access to a hypothesis by id.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::HypothesisNotFound`] for unknown ids.
    pub fn hypothesis_mut(&mut self, id: &str) -> Result<&mut Hypothesis, SessionError> {
        self.hypotheses
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| SessionError::HypothesisNotFound {
                hypothesis_id: id.to_string(),
            })
    }

    /// The error envelope for failed sessions, `None` otherwise.
    #[must_use]
    pub fn error_envelope(&self) -> Option<serde_json::Value> {
        if self.status != SessionStatus::Failed {
            return None;
        }
        Some(serde_json::json!({
            "status": "failed",
            "error_message": self.error_message.clone().unwrap_or_default(),
            "stage": self.failed_stage.clone().unwrap_or_default(),
        }))
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
