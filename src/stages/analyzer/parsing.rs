//! Draft types and DAG assembly for the confounder analyzer.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::domain::{CausalStructure, DagEdge, DagNode, EdgeRole, Hypothesis};

/// Top-level analyzer response.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AnalyzerDraft {
    /// One classification per candidate variable.
    pub classifications: Vec<ClassificationDraft>,
    /// The deepest driver behind the deviation.
    pub true_cause: String,
    /// The stated surface cause.
    #[serde(default)]
    pub proximate_cause: String,
    /// Imperative intervention on the true cause.
    #[serde(default)]
    pub actionable_lever: String,
    /// Confidence in the structure, in [0, 1].
    pub structure_confidence: f64,
}

/// Causal role of one candidate variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleDraft {
    /// Influences both cause and effect.
    Confounder,
    /// On the path from cause to effect.
    Mediator,
    /// Caused by both cause and effect.
    Collider,
    /// None of the above.
    Irrelevant,
}

/// Classification of a single variable.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ClassificationDraft {
    /// The candidate variable name.
    pub variable: String,
    /// Its causal role.
    pub role: RoleDraft,
    /// Why.
    #[serde(default)]
    pub reasoning: String,
}

/// Assemble the causal structure and DAG from a validated draft.
///
/// Classifications naming variables outside the candidate list are ignored
/// with a warning; an out-of-band `true_cause` falls back to the deepest
/// mediator or the stated cause.
#[must_use]
pub fn build_structure(
    hypothesis: &Hypothesis,
    draft: &AnalyzerDraft,
    candidates: &[String],
) -> CausalStructure {
    let mut structure = CausalStructure::initial(&hypothesis.cause);

    for classification in &draft.classifications {
        if !candidates.contains(&classification.variable) {
            tracing::warn!(
                variable = %classification.variable,
                "Classification for a variable outside the candidate list, ignoring"
            );
            continue;
        }
        let target = classification.variable.clone();
        match classification.role {
            RoleDraft::Confounder => structure.confounders.push(target),
            RoleDraft::Mediator => structure.mediators.push(target),
            RoleDraft::Collider => structure.colliders.push(target),
            RoleDraft::Irrelevant => {}
        }
    }

    structure.true_cause = if draft.true_cause == hypothesis.cause
        || structure.mediators.contains(&draft.true_cause)
    {
        draft.true_cause.clone()
    } else {
        structure
            .mediators
            .last()
            .cloned()
            .unwrap_or_else(|| hypothesis.cause.clone())
    };

    structure.actionable_lever = if draft.actionable_lever.trim().is_empty() {
        format!("Address {}", structure.true_cause)
    } else {
        draft.actionable_lever.clone()
    };

    structure.structure_confidence = draft.structure_confidence.clamp(0.0, 1.0);

    let (nodes, edges) = build_dag(hypothesis, &structure);
    structure.nodes = nodes;
    structure.edges = edges;

    structure
}

/// DAG layout: one node per classified variable plus cause and effect.
fn build_dag(hypothesis: &Hypothesis, structure: &CausalStructure) -> (Vec<DagNode>, Vec<DagEdge>) {
    let cause = hypothesis.cause.as_str();
    let effect = hypothesis.effect.as_str();

    let mut nodes = vec![DagNode::new(cause), DagNode::new(effect)];
    let mut edges = vec![DagEdge::new(cause, effect, EdgeRole::Cause)];

    for confounder in &structure.confounders {
        nodes.push(DagNode::new(confounder));
        edges.push(DagEdge::new(confounder, cause, EdgeRole::Confounder));
        edges.push(DagEdge::new(confounder, effect, EdgeRole::Confounder));
    }
    for mediator in &structure.mediators {
        nodes.push(DagNode::new(mediator));
        edges.push(DagEdge::new(cause, mediator, EdgeRole::Mediator));
        edges.push(DagEdge::new(mediator, effect, EdgeRole::Mediator));
    }
    for collider in &structure.colliders {
        nodes.push(DagNode::new(collider));
        edges.push(DagEdge::new(cause, collider, EdgeRole::Collider));
        edges.push(DagEdge::new(effect, collider, EdgeRole::Collider));
    }

    (nodes, edges)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn hypothesis() -> Hypothesis {
        Hypothesis::new("s-1", "late_delivery", "churn_30d")
    }

    fn draft() -> AnalyzerDraft {
        AnalyzerDraft {
            classifications: vec![
                ClassificationDraft {
                    variable: "tenure_days".to_string(),
                    role: RoleDraft::Confounder,
                    reasoning: String::new(),
                },
                ClassificationDraft {
                    variable: "low_onboarding_engagement".to_string(),
                    role: RoleDraft::Mediator,
                    reasoning: String::new(),
                },
                ClassificationDraft {
                    variable: "refund_requested".to_string(),
                    role: RoleDraft::Collider,
                    reasoning: String::new(),
                },
                ClassificationDraft {
                    variable: "shoe_size".to_string(),
                    role: RoleDraft::Irrelevant,
                    reasoning: String::new(),
                },
            ],
            true_cause: "low_onboarding_engagement".to_string(),
            proximate_cause: "late_delivery".to_string(),
            actionable_lever: "Rescue onboarding after late orders".to_string(),
            structure_confidence: 0.8,
        }
    }

    fn candidates() -> Vec<String> {
        vec![
            "tenure_days".to_string(),
            "low_onboarding_engagement".to_string(),
            "refund_requested".to_string(),
            "shoe_size".to_string(),
        ]
    }

    #[test]
    fn test_build_structure_classifies_roles() {
        let structure = build_structure(&hypothesis(), &draft(), &candidates());
        assert_eq!(structure.confounders, vec!["tenure_days".to_string()]);
        assert_eq!(
            structure.mediators,
            vec!["low_onboarding_engagement".to_string()]
        );
        assert_eq!(structure.colliders, vec!["refund_requested".to_string()]);
        assert_eq!(structure.true_cause, "low_onboarding_engagement");
        assert_eq!(structure.proximate_cause, "late_delivery");
        assert_eq!(structure.structure_confidence, 0.8);
    }

    #[test]
    fn test_build_structure_ignores_unknown_variables() {
        let mut bad = draft();
        bad.classifications.push(ClassificationDraft {
            variable: "hallucinated".to_string(),
            role: RoleDraft::Confounder,
            reasoning: String::new(),
        });
        let structure = build_structure(&hypothesis(), &bad, &candidates());
        assert_eq!(structure.confounders, vec!["tenure_days".to_string()]);
    }

    #[test]
    fn test_build_structure_true_cause_fallback() {
        let mut bad = draft();
        bad.true_cause = "not_a_candidate".to_string();
        let structure = build_structure(&hypothesis(), &bad, &candidates());
        // Falls back to the deepest mediator
        assert_eq!(structure.true_cause, "low_onboarding_engagement");

        bad.classifications.retain(|c| c.role != RoleDraft::Mediator);
        let structure = build_structure(&hypothesis(), &bad, &candidates());
        assert_eq!(structure.true_cause, "late_delivery");
    }

    #[test]
    fn test_build_structure_default_lever() {
        let mut bare = draft();
        bare.actionable_lever = "  ".to_string();
        let structure = build_structure(&hypothesis(), &bare, &candidates());
        assert_eq!(structure.actionable_lever, "Address low_onboarding_engagement");
    }

    #[test]
    fn test_build_structure_confidence_clamped() {
        let mut wild = draft();
        wild.structure_confidence = 1.7;
        let structure = build_structure(&hypothesis(), &wild, &candidates());
        assert_eq!(structure.structure_confidence, 1.0);
    }

    #[test]
    fn test_dag_edges_per_role() {
        let structure = build_structure(&hypothesis(), &draft(), &candidates());
        // cause->effect, 2 confounder edges, 2 mediator edges, 2 collider edges
        assert_eq!(structure.edges.len(), 7);
        assert!(structure
            .edges
            .iter()
            .any(|e| e.source == "late_delivery" && e.target == "churn_30d" && e.role == EdgeRole::Cause));
        assert!(structure
            .edges
            .iter()
            .any(|e| e.source == "tenure_days" && e.target == "churn_30d" && e.role == EdgeRole::Confounder));
        assert!(structure
            .edges
            .iter()
            .any(|e| e.source == "low_onboarding_engagement"
                && e.target == "churn_30d"
                && e.role == EdgeRole::Mediator));
        assert!(structure
            .edges
            .iter()
            .any(|e| e.source == "churn_30d"
                && e.target == "refund_requested"
                && e.role == EdgeRole::Collider));
        // Irrelevant variables stay out of the DAG
        assert!(!structure.nodes.iter().any(|n| n.id == "shoe_size"));
    }
}
