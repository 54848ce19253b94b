//! Shared fixtures for the end-to-end scenarios: a scripted LLM stub and
//! deterministic synthetic dataset builders.

#![allow(
    dead_code,
    clippy::cast_precision_loss,
    clippy::unwrap_used,
    clippy::expect_used
)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use retention_reasoning::data::{DataTable, FeatureCatalog, FeatureSpec, SemanticType};
use retention_reasoning::domain::{Opportunity, OpportunityKind, Severity};
use retention_reasoning::error::StageError;
use retention_reasoning::pipeline::CancelFlag;
use retention_reasoning::traits::{
    CompletionConfig, CompletionResponse, LlmClientTrait, Message, Usage,
};

/// LLM stub that serves canned responses in order.
///
/// Once the script is exhausted it returns empty completions, which the
/// explainer treats as "no polish" so sessions still complete. Optionally
/// trips a cancel flag after a fixed number of calls (for mid-pipeline
/// cancellation scenarios).
pub struct ScriptedClient {
    script: Mutex<Vec<Result<String, StageError>>>,
    calls: AtomicUsize,
    cancel_after: Option<(usize, CancelFlag)>,
    exhausted: AtomicBool,
}

impl ScriptedClient {
    /// Create a stub serving the given responses front to back.
    pub fn new(script: Vec<Result<String, StageError>>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            cancel_after: None,
            exhausted: AtomicBool::new(false),
        }
    }

    /// Trip `flag` once `calls` completions have been served.
    pub fn with_cancel_after(mut self, calls: usize, flag: CancelFlag) -> Self {
        self.cancel_after = Some((calls, flag));
        self
    }

    /// Completions served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Whether any call ran past the end of the script.
    pub fn ran_past_script(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClientTrait for ScriptedClient {
    async fn complete(
        &self,
        _messages: Vec<Message>,
        _config: CompletionConfig,
    ) -> Result<CompletionResponse, StageError> {
        let served = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, flag)) = &self.cancel_after {
            if served >= *after {
                flag.cancel();
            }
        }

        let next = {
            let mut script = self.script.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if script.is_empty() {
                None
            } else {
                Some(script.remove(0))
            }
        };

        match next {
            Some(Ok(content)) => Ok(CompletionResponse::new(content, Usage::new(10, 10))),
            Some(Err(error)) => Err(error),
            None => {
                self.exhausted.store(true, Ordering::SeqCst);
                Ok(CompletionResponse::new("", Usage::new(0, 0)))
            }
        }
    }
}

/// Deterministic noise in [-0.5, 0.5) from a tiny LCG.
pub fn noise(seed: &mut u64) -> f64 {
    *seed = seed
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407);
    ((*seed >> 33) as f64 / f64::from(1u32 << 31)) - 0.5
}

/// Uniform draw in [0, 1).
pub fn uniform(seed: &mut u64) -> f64 {
    noise(seed) + 0.5
}

/// The churn-spike opportunity used across scenarios.
pub fn referral_churn_opportunity(sample_size: usize) -> Opportunity {
    Opportunity::new(
        OpportunityKind::ChurnSpike,
        "Referral churn spike",
        "churn_30d",
    )
    .with_description("Churn among referral signups jumped from 15% to 32%")
    .with_cohort("channel", "Referral")
    .with_values(0.15, 0.32)
    .with_sample_size(sample_size)
    .with_severity(Severity::High)
}

/// Honest mediated signal:
/// `late_delivery -> low_onboarding_engagement -> churn_30d`,
/// plus `discount_usage` which protects against churn (negative effect).
pub fn mediated_churn_table(n: usize, seed: u64) -> DataTable {
    let mut seed = seed;
    let mut late = Vec::with_capacity(n);
    let mut engagement = Vec::with_capacity(n);
    let mut discount = Vec::with_capacity(n);
    let mut churn = Vec::with_capacity(n);
    for i in 0..n {
        let late_value = f64::from(u8::from(i % 2 == 0));
        // Low engagement score: driven up by late deliveries
        let engagement_value = 0.8 * late_value + noise(&mut seed) * 0.4;
        let discount_value = f64::from(u8::from(uniform(&mut seed) < 0.4));
        let churn_p = (0.1 + 0.05 * late_value + 0.6 * engagement_value
            - 0.35 * discount_value)
            .clamp(0.02, 0.98);
        let churn_value = f64::from(u8::from(uniform(&mut seed) < churn_p));
        late.push(Some(late_value));
        engagement.push(Some(engagement_value));
        discount.push(Some(discount_value));
        churn.push(Some(churn_value));
    }
    DataTable::new()
        .with_numeric("late_delivery", late)
        .unwrap()
        .with_numeric("low_onboarding_engagement", engagement)
        .unwrap()
        .with_numeric("discount_usage", discount)
        .unwrap()
        .with_numeric("churn_30d", churn)
        .unwrap()
}

/// Catalog matching [`mediated_churn_table`].
pub fn mediated_churn_catalog() -> FeatureCatalog {
    FeatureCatalog::new(vec![
        FeatureSpec::new("late_delivery", SemanticType::Binary)
            .with_description("Order arrived after the promised window"),
        FeatureSpec::new("low_onboarding_engagement", SemanticType::Continuous)
            .with_description("Inverted engagement score for the first two weeks"),
        FeatureSpec::new("discount_usage", SemanticType::Binary)
            .with_description("Customer redeemed a discount"),
    ])
}

/// Pure confounding: `shared_driver` causes both `feature_a` and
/// `churn_30d`; `feature_a` itself has no effect. `protective` lowers
/// churn, for a guaranteed-invalid second hypothesis.
pub fn confounded_table(n: usize, seed: u64) -> DataTable {
    let mut seed = seed;
    let mut driver = Vec::with_capacity(n);
    let mut feature_a = Vec::with_capacity(n);
    let mut protective = Vec::with_capacity(n);
    let mut churn = Vec::with_capacity(n);
    for _ in 0..n {
        let driver_value = uniform(&mut seed);
        let a_value = f64::from(u8::from(driver_value + noise(&mut seed) * 0.3 > 0.5));
        let protective_value = f64::from(u8::from(uniform(&mut seed) < 0.5));
        // Exactly logit-linear in the controls, so adjustment leaves no
        // residual signal on feature_a
        let logit = -2.0 + 3.0 * driver_value - 1.0 * protective_value;
        let churn_p = 1.0 / (1.0 + (-logit).exp());
        let churn_value = f64::from(u8::from(uniform(&mut seed) < churn_p));
        driver.push(Some(driver_value));
        feature_a.push(Some(a_value));
        protective.push(Some(protective_value));
        churn.push(Some(churn_value));
    }
    DataTable::new()
        .with_numeric("shared_driver", driver)
        .unwrap()
        .with_numeric("feature_a", feature_a)
        .unwrap()
        .with_numeric("protective", protective)
        .unwrap()
        .with_numeric("churn_30d", churn)
        .unwrap()
}

/// Catalog matching [`confounded_table`].
pub fn confounded_catalog() -> FeatureCatalog {
    FeatureCatalog::new(vec![
        FeatureSpec::new("shared_driver", SemanticType::Continuous),
        FeatureSpec::new("feature_a", SemanticType::Binary),
        FeatureSpec::new("protective", SemanticType::Binary),
    ])
}

/// Generator response JSON for the mediated-churn scenarios.
pub fn mediated_generator_json() -> String {
    r#"{
        "hypotheses": [
            {
                "cause": "late_delivery",
                "effect": "churn_30d",
                "mechanism": "Late deliveries depress onboarding engagement which drives churn",
                "rationale": "Strong correlation with churn in the referral cohort",
                "expected_direction": "positive",
                "confounders": [],
                "mediators": ["low_onboarding_engagement"],
                "moderators": [],
                "test_methods": ["propensity_matching", "regression_adjustment"],
                "likelihood": "high"
            },
            {
                "cause": "discount_usage",
                "effect": "churn_30d",
                "mechanism": "Discount users churn more after the discount lapses",
                "rationale": "Folk wisdom from the growth team",
                "expected_direction": "positive",
                "confounders": [],
                "mediators": [],
                "moderators": [],
                "test_methods": ["regression_adjustment"],
                "likelihood": "low"
            }
        ]
    }"#
    .to_string()
}

/// Analyzer response for the late-delivery hypothesis.
pub fn mediated_analyzer_json() -> String {
    r#"{
        "classifications": [
            {
                "variable": "low_onboarding_engagement",
                "role": "mediator",
                "reasoning": "Sits on the path from late delivery to churn"
            }
        ],
        "true_cause": "low_onboarding_engagement",
        "proximate_cause": "late_delivery",
        "actionable_lever": "Rescue onboarding engagement after a late first delivery",
        "structure_confidence": 0.8
    }"#
    .to_string()
}

/// Analyzer response for small-sample runs: same structure, modest
/// confidence.
pub fn small_sample_analyzer_json() -> String {
    r#"{
        "classifications": [
            {
                "variable": "low_onboarding_engagement",
                "role": "mediator",
                "reasoning": "Sits on the path from late delivery to churn"
            }
        ],
        "true_cause": "low_onboarding_engagement",
        "proximate_cause": "late_delivery",
        "actionable_lever": "Rescue onboarding engagement after a late first delivery",
        "structure_confidence": 0.45
    }"#
    .to_string()
}

/// Generator response for the pure-confounding scenario.
pub fn confounded_generator_json() -> String {
    r#"{
        "hypotheses": [
            {
                "cause": "feature_a",
                "effect": "churn_30d",
                "mechanism": "Feature A usage frustrates customers into churning",
                "rationale": "Feature A users churn visibly more",
                "expected_direction": "positive",
                "confounders": ["shared_driver"],
                "mediators": [],
                "moderators": [],
                "test_methods": ["regression_adjustment"],
                "likelihood": "medium"
            },
            {
                "cause": "protective",
                "effect": "churn_30d",
                "mechanism": "The protective cohort churns more",
                "rationale": "Hunch",
                "expected_direction": "positive",
                "confounders": [],
                "mediators": [],
                "moderators": [],
                "test_methods": ["regression_adjustment"],
                "likelihood": "low"
            }
        ]
    }"#
    .to_string()
}

/// Analyzer response confirming `shared_driver` as a confounder of
/// `feature_a -> churn_30d`.
pub fn confounded_analyzer_json() -> String {
    r#"{
        "classifications": [
            {
                "variable": "shared_driver",
                "role": "confounder",
                "reasoning": "Drives both feature adoption and churn"
            }
        ],
        "true_cause": "feature_a",
        "proximate_cause": "feature_a",
        "actionable_lever": "Rework feature A",
        "structure_confidence": 0.6
    }"#
    .to_string()
}
