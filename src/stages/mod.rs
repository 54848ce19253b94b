//! Pipeline stages.
//!
//! Five stages transform the session in strict order:
//!
//! 1. [`generate_hypotheses`]: LLM-backed candidate generation
//! 2. [`analyze_confounders`]: LLM + correlation-scan causal structure
//! 3. [`run_causal_tests`]: statistical validation via the kernel
//! 4. [`estimate_levers`]: deterministic intervention ranking
//! 5. [`generate_explanation`]: reasoning-chain assembly with LLM polish
//!
//! Each stage receives the session mutably and either updates it or returns
//! a [`StageError`](crate::error::StageError) that the orchestrator records
//! on the session. The explainer never fails; it falls back to a
//! deterministic template.

mod analyzer;
mod estimator;
mod explainer;
mod generator;
mod tester;

pub use analyzer::analyze_confounders;
pub use estimator::estimate_levers;
pub use explainer::generate_explanation;
pub use generator::generate_hypotheses;
pub use tester::run_causal_tests;
