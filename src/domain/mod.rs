//! Domain model for reasoning sessions.
//!
//! The root record is [`ReasoningSession`], which exclusively owns its
//! [`Hypothesis`] list; each hypothesis exclusively owns its test results
//! and causal structure. Levers and the reasoning chain belong to the
//! session. A hypothesis never outlives its session.

mod hypothesis;
mod opportunity;
mod session;

pub use hypothesis::{
    CausalStructure, ConfidenceLevel, DagEdge, DagNode, EdgeRole, EffectDirection, Hypothesis,
    Likelihood, TestMethod, TestResult,
};
pub use opportunity::{Opportunity, OpportunityKind, Severity};
pub use session::{
    Effort, Lever, ReasoningChain, ReasoningSession, ReasoningStep, SessionStatus,
};
