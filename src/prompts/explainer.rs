//! Narrative polish prompt.

#![allow(clippy::missing_const_for_fn)]

/// Prompt asking the model to polish the deterministic conclusion.
///
/// The explainer always assembles the reasoning chain from structured data
/// first; this prompt only improves the concluding sentence. Any failure
/// leaves the template text in place.
#[must_use]
pub fn narrative_polish_prompt() -> &'static str {
    r#"Rewrite the following analysis conclusion for a business reader.
Keep every number and lever name exactly as given. Return one or two
sentences of plain prose, nothing else.

Conclusion to rewrite:"#
}
