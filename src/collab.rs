//! Language-model collaborators
//!
//! The three roles the simulator delegates to a model: generating a fresh
//! case, speaking as the patient, and grading the encounter. Each one owns
//! its prompt and the salvage of whatever the model returns.

mod case_generator;
mod evaluator;
mod responder;

pub use case_generator::{CaseGenerator, GeneratedCase};
pub use evaluator::{EvaluationOutcome, Evaluator};
pub use responder::{PatientResponder, FALLBACK_REPLY};

use serde_json::Value;

/// Parse model output that should be a JSON object, salvaging the first
/// `{`..last `}` slice when the model wrapped it in prose or markdown.
#[allow(clippy::string_slice)] // indices come from find/rfind on the same str
pub fn salvage_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
