//! Error types for the conversational agent core.

use thiserror::Error;

use crate::inference::InferenceError;

/// Terminal failure of a conversational turn.
///
/// Anything recoverable inside a turn (a failed tool call, a dead media
/// probe) is folded into the conversation instead of surfacing here.
#[derive(Debug, Error)]
pub enum TurnError {
    /// Input refused by the safety filter before any model or tool work.
    #[error("input rejected: {reason}")]
    InputRejected { reason: &'static str },

    /// The language model could not be reached or returned nothing usable.
    #[error("model unavailable: {source}")]
    ModelUnavailable {
        #[from]
        source: InferenceError,
    },

}

impl TurnError {
    /// Caller-facing wording. Rejected input gets the fixed refusal
    /// sentence rather than a diagnostic.
    pub fn user_message(&self) -> String {
        match self {
            TurnError::InputRejected { .. } => super::safety::REFUSAL_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// Term-cache persistence failure. Always non-fatal to the turn.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read snapshot: {reason}")]
    SnapshotRead { reason: String },

    #[error("failed to write snapshot: {reason}")]
    SnapshotWrite { reason: String },
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_error_display() {
        let e = TurnError::InputRejected { reason: "instruction-override phrasing" };
        assert_eq!(e.to_string(), "input rejected: instruction-override phrasing");
    }

    #[test]
    fn model_unavailable_wraps_inference_error() {
        let inner = InferenceError::Timeout { duration_secs: 30 };
        let e: TurnError = inner.into();
        assert!(matches!(e, TurnError::ModelUnavailable { .. }));
        assert!(e.to_string().contains("model unavailable"));
    }

    #[test]
    fn rejected_input_surfaces_the_refusal_sentence() {
        let e = TurnError::InputRejected { reason: "persona hijack" };
        assert_eq!(e.user_message(), crate::agent_core::safety::REFUSAL_MESSAGE);
    }
}
