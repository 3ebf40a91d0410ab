//! Agent Core — the conversational tool-orchestration engine.
//!
//! This module handles one user turn end to end:
//! - Safety filtering of the raw input before any model work
//! - Term resolution through the shared label↔ID cache
//! - The model⇄tool iteration loop with a hard round ceiling
//! - Minimization of tool results before re-injection
//! - Progress-event streaming to the caller
//!
//! A turn is a single sequential state machine; concurrency exists across
//! turns, meeting only at the shared [`TermLookupCache`].

pub mod artifacts;
pub mod errors;
pub mod events;
pub mod minimizer;
pub mod orchestrator;
pub mod safety;
pub mod term_cache;
pub mod types;

// Re-exports for convenience
pub use errors::{CacheError, TurnError};
pub use events::{EventSink, ProgressEvent};
pub use minimizer::ResultMinimizer;
pub use orchestrator::{Orchestrator, TurnPhase, MAX_TOOL_ROUNDS};
pub use safety::REFUSAL_MESSAGE;
pub use term_cache::TermLookupCache;
pub use types::{FinalAnswer, SceneContext, TermReference, ThumbnailRecord};
