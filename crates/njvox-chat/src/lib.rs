pub mod orchestrator;
pub mod sink;
pub mod types;

pub use orchestrator::{ChatOrchestrator, DEFAULT_CLEANUP_INTERVAL, DEFAULT_RETENTION};
pub use sink::{SinkClosed, TurnSink};
pub use types::InFlightTurn;

/// Model used for a new session when the caller doesn't specify one.
/// The gateway normally resolves this from config (`default model id`);
/// this is the orchestrator's own fallback when called directly.
pub const DEFAULT_MODEL_ID: &str = "default";
