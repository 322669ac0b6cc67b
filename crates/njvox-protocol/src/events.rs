//! Typed payloads for the chat wire events named in the transport contract.
//! Kept separate from `frames` so the orchestrator can build these without
//! hand-assembling `serde_json::json!` blobs at every call site.

use serde::{Deserialize, Serialize};

// ---- client → server ------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageParams {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecoverMessageParams {
    pub session_id: String,
    #[serde(default)]
    pub last_message_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSessionModelParams {
    pub session_id: String,
    pub model_id: String,
}

// ---- server → client --------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SessionCreatedEvent {
    pub session_id: String,
    pub session_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageConfirmedEvent {
    pub session_id: String,
    pub message_id: String,
    pub sequence_number: u64,
    pub message_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageChunkEvent {
    pub chunk: String,
    pub sequence: u64,
    pub session_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageEndEvent {
    pub session_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRecoveryEvent {
    pub session_id: String,
    pub recovered_text: String,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionModelUpdatedEvent {
    pub session_id: String,
    pub model_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}
