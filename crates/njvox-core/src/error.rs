use thiserror::Error;

/// Errors that can surface anywhere in the runtime.
///
/// Ordering mirrors the error-handling table: guard/backend/timeout first
/// (query path), then budget/adapter/transport (chat path), then the
/// ambient infrastructure errors last.
#[derive(Debug, Error)]
pub enum NjvoxError {
    #[error("query rejected: {0}")]
    GuardReject(#[from] crate::error::GuardRejectReason),

    #[error("warehouse error: {0}")]
    Backend(String),

    #[error("warehouse query timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("daily enrichment budget exceeded: spent {spent:.2} + {requested:.2} > ceiling {ceiling:.2}")]
    BudgetExceeded {
        spent: f64,
        requested: f64,
        ceiling: f64,
    },

    #[error("confirmation required: {reason}")]
    ConfirmationRequired { reason: String },

    #[error("agent history corrupted, session reset required")]
    CorruptedHistory,

    #[error("could not extract text from streaming response after retries")]
    ExtractionFailure,

    #[error("transport closed")]
    TransportClosed,

    #[error("not authorized: {0}")]
    AuthzDenied(String),

    #[error("{provider} provider error: {detail}")]
    ProviderError { provider: String, detail: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

impl NjvoxError {
    /// Short error code sent to clients over the wire. Never includes
    /// free-form detail — that stays server-side in logs.
    pub fn code(&self) -> &'static str {
        match self {
            NjvoxError::GuardReject(_) => "GUARD_REJECT",
            NjvoxError::Backend(_) => "BACKEND_ERROR",
            NjvoxError::Timeout { .. } => "TIMEOUT",
            NjvoxError::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
            NjvoxError::ConfirmationRequired { .. } => "CONFIRMATION_REQUIRED",
            NjvoxError::CorruptedHistory => "CORRUPTED_HISTORY",
            NjvoxError::ExtractionFailure => "EXTRACTION_FAILURE",
            NjvoxError::TransportClosed => "TRANSPORT_CLOSED",
            NjvoxError::AuthzDenied(_) => "AUTHZ_DENIED",
            NjvoxError::ProviderError { .. } => "PROVIDER_ERROR",
            NjvoxError::Config(_) => "CONFIG_ERROR",
            NjvoxError::Database(_) => "DATABASE_ERROR",
            NjvoxError::NotFound(_) => "NOT_FOUND",
            NjvoxError::Serialization(_) => "SERIALIZATION_ERROR",
            NjvoxError::Io(_) => "IO_ERROR",
            NjvoxError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            NjvoxError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors that represent a structured status rather than a
    /// true failure — callers present these to the user without logging
    /// them as incidents.
    pub fn is_structured_status(&self) -> bool {
        matches!(
            self,
            NjvoxError::BudgetExceeded { .. } | NjvoxError::ConfirmationRequired { .. }
        )
    }
}

impl From<rusqlite::Error> for NjvoxError {
    fn from(e: rusqlite::Error) -> Self {
        NjvoxError::Database(e.to_string())
    }
}

/// Why the Query Guard rejected a statement. Kept as its own enum (rather
/// than folded into a string) so callers can match on the exact rule that
/// fired, per the guard-soundness property.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardRejectReason {
    #[error("statement does not begin with SELECT")]
    NotSelect,
    #[error("forbidden keyword: {0}")]
    ForbiddenKeyword(String),
    #[error("table reference not on allow-list: {0}")]
    OffAllowlist(String),
}

pub type Result<T> = std::result::Result<T, NjvoxError>;
