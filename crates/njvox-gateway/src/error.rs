use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use njvox_core::error::NjvoxError;
use serde_json::json;

/// Maps a core error onto an HTTP response. Structured statuses
/// (`BudgetExceeded`, `ConfirmationRequired`) are agent-facing and
/// never reach this boundary in practice, but are mapped defensively.
pub struct ApiError(pub NjvoxError);

impl From<NjvoxError> for ApiError {
    fn from(e: NjvoxError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            NjvoxError::NotFound(_) => StatusCode::NOT_FOUND,
            NjvoxError::AuthzDenied(_) => StatusCode::FORBIDDEN,
            NjvoxError::GuardReject(_) => StatusCode::UNPROCESSABLE_ENTITY,
            NjvoxError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            NjvoxError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NjvoxError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        };
        let body = Json(json!({ "error": { "code": self.0.code(), "message": self.0.to_string() } }));
        (status, body).into_response()
    }
}
