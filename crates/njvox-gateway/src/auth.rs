use axum::http::HeaderMap;
use njvox_core::config::{AuthMode, NjvoxConfig};
use njvox_core::error::NjvoxError;

/// Checks the gateway's own bearer token (identity/OAuth is an
/// external collaborator, out of scope). Once past this gate, the
/// caller's identity comes from `X-User-Id` — a stand-in for whatever
/// upstream identity layer a real deployment fronts this with.
pub fn authenticate(headers: &HeaderMap, config: &NjvoxConfig) -> Result<String, NjvoxError> {
    match config.gateway.auth.mode {
        AuthMode::None => {}
        AuthMode::Bearer => {
            let expected = config
                .gateway
                .auth
                .token
                .as_deref()
                .ok_or_else(|| NjvoxError::Config("bearer auth enabled without a configured token".into()))?;
            let supplied = headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "));
            if supplied != Some(expected) {
                return Err(NjvoxError::AuthzDenied("invalid or missing bearer token".into()));
            }
        }
    }

    Ok(headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string())
}
