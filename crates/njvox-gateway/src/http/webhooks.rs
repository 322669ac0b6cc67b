//! Email provider webhook ingress — POST /webhooks/email.
//!
//! Diverges from a normal HTTP boundary on purpose: whatever happens
//! during verification or parsing, this handler always replies 200, so
//! the upstream provider never retries a delivery receipt into a retry
//! storm. Failures are logged and swallowed.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use hmac::{Hmac, Mac};
use njvox_campaigns::ProviderEvent;
use njvox_core::config::WebhookAuthMode;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};

use crate::app::AppState;

type HmacSha256 = Hmac<Sha256>;

pub async fn webhook_handler(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let cfg = &state.config.webhooks;

    match cfg.email_auth_mode.clone().unwrap_or(WebhookAuthMode::None) {
        WebhookAuthMode::HmacSha256 => {
            let secret = cfg
                .email_signing_secret
                .as_ref()
                .and_then(|name| state.secrets.get(name));
            if let Err(e) = verify_hmac_sha256(&headers, &body, secret.as_deref()) {
                warn!(error = %e, "email webhook signature verification failed, dropping");
                return Json(json!({ "ok": true }));
            }
        }
        WebhookAuthMode::None => {}
    }

    let events: Vec<ProviderEvent> = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Array(_)) => serde_json::from_slice(&body).unwrap_or_default(),
        Ok(single) => serde_json::from_value(single).map(|e| vec![e]).unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "invalid JSON in email webhook body, dropping");
            return Json(json!({ "ok": true }));
        }
    };

    let (processed, skipped) = state.campaigns.reconcile(&events);
    info!(processed, skipped, "email webhook reconciled");

    Json(json!({ "ok": true }))
}

fn verify_hmac_sha256(headers: &HeaderMap, body: &Bytes, secret: Option<&str>) -> Result<(), String> {
    let secret = secret.ok_or_else(|| "no signing secret configured".to_string())?;

    let sig_header = headers
        .get("x-njvox-signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Njvox-Signature-256 header".to_string())?;
    let sig_hex = sig_header
        .strip_prefix("sha256=")
        .ok_or_else(|| "malformed signature header".to_string())?;
    let expected = hex::decode(sig_hex).map_err(|_| "signature is not valid hex".to_string())?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| "HMAC signature mismatch".to_string())
}
