use njvox_core::config::{AuthMode, NjvoxConfig, MAX_PAYLOAD_BYTES};
use njvox_protocol::handshake::{AuthPayload, ClientPolicy, ConnectParams, HelloOk, RateLimitPolicy, ServerFeatures, ServerInfo};

/// Per-client state established at connect time. Unlike a typical
/// request, this never changes for the life of the socket — a client that
/// wants different auth reconnects.
#[derive(Debug, Clone)]
pub struct ClientAuth {
    pub authenticated: bool,
    pub user_id: String,
    pub user_email: Option<String>,
}

impl ClientAuth {
    pub fn anonymous() -> Self {
        Self { authenticated: false, user_id: "anonymous".to_string(), user_email: None }
    }
}

/// Resolves the bearer token carried in `connect` params against the
/// gateway's own auth mode. `AuthMode::None` accepts every connection as
/// authenticated; `Bearer` requires an exact token match. Either way, a
/// connection that doesn't present the right token still connects — it's
/// just unauthenticated.
pub fn resolve_auth(params: &ConnectParams, config: &NjvoxConfig) -> ClientAuth {
    match config.gateway.auth.mode {
        AuthMode::None => ClientAuth { authenticated: true, user_id: "anonymous".to_string(), user_email: None },
        AuthMode::Bearer => match &params.auth {
            AuthPayload::Bearer { token } if Some(token.as_str()) == config.gateway.auth.token.as_deref() => {
                let user_id = params
                    .client_info
                    .as_ref()
                    .and_then(|c| c.name.clone())
                    .unwrap_or_else(|| "authenticated-user".to_string());
                ClientAuth { authenticated: true, user_id, user_email: None }
            }
            _ => ClientAuth::anonymous(),
        },
    }
}

pub fn hello_ok_payload(authenticated: bool) -> HelloOk {
    HelloOk {
        server: ServerInfo { name: "njvox-gateway".to_string(), version: env!("CARGO_PKG_VERSION").to_string() },
        features: ServerFeatures { streaming: true, recovery: true },
        policy: ClientPolicy {
            max_message_size: MAX_PAYLOAD_BYTES,
            rate_limit: Some(RateLimitPolicy { requests_per_minute: 120 }),
        },
        authenticated,
    }
}
