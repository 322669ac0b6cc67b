use async_trait::async_trait;
use njvox_core::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecipient {
    pub person_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub city: String,
}

/// Custom args attached per-recipient so the provider's webhook can be
/// correlated back to `(campaign_id, person_id, batch_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomArgs {
    pub campaign_id: String,
    pub person_id: String,
    pub batch_id: String,
}

#[derive(Debug, Clone)]
pub struct EmailBatch {
    pub subject: String,
    pub html_body: String,
    pub recipients: Vec<EmailRecipient>,
    pub custom_args_for: Vec<CustomArgs>,
}

/// A single reconciled event delivered by the provider's webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    pub event: String,
    pub campaign_id: Option<String>,
    pub person_id: Option<String>,
    pub provider_event_id: Option<String>,
    pub email: Option<String>,
}

/// External transactional email service. `send` dispatches one batch;
/// `webhook` events arrive out of band through the HTTP boundary, not
/// through this trait — the coordinator only needs `send` here.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, batch: &EmailBatch) -> Result<()>;
}
