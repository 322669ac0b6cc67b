use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Sending,
    Partial,
    Sent,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Sending => "sending",
            CampaignStatus::Partial => "partial",
            CampaignStatus::Sent => "sent",
            CampaignStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sending" => CampaignStatus::Sending,
            "partial" => CampaignStatus::Partial,
            "sent" => CampaignStatus::Sent,
            "failed" => CampaignStatus::Failed,
            _ => CampaignStatus::Draft,
        }
    }

    /// Once a campaign leaves `draft` it may only be edited through
    /// `stats`/`status` transitions.
    pub fn is_immutable_for_editing(&self) -> bool {
        !matches!(self, CampaignStatus::Draft)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignStats {
    pub total_recipients: u64,
    pub sent: u64,
    pub delivered: u64,
    pub opened: u64,
    pub clicked: u64,
    pub bounced: u64,
    pub unsubscribed: u64,
    pub last_updated: Option<String>,
}

/// An email send unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub campaign_id: String,
    pub owner_user_id: String,
    pub list_id: String,
    pub subject: String,
    pub document_ref: String,
    pub status: CampaignStatus,
    pub batch_id: Option<String>,
    pub created_at: String,
    pub sent_at: Option<String>,
    pub stats: CampaignStats,
}

#[derive(Debug, Clone, Default)]
pub struct CampaignUpdate {
    pub subject: Option<String>,
    pub document_ref: Option<String>,
    pub list_id: Option<String>,
}

/// One reconciled provider callback, keyed for idempotency on
/// `provider_event_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignEvent {
    pub event_id: String,
    pub campaign_id: String,
    pub person_id: String,
    pub provider_event_id: String,
    pub event_type: String,
    pub recorded_at: String,
}
