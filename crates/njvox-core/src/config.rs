use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8089;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
pub const HEARTBEAT_PING_SECS: u64 = 20;
pub const HEARTBEAT_PONG_TIMEOUT_SECS: u64 = 40;

pub const DEFAULT_ROW_CAP: u64 = 1_000_000;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_RECIPIENT_CAP: usize = 1_000;
pub const DEFAULT_CAMPAIGN_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_ENRICHMENT_BATCH_CAP: usize = 100;
pub const DEFAULT_STALENESS_DAYS: i64 = 180;
pub const DEFAULT_COST_PER_ENRICHMENT: f64 = 0.25;
pub const DEFAULT_DAILY_ENRICHMENT_BUDGET: f64 = 10.00;
pub const DEFAULT_SESSION_CONFIRMATION_THRESHOLD: f64 = 5.00;
pub const DEFAULT_MESSAGE_RETENTION_SECS: u64 = 300;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Top-level config (njvox.toml + NJVOX_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NjvoxConfig {
    pub gateway: GatewayConfig,
    pub agent: AgentConfig,
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub budgets: BudgetsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Default for NjvoxConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                port: DEFAULT_PORT,
                bind: DEFAULT_BIND.to_string(),
                auth: AuthConfig {
                    mode: AuthMode::Bearer,
                    token: Some("change-me".to_string()),
                },
            },
            agent: AgentConfig {
                default_model_id: "claude-sonnet-4-6".to_string(),
                max_output_tokens: 4096,
                instance_cache_max: 512,
            },
            warehouse: WarehouseConfig::default(),
            database: DatabaseConfig::default(),
            providers: ProvidersConfig::default(),
            webhooks: WebhooksConfig::default(),
            budgets: BudgetsConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// Logical secret-store name for the bearer token, resolved via
    /// [`crate::secrets::Secrets`] rather than stored in the clear when
    /// `mode == Bearer` in production deployments.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Static bearer token checked against `auth.token`.
    Bearer,
    /// No authentication — connections are accepted but cannot `send_message`.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub default_model_id: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Upper bound on live per-session agent instances kept in the adapter
    /// cache before LRU eviction kicks in.
    #[serde(default = "default_instance_cache_max")]
    pub instance_cache_max: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub project_id: String,
    pub region: String,
    pub dataset: String,
    #[serde(default = "default_row_cap")]
    pub row_cap: u64,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    /// Fully-qualified `project.dataset.table` names readable by the guard.
    #[serde(default)]
    pub allowlisted_tables: Vec<String>,
    /// Tables/views where a configured subset of identifier remap rules is
    /// suppressed (e.g. the enrichment view already uses canonical names).
    #[serde(default)]
    pub protected_tables: Vec<String>,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project_id: "nj-voter-analytics".to_string(),
            region: "us-east4".to_string(),
            dataset: "voters".to_string(),
            row_cap: DEFAULT_ROW_CAP,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            allowlisted_tables: Vec::new(),
            protected_tables: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub document_service: Option<DocumentServiceConfig>,
    pub email: Option<EmailProviderConfig>,
    pub geocoding: Option<GeocodingProviderConfig>,
    pub search: Option<SearchProviderConfig>,
    pub enrichment: Option<EnrichmentProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentServiceConfig {
    pub base_url: String,
    /// Logical secret-store name; the document service is always called
    /// under the requesting user's own delegated credentials, resolved
    /// per-call rather than from a single static secret.
    pub credentials_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailProviderConfig {
    #[serde(default = "default_email_base_url")]
    pub base_url: String,
    /// Logical secret-store name for the provider API key.
    pub api_key_secret: String,
    pub from_address: String,
    pub from_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingProviderConfig {
    pub base_url: String,
    pub api_key_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProviderConfig {
    pub base_url: String,
    pub api_key_secret: String,
    /// Domains preferred in ranking (domain-biased search per the tool contract).
    #[serde(default)]
    pub biased_domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentProviderConfig {
    pub base_url: String,
    pub api_key_secret: String,
}

/// Authentication mode for an incoming webhook source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WebhookAuthMode {
    /// HMAC-SHA256 over the raw request body (SendGrid-style signature header).
    HmacSha256,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhooksConfig {
    #[serde(default)]
    pub email_auth_mode: Option<WebhookAuthMode>,
    /// Logical secret-store name for the HMAC signing secret.
    pub email_signing_secret: Option<String>,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            email_auth_mode: Some(WebhookAuthMode::None),
            email_signing_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetsConfig {
    #[serde(default = "default_cost_per_enrichment")]
    pub cost_per_enrichment: f64,
    #[serde(default = "default_daily_enrichment_budget")]
    pub daily_enrichment_budget: f64,
    #[serde(default = "default_session_confirmation_threshold")]
    pub session_confirmation_threshold: f64,
    #[serde(default = "default_staleness_days")]
    pub staleness_days: i64,
    #[serde(default = "default_enrichment_batch_cap")]
    pub enrichment_batch_cap: usize,
    #[serde(default = "default_recipient_cap")]
    pub recipient_cap: usize,
    #[serde(default = "default_campaign_batch_size")]
    pub campaign_batch_size: usize,
}

impl Default for BudgetsConfig {
    fn default() -> Self {
        Self {
            cost_per_enrichment: DEFAULT_COST_PER_ENRICHMENT,
            daily_enrichment_budget: DEFAULT_DAILY_ENRICHMENT_BUDGET,
            session_confirmation_threshold: DEFAULT_SESSION_CONFIRMATION_THRESHOLD,
            staleness_days: DEFAULT_STALENESS_DAYS,
            enrichment_batch_cap: DEFAULT_ENRICHMENT_BATCH_CAP,
            recipient_cap: DEFAULT_RECIPIENT_CAP,
            campaign_batch_size: DEFAULT_CAMPAIGN_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_message_retention_secs")]
    pub message_retention_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            message_retention_secs: DEFAULT_MESSAGE_RETENTION_SECS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_max_output_tokens() -> u32 {
    4096
}
fn default_instance_cache_max() -> usize {
    512
}
fn default_row_cap() -> u64 {
    DEFAULT_ROW_CAP
}
fn default_query_timeout_secs() -> u64 {
    DEFAULT_QUERY_TIMEOUT_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.njvox/njvox.db", home)
}
fn default_email_base_url() -> String {
    "https://api.sendgrid.com".to_string()
}
fn default_cost_per_enrichment() -> f64 {
    DEFAULT_COST_PER_ENRICHMENT
}
fn default_daily_enrichment_budget() -> f64 {
    DEFAULT_DAILY_ENRICHMENT_BUDGET
}
fn default_session_confirmation_threshold() -> f64 {
    DEFAULT_SESSION_CONFIRMATION_THRESHOLD
}
fn default_staleness_days() -> i64 {
    DEFAULT_STALENESS_DAYS
}
fn default_enrichment_batch_cap() -> usize {
    DEFAULT_ENRICHMENT_BATCH_CAP
}
fn default_recipient_cap() -> usize {
    DEFAULT_RECIPIENT_CAP
}
fn default_campaign_batch_size() -> usize {
    DEFAULT_CAMPAIGN_BATCH_SIZE
}
fn default_message_retention_secs() -> u64 {
    DEFAULT_MESSAGE_RETENTION_SECS
}
fn default_cleanup_interval_secs() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_SECS
}

impl NjvoxConfig {
    /// Load config from a TOML file with NJVOX_* env var overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: NjvoxConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("NJVOX_").split("_"))
            .extract()
            .map_err(|e| crate::error::NjvoxError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.njvox/njvox.toml", home)
}
