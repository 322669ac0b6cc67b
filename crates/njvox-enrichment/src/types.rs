use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Third-party profile bound to a warehouse person-id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub person_id: String,
    pub provider_record_id: String,
    /// 0-10 confidence reported by the provider.
    pub match_likelihood: u8,
    pub payload: Value,
    pub enriched_at: String,
    pub has_email: bool,
    pub has_phone: bool,
    pub has_linkedin: bool,
    pub has_job: bool,
    pub has_education: bool,
}

impl EnrichmentRecord {
    /// Age in whole days relative to `now` (both RFC3339 strings).
    pub fn age_days(&self, now: chrono::DateTime<chrono::Utc>) -> i64 {
        match chrono::DateTime::parse_from_rfc3339(&self.enriched_at) {
            Ok(enriched) => (now - enriched.with_timezone(&chrono::Utc)).num_days(),
            Err(_) => i64::MAX,
        }
    }

    pub fn is_fresh(&self, now: chrono::DateTime<chrono::Utc>, staleness_days: i64) -> bool {
        self.age_days(now) < staleness_days
    }
}
