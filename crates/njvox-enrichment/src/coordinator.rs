use std::sync::{Arc, Mutex};

use njvox_core::error::{NjvoxError, Result};
use njvox_core::types::now_rfc3339;
use serde::Serialize;
use tracing::{info, warn};

use crate::provider::{EnrichmentProvider, EnrichmentQuery};
use crate::store::EnrichmentStore;
use crate::types::EnrichmentRecord;

pub const DEFAULT_STALENESS_DAYS: i64 = 180;
pub const DEFAULT_MIN_LIKELIHOOD: u8 = 5;
pub const BATCH_CAP: usize = 100;

#[derive(Debug, Clone)]
pub struct EnrichmentPolicy {
    pub cost_per_enrichment: f64,
    pub daily_budget: f64,
    pub confirmation_threshold: f64,
    pub staleness_days: i64,
}

impl Default for EnrichmentPolicy {
    fn default() -> Self {
        Self {
            cost_per_enrichment: 0.25,
            daily_budget: 10.00,
            confirmation_threshold: 5.00,
            staleness_days: DEFAULT_STALENESS_DAYS,
        }
    }
}

/// Outcome of a single-subject enrichment request. `NoMatch` and the two
/// budget/confirmation variants are *not* errors — they're structured
/// statuses the agent relays to the user.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrichmentOutcome {
    Enriched(EnrichmentRecord),
    AlreadyEnriched(EnrichmentRecord),
    NoMatch { suggestion: String },
    BudgetExceeded { daily_spent: f64, daily_budget: f64 },
    ConfirmationRequired {
        projected_session_cost: f64,
        threshold: f64,
        affected_subjects: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub enriched: Vec<EnrichmentRecord>,
    pub already_enriched: Vec<String>,
    pub no_match: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Single and batch third-party lookups against cost ceilings and
/// staleness rules.
pub struct EnrichmentCoordinator {
    store: Arc<EnrichmentStore>,
    provider: Arc<dyn EnrichmentProvider>,
    policy: EnrichmentPolicy,
    session_cost: Mutex<f64>,
}

impl EnrichmentCoordinator {
    pub fn new(store: Arc<EnrichmentStore>, provider: Arc<dyn EnrichmentProvider>, policy: EnrichmentPolicy) -> Self {
        Self {
            store,
            provider,
            policy,
            session_cost: Mutex::new(0.0),
        }
    }

    /// Read-only lookup; never calls the provider.
    pub fn fetch(&self, person_id: &str) -> Result<Option<EnrichmentRecord>> {
        self.store.latest(person_id)
    }

    fn is_fresh(&self, record: &EnrichmentRecord) -> bool {
        record.is_fresh(chrono::Utc::now(), self.policy.staleness_days)
    }

    fn check_budgets(&self, subjects: &[String]) -> Result<Option<EnrichmentOutcome>> {
        let projected_cost = self.policy.cost_per_enrichment * subjects.len() as f64;

        let daily_spent = self.store.count_enriched_today()? as f64 * self.policy.cost_per_enrichment;
        if daily_spent + projected_cost > self.policy.daily_budget {
            return Ok(Some(EnrichmentOutcome::BudgetExceeded {
                daily_spent,
                daily_budget: self.policy.daily_budget,
            }));
        }

        let mut session_cost = self.session_cost.lock().unwrap();
        if *session_cost + projected_cost > self.policy.confirmation_threshold {
            return Ok(Some(EnrichmentOutcome::ConfirmationRequired {
                projected_session_cost: *session_cost + projected_cost,
                threshold: self.policy.confirmation_threshold,
                affected_subjects: subjects.to_vec(),
            }));
        }
        *session_cost += projected_cost;
        Ok(None)
    }

    /// `force=true` skips both budget checks — the caller (agent, after
    /// the user confirmed) has already accepted the cost.
    pub async fn enrich_one(
        &self,
        person_id: &str,
        min_likelihood: Option<u8>,
        skip_existing: bool,
        force: bool,
    ) -> Result<EnrichmentOutcome> {
        let min_likelihood = min_likelihood.unwrap_or(DEFAULT_MIN_LIKELIHOOD).clamp(1, 10);

        if skip_existing {
            if let Some(existing) = self.store.latest(person_id)? {
                if self.is_fresh(&existing) {
                    return Ok(EnrichmentOutcome::AlreadyEnriched(existing));
                }
            }
        }

        if !force {
            if let Some(blocked) = self.check_budgets(&[person_id.to_string()])? {
                return Ok(blocked);
            }
        }

        let query = EnrichmentQuery {
            person_id: person_id.to_string(),
            min_likelihood,
        };
        match self.provider.enrich_one(&query).await {
            Ok(Some(mut record)) => {
                record.enriched_at = now_rfc3339();
                self.store.insert(&record)?;
                info!(person_id, likelihood = record.match_likelihood, "enriched");
                Ok(EnrichmentOutcome::Enriched(record))
            }
            Ok(None) => Ok(EnrichmentOutcome::NoMatch {
                suggestion: format!(
                    "no match at likelihood >= {min_likelihood}; try lowering the threshold"
                ),
            }),
            Err(e) => {
                warn!(person_id, error = %e, "enrichment provider call failed");
                Err(e)
            }
        }
    }

    /// Capped at [`BATCH_CAP`] subjects per provider call; already-fresh
    /// subjects are skipped before dispatch, and a single subject's
    /// failure never aborts the rest of the batch.
    pub async fn enrich_batch(
        &self,
        person_ids: &[String],
        min_likelihood: Option<u8>,
        skip_existing: bool,
        force: bool,
    ) -> Result<BatchOutcome> {
        if person_ids.len() > BATCH_CAP {
            return Err(NjvoxError::Internal(format!(
                "batch of {} exceeds the cap of {BATCH_CAP}; split into smaller batches",
                person_ids.len()
            )));
        }

        let min_likelihood = min_likelihood.unwrap_or(DEFAULT_MIN_LIKELIHOOD).clamp(1, 10);
        let mut outcome = BatchOutcome::default();
        let mut to_dispatch = Vec::new();

        for person_id in person_ids {
            if skip_existing {
                if let Some(existing) = self.store.latest(person_id)? {
                    if self.is_fresh(&existing) {
                        outcome.already_enriched.push(person_id.clone());
                        continue;
                    }
                }
            }
            to_dispatch.push(person_id.clone());
        }

        if to_dispatch.is_empty() {
            return Ok(outcome);
        }

        if !force {
            if let Some(blocked) = self.check_budgets(&to_dispatch)? {
                return match blocked {
                    EnrichmentOutcome::BudgetExceeded { daily_spent, daily_budget } => {
                        Err(NjvoxError::BudgetExceeded {
                            spent: daily_spent,
                            requested: self.policy.cost_per_enrichment * to_dispatch.len() as f64,
                            ceiling: daily_budget,
                        })
                    }
                    EnrichmentOutcome::ConfirmationRequired {
                        projected_session_cost,
                        threshold,
                        ..
                    } => Err(NjvoxError::ConfirmationRequired {
                        reason: format!(
                            "session cost would reach ${projected_session_cost:.2}, over the ${threshold:.2} threshold for {} subjects",
                            to_dispatch.len()
                        ),
                    }),
                    _ => unreachable!(),
                };
            }
        }

        let queries: Vec<EnrichmentQuery> = to_dispatch
            .iter()
            .map(|id| EnrichmentQuery {
                person_id: id.clone(),
                min_likelihood,
            })
            .collect();

        let results = self.provider.enrich_batch(&queries).await?;
        let mut fresh_records = Vec::new();
        for (person_id, result) in results {
            match result {
                Some(mut record) => {
                    record.enriched_at = now_rfc3339();
                    fresh_records.push(record.clone());
                    outcome.enriched.push(record);
                }
                None => outcome.no_match.push(person_id),
            }
        }

        if let Err(e) = self.store.insert_batch(&fresh_records) {
            warn!(error = %e, "batch transaction failed, falling back to per-record inserts");
            for record in &fresh_records {
                if let Err(e) = self.store.insert(record) {
                    outcome.failed.push((record.person_id.clone(), e.to_string()));
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rusqlite::Connection;
    use serde_json::json;

    struct FixtureProvider {
        likelihood: u8,
    }

    #[async_trait]
    impl EnrichmentProvider for FixtureProvider {
        async fn enrich_one(&self, query: &EnrichmentQuery) -> Result<Option<EnrichmentRecord>> {
            if self.likelihood < query.min_likelihood {
                return Ok(None);
            }
            Ok(Some(EnrichmentRecord {
                person_id: query.person_id.clone(),
                provider_record_id: "prov-1".into(),
                match_likelihood: self.likelihood,
                payload: json!({"ok": true}),
                enriched_at: now_rfc3339(),
                has_email: true,
                has_phone: false,
                has_linkedin: false,
                has_job: false,
                has_education: false,
            }))
        }

        async fn enrich_batch(
            &self,
            queries: &[EnrichmentQuery],
        ) -> Result<Vec<(String, Option<EnrichmentRecord>)>> {
            let mut out = Vec::new();
            for q in queries {
                out.push((q.person_id.clone(), self.enrich_one(q).await?));
            }
            Ok(out)
        }
    }

    fn coordinator(likelihood: u8, policy: EnrichmentPolicy) -> EnrichmentCoordinator {
        let store = Arc::new(EnrichmentStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let provider = Arc::new(FixtureProvider { likelihood });
        EnrichmentCoordinator::new(store, provider, policy)
    }

    #[tokio::test]
    async fn enriches_and_then_skips_fresh() {
        let c = coordinator(9, EnrichmentPolicy::default());
        let first = c.enrich_one("p1", None, true, false).await.unwrap();
        assert!(matches!(first, EnrichmentOutcome::Enriched(_)));
        let second = c.enrich_one("p1", None, true, false).await.unwrap();
        assert!(matches!(second, EnrichmentOutcome::AlreadyEnriched(_)));
    }

    #[tokio::test]
    async fn below_threshold_is_no_match_not_error() {
        let c = coordinator(2, EnrichmentPolicy::default());
        let outcome = c.enrich_one("p2", Some(8), true, false).await.unwrap();
        assert!(matches!(outcome, EnrichmentOutcome::NoMatch { .. }));
    }

    #[tokio::test]
    async fn session_budget_requires_confirmation() {
        let mut policy = EnrichmentPolicy::default();
        policy.confirmation_threshold = 0.20;
        let c = coordinator(9, policy);
        let outcome = c.enrich_one("p3", None, true, false).await.unwrap();
        assert!(matches!(outcome, EnrichmentOutcome::ConfirmationRequired { .. }));
    }

    #[tokio::test]
    async fn force_bypasses_confirmation() {
        let mut policy = EnrichmentPolicy::default();
        policy.confirmation_threshold = 0.20;
        let c = coordinator(9, policy);
        let outcome = c.enrich_one("p4", None, true, true).await.unwrap();
        assert!(matches!(outcome, EnrichmentOutcome::Enriched(_)));
    }

    #[tokio::test]
    async fn batch_over_cap_rejected() {
        let c = coordinator(9, EnrichmentPolicy::default());
        let ids: Vec<String> = (0..101).map(|i| format!("p{i}")).collect();
        let err = c.enrich_batch(&ids, None, true, true).await.unwrap_err();
        assert!(matches!(err, NjvoxError::Internal(_)));
    }
}
