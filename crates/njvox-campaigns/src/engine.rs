use std::sync::Arc;

use njvox_core::error::{NjvoxError, Result};
use njvox_remap::FieldRemapper;
use njvox_warehouse::WarehouseClient;
use tracing::{info, warn};
use uuid::Uuid;

use crate::document::{render_envelope, DocumentSource};
use crate::email::{CustomArgs, EmailBatch, EmailProvider, ProviderEvent};
use crate::recipients::{resolve_recipients, PersonIdRecovery};
use crate::store::CampaignStore;
use crate::types::{Campaign, CampaignStatus, CampaignUpdate};

/// Recipients are partitioned into batches of this size per send.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

pub struct CampaignEngine {
    store: Arc<CampaignStore>,
    email: Arc<dyn EmailProvider>,
    documents: Arc<dyn DocumentSource>,
    warehouse: Arc<dyn WarehouseClient>,
    remapper: FieldRemapper,
    batch_size: usize,
}

impl CampaignEngine {
    pub fn new(
        store: Arc<CampaignStore>,
        email: Arc<dyn EmailProvider>,
        documents: Arc<dyn DocumentSource>,
        warehouse: Arc<dyn WarehouseClient>,
        remapper: FieldRemapper,
    ) -> Self {
        Self {
            store,
            email,
            documents,
            warehouse,
            remapper,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn create(&self, owner_user_id: &str, list_id: &str, subject: &str, document_ref: &str) -> Result<Campaign> {
        self.store.create(owner_user_id, list_id, subject, document_ref)
    }

    pub fn get(&self, campaign_id: &str, owner_user_id: &str) -> Result<Option<Campaign>> {
        self.store.get(campaign_id, owner_user_id)
    }

    pub fn list(&self, owner_user_id: &str, status: Option<CampaignStatus>) -> Result<Vec<Campaign>> {
        self.store.list(owner_user_id, status)
    }

    pub fn update(&self, campaign_id: &str, owner_user_id: &str, update: CampaignUpdate) -> Result<Campaign> {
        self.store.update(campaign_id, owner_user_id, update)
    }

    pub fn delete(&self, campaign_id: &str, owner_user_id: &str) -> Result<()> {
        self.store.delete(campaign_id, owner_user_id)
    }

    pub fn list_events(&self, campaign_id: &str) -> Result<Vec<crate::types::CampaignEvent>> {
        self.store.list_events(campaign_id)
    }

    /// `test_email`, when set, sends a single message to that address
    /// instead of resolving the list — this is the `send (test)` step
    /// of the lifecycle.
    pub async fn send(
        &self,
        campaign_id: &str,
        owner_user_id: &str,
        stored_list_sql: &str,
        recovery: &PersonIdRecovery,
        allowlisted_tables: &[String],
        contact_table: &str,
        row_cap: u64,
        timeout_secs: u64,
        test_email: Option<&str>,
    ) -> Result<()> {
        let campaign = self
            .store
            .get(campaign_id, owner_user_id)?
            .ok_or_else(|| NjvoxError::NotFound(format!("campaign {}", campaign_id)))?;
        if campaign.subject.trim().is_empty() || campaign.document_ref.trim().is_empty() {
            return Err(NjvoxError::Internal(
                "campaign needs a non-empty subject and document before sending".into(),
            ));
        }

        let doc_body = self.documents.read(&campaign.document_ref).await?;
        let html_body = render_envelope(&doc_body);

        let recipients = if let Some(test_email) = test_email {
            vec![crate::email::EmailRecipient {
                person_id: "TEST".into(),
                email: test_email.to_string(),
                first_name: "Test".into(),
                last_name: "User".into(),
                city: "Test City".into(),
            }]
        } else {
            resolve_recipients(
                self.warehouse.as_ref(),
                &self.remapper,
                stored_list_sql,
                recovery,
                allowlisted_tables,
                contact_table,
                row_cap,
                timeout_secs,
            )
            .await?
        };

        if recipients.is_empty() {
            return Err(NjvoxError::NotFound("no recipients with a usable email address".into()));
        }

        let batch_id = Uuid::new_v4().to_string();
        let is_test = test_email.is_some();
        if !is_test {
            self.store.set_sending(campaign_id, &batch_id, recipients.len() as u64)?;
        }

        let mut sent_count = 0usize;
        let mut any_batch_failed = false;

        for chunk in recipients.chunks(self.batch_size) {
            let custom_args_for = chunk
                .iter()
                .map(|r| CustomArgs {
                    campaign_id: campaign_id.to_string(),
                    person_id: r.person_id.clone(),
                    batch_id: batch_id.clone(),
                })
                .collect();
            let batch = EmailBatch {
                subject: campaign.subject.clone(),
                html_body: html_body.clone(),
                recipients: chunk.to_vec(),
                custom_args_for,
            };
            match self.email.send(&batch).await {
                Ok(()) => {
                    sent_count += chunk.len();
                    for recipient in chunk {
                        let _ = self.store.record_event_idempotent(
                            campaign_id,
                            &recipient.person_id,
                            &format!("{batch_id}:{}:sent", recipient.person_id),
                            "sent",
                        );
                    }
                    info!(campaign_id, batch_size = chunk.len(), "campaign batch sent");
                }
                Err(e) => {
                    any_batch_failed = true;
                    warn!(campaign_id, error = %e, "campaign batch failed, not retrying automatically");
                }
            }
        }

        if !is_test {
            let final_status = if sent_count == 0 {
                CampaignStatus::Failed
            } else if any_batch_failed {
                CampaignStatus::Partial
            } else {
                CampaignStatus::Sent
            };
            self.store
                .set_dispatch_outcome(campaign_id, sent_count as u64, final_status)?;
        }
        Ok(())
    }

    /// Processes a batch of provider callback events. Always succeeds —
    /// the webhook endpoint replies 200 regardless, so this
    /// never returns an error for an individual malformed event; it's
    /// skipped and counted as unprocessed.
    pub fn reconcile(&self, events: &[ProviderEvent]) -> (u64, u64) {
        let mut processed = 0u64;
        let mut skipped = 0u64;
        for event in events {
            let (Some(campaign_id), Some(person_id), Some(provider_event_id)) =
                (&event.campaign_id, &event.person_id, &event.provider_event_id)
            else {
                skipped += 1;
                continue;
            };
            match self
                .store
                .record_event_idempotent(campaign_id, person_id, provider_event_id, &event.event)
            {
                Ok(_) => processed += 1,
                Err(e) => {
                    warn!(campaign_id, error = %e, "failed to record campaign event");
                    skipped += 1;
                }
            }
        }
        (processed, skipped)
    }
}
