use std::sync::Mutex;

use njvox_core::error::{NjvoxError, Result};
use njvox_core::types::{now_rfc3339, Oid};
use rusqlite::{params, Connection, OptionalExtension};

use crate::types::{Campaign, CampaignEvent, CampaignStats, CampaignStatus, CampaignUpdate};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS campaigns (
    campaign_id    TEXT PRIMARY KEY,
    owner_user_id  TEXT NOT NULL,
    list_id        TEXT NOT NULL,
    subject        TEXT NOT NULL,
    document_ref   TEXT NOT NULL,
    status         TEXT NOT NULL,
    batch_id       TEXT,
    created_at     TEXT NOT NULL,
    sent_at        TEXT,
    total_recipients INTEGER NOT NULL DEFAULT 0,
    sent           INTEGER NOT NULL DEFAULT 0,
    delivered      INTEGER NOT NULL DEFAULT 0,
    opened         INTEGER NOT NULL DEFAULT 0,
    clicked        INTEGER NOT NULL DEFAULT 0,
    bounced        INTEGER NOT NULL DEFAULT 0,
    unsubscribed   INTEGER NOT NULL DEFAULT 0,
    stats_updated_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_campaigns_owner
    ON campaigns (owner_user_id, created_at DESC);

CREATE TABLE IF NOT EXISTS campaign_events (
    event_id           TEXT PRIMARY KEY,
    campaign_id        TEXT NOT NULL,
    person_id          TEXT NOT NULL,
    provider_event_id  TEXT NOT NULL,
    event_type         TEXT NOT NULL,
    recorded_at        TEXT NOT NULL,
    UNIQUE (campaign_id, provider_event_id)
);
";

/// Persists campaigns and their reconciled delivery events. Writes are
/// per-`campaign_id`; last-writer-wins is acceptable.
pub struct CampaignStore {
    db: Mutex<Connection>,
}

impl CampaignStore {
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn create(&self, owner_user_id: &str, list_id: &str, subject: &str, document_ref: &str) -> Result<Campaign> {
        let campaign_id = Oid::new().to_string();
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO campaigns
             (campaign_id, owner_user_id, list_id, subject, document_ref, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'draft', ?6)",
            params![campaign_id, owner_user_id, list_id, subject, document_ref, now],
        )?;
        drop(db);
        self.get(&campaign_id, owner_user_id)?
            .ok_or_else(|| NjvoxError::Internal("campaign vanished after insert".into()))
    }

    pub fn get(&self, campaign_id: &str, owner_user_id: &str) -> Result<Option<Campaign>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT campaign_id, owner_user_id, list_id, subject, document_ref, status, batch_id,
                    created_at, sent_at, total_recipients, sent, delivered, opened, clicked,
                    bounced, unsubscribed, stats_updated_at
             FROM campaigns WHERE campaign_id = ?1 AND owner_user_id = ?2",
            params![campaign_id, owner_user_id],
            row_to_campaign,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list(&self, owner_user_id: &str, status: Option<CampaignStatus>) -> Result<Vec<Campaign>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT campaign_id, owner_user_id, list_id, subject, document_ref, status, batch_id,
                    created_at, sent_at, total_recipients, sent, delivered, opened, clicked,
                    bounced, unsubscribed, stats_updated_at
             FROM campaigns
             WHERE owner_user_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC",
        )?;
        let status_str = status.map(|s| s.as_str().to_string());
        let rows = stmt.query_map(params![owner_user_id, status_str], row_to_campaign)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Field-level update, rejected once the campaign has left `draft`
    /// ("once status in {sending, sent, partial}, the campaign is
    /// immutable except for stats and status").
    pub fn update(&self, campaign_id: &str, owner_user_id: &str, update: CampaignUpdate) -> Result<Campaign> {
        let existing = self
            .get(campaign_id, owner_user_id)?
            .ok_or_else(|| NjvoxError::NotFound(format!("campaign {}", campaign_id)))?;
        if existing.status.is_immutable_for_editing() {
            return Err(NjvoxError::Internal(format!(
                "campaign {} is no longer editable in status {}",
                campaign_id,
                existing.status.as_str()
            )));
        }

        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE campaigns SET
                subject = COALESCE(?3, subject),
                document_ref = COALESCE(?4, document_ref),
                list_id = COALESCE(?5, list_id)
             WHERE campaign_id = ?1 AND owner_user_id = ?2",
            params![campaign_id, owner_user_id, update.subject, update.document_ref, update.list_id],
        )?;
        drop(db);
        self.get(campaign_id, owner_user_id)?
            .ok_or_else(|| NjvoxError::NotFound(format!("campaign {}", campaign_id)))
    }

    pub fn delete(&self, campaign_id: &str, owner_user_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "DELETE FROM campaigns WHERE campaign_id = ?1 AND owner_user_id = ?2",
            params![campaign_id, owner_user_id],
        )?;
        if rows == 0 {
            return Err(NjvoxError::NotFound(format!("campaign {}", campaign_id)));
        }
        Ok(())
    }

    pub fn set_sending(&self, campaign_id: &str, batch_id: &str, total_recipients: u64) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE campaigns SET status = 'sending', batch_id = ?2, total_recipients = ?3
             WHERE campaign_id = ?1",
            params![campaign_id, batch_id, total_recipients as i64],
        )?;
        Ok(())
    }

    pub fn set_dispatch_outcome(&self, campaign_id: &str, sent: u64, final_status: CampaignStatus) -> Result<()> {
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE campaigns SET status = ?2, sent_at = ?3, sent = ?4, stats_updated_at = ?3
             WHERE campaign_id = ?1",
            params![campaign_id, final_status.as_str(), now, sent as i64],
        )?;
        Ok(())
    }

    /// Appends the event if `provider_event_id` hasn't been seen for
    /// this campaign yet, then bumps the matching stats counter.
    /// Returns `true` if this call actually recorded a new event.
    pub fn record_event_idempotent(
        &self,
        campaign_id: &str,
        person_id: &str,
        provider_event_id: &str,
        event_type: &str,
    ) -> Result<bool> {
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        let event_id = Oid::new().to_string();
        let inserted = db.execute(
            "INSERT OR IGNORE INTO campaign_events
             (event_id, campaign_id, person_id, provider_event_id, event_type, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![event_id, campaign_id, person_id, provider_event_id, event_type, now],
        )?;
        if inserted == 0 {
            return Ok(false);
        }

        let column = match event_type {
            "delivered" => Some("delivered"),
            "open" => Some("opened"),
            "click" => Some("clicked"),
            "bounce" | "dropped" => Some("bounced"),
            "unsubscribe" => Some("unsubscribed"),
            _ => None,
        };
        if let Some(column) = column {
            let sql = format!(
                "UPDATE campaigns SET {column} = {column} + 1, stats_updated_at = ?2 WHERE campaign_id = ?1"
            );
            db.execute(&sql, params![campaign_id, now])?;
        }
        Ok(true)
    }

    pub fn list_events(&self, campaign_id: &str) -> Result<Vec<CampaignEvent>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT event_id, campaign_id, person_id, provider_event_id, event_type, recorded_at
             FROM campaign_events WHERE campaign_id = ?1 ORDER BY recorded_at ASC",
        )?;
        let rows = stmt.query_map(params![campaign_id], |row| {
            Ok(CampaignEvent {
                event_id: row.get(0)?,
                campaign_id: row.get(1)?,
                person_id: row.get(2)?,
                provider_event_id: row.get(3)?,
                event_type: row.get(4)?,
                recorded_at: row.get(5)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_campaign(row: &rusqlite::Row<'_>) -> rusqlite::Result<Campaign> {
    let status_str: String = row.get(5)?;
    Ok(Campaign {
        campaign_id: row.get(0)?,
        owner_user_id: row.get(1)?,
        list_id: row.get(2)?,
        subject: row.get(3)?,
        document_ref: row.get(4)?,
        status: CampaignStatus::parse(&status_str),
        batch_id: row.get(6)?,
        created_at: row.get(7)?,
        sent_at: row.get(8)?,
        stats: CampaignStats {
            total_recipients: row.get::<_, i64>(9)? as u64,
            sent: row.get::<_, i64>(10)? as u64,
            delivered: row.get::<_, i64>(11)? as u64,
            opened: row.get::<_, i64>(12)? as u64,
            clicked: row.get::<_, i64>(13)? as u64,
            bounced: row.get::<_, i64>(14)? as u64,
            unsubscribed: row.get::<_, i64>(15)? as u64,
            last_updated: row.get(16)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CampaignStore {
        CampaignStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn create_starts_in_draft() {
        let s = store();
        let c = s.create("u1", "list-1", "hello", "doc-1").unwrap();
        assert_eq!(c.status, CampaignStatus::Draft);
    }

    #[test]
    fn update_rejected_once_sending() {
        let s = store();
        let c = s.create("u1", "list-1", "hello", "doc-1").unwrap();
        s.set_sending(&c.campaign_id, "batch-1", 10).unwrap();
        let err = s
            .update(
                &c.campaign_id,
                "u1",
                CampaignUpdate {
                    subject: Some("new".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, NjvoxError::Internal(_)));
    }

    #[test]
    fn duplicate_provider_event_id_is_idempotent() {
        let s = store();
        let c = s.create("u1", "list-1", "hello", "doc-1").unwrap();
        let first = s.record_event_idempotent(&c.campaign_id, "p1", "evt-1", "delivered").unwrap();
        let second = s.record_event_idempotent(&c.campaign_id, "p1", "evt-1", "delivered").unwrap();
        assert!(first);
        assert!(!second);
        let fetched = s.get(&c.campaign_id, "u1").unwrap().unwrap();
        assert_eq!(fetched.stats.delivered, 1);
    }

    #[test]
    fn bounce_and_dropped_both_count_as_bounced() {
        let s = store();
        let c = s.create("u1", "list-1", "hello", "doc-1").unwrap();
        s.record_event_idempotent(&c.campaign_id, "p1", "evt-1", "bounce").unwrap();
        s.record_event_idempotent(&c.campaign_id, "p2", "evt-2", "dropped").unwrap();
        let fetched = s.get(&c.campaign_id, "u1").unwrap().unwrap();
        assert_eq!(fetched.stats.bounced, 2);
    }
}
