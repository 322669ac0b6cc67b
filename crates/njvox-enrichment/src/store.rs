use std::sync::Mutex;

use njvox_core::error::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::types::EnrichmentRecord;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS enrichment_records (
    person_id          TEXT NOT NULL,
    provider_record_id TEXT NOT NULL,
    match_likelihood   INTEGER NOT NULL,
    payload            TEXT NOT NULL,
    enriched_at        TEXT NOT NULL,
    has_email          INTEGER NOT NULL,
    has_phone          INTEGER NOT NULL,
    has_linkedin       INTEGER NOT NULL,
    has_job            INTEGER NOT NULL,
    has_education      INTEGER NOT NULL,
    PRIMARY KEY (person_id, enriched_at)
);
CREATE INDEX IF NOT EXISTS idx_enrichment_person
    ON enrichment_records (person_id, enriched_at DESC);
";

/// Persists enrichment records, keeping every historical record for
/// audit even after a fresher one supersedes it ("older records may
/// be retained for audit").
pub struct EnrichmentStore {
    db: Mutex<Connection>,
}

impl EnrichmentStore {
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Most recent record for `person_id`, regardless of staleness.
    pub fn latest(&self, person_id: &str) -> Result<Option<EnrichmentRecord>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT person_id, provider_record_id, match_likelihood, payload, enriched_at,
                    has_email, has_phone, has_linkedin, has_job, has_education
             FROM enrichment_records
             WHERE person_id = ?1
             ORDER BY enriched_at DESC
             LIMIT 1",
            params![person_id],
            row_to_record,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn insert(&self, record: &EnrichmentRecord) -> Result<()> {
        let db = self.db.lock().unwrap();
        insert_one(&db, record)
    }

    /// Insert every record in one transaction; on any failure none of
    /// the batch is committed, since the backing store here supports
    /// transactions.
    pub fn insert_batch(&self, records: &[EnrichmentRecord]) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        for record in records {
            insert_one(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Number of distinct persons enriched since UTC midnight today,
    /// used to compute today's spend against the daily budget.
    pub fn count_enriched_today(&self) -> Result<u64> {
        let today = chrono::Utc::now().date_naive().to_string();
        let db = self.db.lock().unwrap();
        let count: i64 = db.query_row(
            "SELECT COUNT(DISTINCT person_id) FROM enrichment_records WHERE enriched_at >= ?1",
            params![format!("{today}T00:00:00+00:00")],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn insert_one(conn: &Connection, record: &EnrichmentRecord) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO enrichment_records
         (person_id, provider_record_id, match_likelihood, payload, enriched_at,
          has_email, has_phone, has_linkedin, has_job, has_education)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            record.person_id,
            record.provider_record_id,
            record.match_likelihood as i64,
            record.payload.to_string(),
            record.enriched_at,
            record.has_email as i64,
            record.has_phone as i64,
            record.has_linkedin as i64,
            record.has_job as i64,
            record.has_education as i64,
        ],
    )?;
    Ok(())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<EnrichmentRecord> {
    let payload_str: String = row.get(3)?;
    let has_email: i64 = row.get(5)?;
    let has_phone: i64 = row.get(6)?;
    let has_linkedin: i64 = row.get(7)?;
    let has_job: i64 = row.get(8)?;
    let has_education: i64 = row.get(9)?;
    Ok(EnrichmentRecord {
        person_id: row.get(0)?,
        provider_record_id: row.get(1)?,
        match_likelihood: {
            let v: i64 = row.get(2)?;
            v as u8
        },
        payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
        enriched_at: row.get(4)?,
        has_email: has_email != 0,
        has_phone: has_phone != 0,
        has_linkedin: has_linkedin != 0,
        has_job: has_job != 0,
        has_education: has_education != 0,
    })
}

