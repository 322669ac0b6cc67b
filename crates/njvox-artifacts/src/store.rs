use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use njvox_core::error::{NjvoxError, Result};
use njvox_core::types::{now_rfc3339, Oid};
use njvox_guard::GuardOutcome;
use rusqlite::{params, Connection};
use tracing::info;

use crate::types::{SavedQuery, SavedQueryUpdate};

/// How long a just-deleted `list_id` is kept in the recently-deleted
/// filter. Set to the backing store's documented write-visibility
/// latency; for the bundled SQLite backend writes are immediately
/// visible, but the filter is kept anyway so swapping in a
/// streaming-buffered store later doesn't reintroduce the bug it guards
/// against.
const RECENTLY_DELETED_TTL: Duration = Duration::from_secs(10);

/// Persists named query definitions scoped to a user. Rows, not results,
/// are stored — re-running a list always re-executes against the live
/// warehouse.
pub struct ArtifactStore {
    db: Mutex<Connection>,
    recently_deleted: DashMap<String, Instant>,
}

impl ArtifactStore {
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(crate::schema::SCHEMA)?;
        Ok(Self {
            db: Mutex::new(conn),
            recently_deleted: DashMap::new(),
        })
    }

    /// Validate `sql_text` against the Query Guard before it's ever
    /// persisted — the invariant that `sql_text` must pass the guard at
    /// save time *and* at execution time starts here.
    fn guard_check(sql_text: &str, allowlisted_tables: &[String]) -> Result<()> {
        match njvox_guard::validate(sql_text, allowlisted_tables) {
            GuardOutcome::Accepted { .. } => Ok(()),
            GuardOutcome::Rejected { reason } => Err(NjvoxError::GuardReject(reason)),
        }
    }

    pub fn save(
        &self,
        owner_user_id: &str,
        name: &str,
        description: Option<&str>,
        sql_text: &str,
        natural_language_prompt: Option<&str>,
        row_count: Option<u64>,
        allowlisted_tables: &[String],
    ) -> Result<SavedQuery> {
        Self::guard_check(sql_text, allowlisted_tables)?;

        let list_id = Oid::new().to_string();
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO saved_queries
             (list_id, owner_user_id, name, description, sql_text,
              natural_language_prompt, row_count, created_at, updated_at,
              is_active, access_count, last_accessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, 1, 0, NULL)",
            params![
                list_id,
                owner_user_id,
                name,
                description,
                sql_text,
                natural_language_prompt,
                row_count.map(|v| v as i64),
                now,
            ],
        )?;
        info!(list_id = %list_id, owner_user_id, "saved query artifact created");
        self.get(&list_id, owner_user_id)?
            .ok_or_else(|| NjvoxError::Internal("saved query vanished after insert".into()))
    }

    /// Active artifacts owned by `user_id`, newest-updated first.
    /// Soft-deleted items never appear, even if the backing store would
    /// otherwise still be showing them due to write-visibility delay.
    pub fn list(&self, user_id: &str) -> Result<Vec<SavedQuery>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT list_id, owner_user_id, name, description, sql_text,
                    natural_language_prompt, row_count, created_at, updated_at,
                    is_active, access_count, last_accessed_at
             FROM saved_queries
             WHERE owner_user_id = ?1 AND is_active = 1
             ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_saved_query)?;
        let items: Vec<SavedQuery> = rows
            .filter_map(|r| r.ok())
            .filter(|sq| !self.recently_deleted.contains_key(&sq.list_id))
            .collect();
        Ok(items)
    }

    pub fn get(&self, list_id: &str, user_id: &str) -> Result<Option<SavedQuery>> {
        if self.recently_deleted.contains_key(list_id) {
            return Ok(None);
        }
        let db = self.db.lock().unwrap();
        let result = db.query_row(
            "SELECT list_id, owner_user_id, name, description, sql_text,
                    natural_language_prompt, row_count, created_at, updated_at,
                    is_active, access_count, last_accessed_at
             FROM saved_queries
             WHERE list_id = ?1 AND owner_user_id = ?2",
            params![list_id, user_id],
            row_to_saved_query,
        );
        match result {
            Ok(sq) => Ok(Some(sq)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Field-level update. Ownership is never a mutable field — there is
    /// no way to pass a new `owner_user_id` through [`SavedQueryUpdate`].
    pub fn update(
        &self,
        list_id: &str,
        user_id: &str,
        update: SavedQueryUpdate,
        allowlisted_tables: &[String],
    ) -> Result<SavedQuery> {
        if let Some(sql_text) = &update.sql_text {
            Self::guard_check(sql_text, allowlisted_tables)?;
        }

        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE saved_queries SET
                name = COALESCE(?3, name),
                description = COALESCE(?4, description),
                sql_text = COALESCE(?5, sql_text),
                natural_language_prompt = COALESCE(?6, natural_language_prompt),
                row_count = COALESCE(?7, row_count),
                updated_at = ?8
             WHERE list_id = ?1 AND owner_user_id = ?2",
            params![
                list_id,
                user_id,
                update.name,
                update.description,
                update.sql_text,
                update.natural_language_prompt,
                update.row_count.map(|v| v as i64),
                now,
            ],
        )?;
        drop(db);

        if rows == 0 {
            return Err(NjvoxError::NotFound(format!("list {}", list_id)));
        }
        self.get(list_id, user_id)?
            .ok_or_else(|| NjvoxError::NotFound(format!("list {}", list_id)))
    }

    /// Soft-delete: `is_active` flips to false and the id enters the
    /// recently-deleted filter so `list` is consistent immediately,
    /// regardless of backing-store visibility latency.
    pub fn soft_delete(&self, list_id: &str, user_id: &str) -> Result<()> {
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE saved_queries SET is_active = 0, updated_at = ?3
             WHERE list_id = ?1 AND owner_user_id = ?2",
            params![list_id, user_id, now],
        )?;
        drop(db);

        if rows == 0 {
            return Err(NjvoxError::NotFound(format!("list {}", list_id)));
        }
        self.recently_deleted
            .insert(list_id.to_string(), Instant::now());
        self.sweep_recently_deleted();
        Ok(())
    }

    pub fn increment_access(&self, list_id: &str) -> Result<()> {
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE saved_queries SET access_count = access_count + 1, last_accessed_at = ?2
             WHERE list_id = ?1",
            params![list_id, now],
        )?;
        Ok(())
    }

    fn sweep_recently_deleted(&self) {
        self.recently_deleted
            .retain(|_, inserted_at| inserted_at.elapsed() < RECENTLY_DELETED_TTL);
    }
}

fn row_to_saved_query(row: &rusqlite::Row<'_>) -> rusqlite::Result<SavedQuery> {
    let row_count: Option<i64> = row.get(6)?;
    let is_active: i64 = row.get(9)?;
    Ok(SavedQuery {
        list_id: row.get(0)?,
        owner_user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        sql_text: row.get(4)?,
        natural_language_prompt: row.get(5)?,
        row_count: row_count.map(|v| v as u64),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        is_active: is_active != 0,
        access_count: {
            let v: i64 = row.get(10)?;
            v as u64
        },
        last_accessed_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ArtifactStore {
        ArtifactStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn allowlist() -> Vec<String> {
        vec!["proj.voters.voters".to_string()]
    }

    #[test]
    fn save_then_get_roundtrips() {
        let s = store();
        let sq = s
            .save(
                "u1",
                "my list",
                None,
                "SELECT * FROM proj.voters.voters",
                None,
                None,
                &allowlist(),
            )
            .unwrap();
        let fetched = s.get(&sq.list_id, "u1").unwrap().unwrap();
        assert_eq!(fetched.name, "my list");
        assert!(fetched.is_active);
    }

    #[test]
    fn save_rejects_non_select() {
        let s = store();
        let err = s
            .save(
                "u1",
                "bad",
                None,
                "DELETE FROM proj.voters.voters",
                None,
                None,
                &allowlist(),
            )
            .unwrap_err();
        assert!(matches!(err, NjvoxError::GuardReject(_)));
    }

    #[test]
    fn soft_delete_hides_from_list_immediately() {
        let s = store();
        let sq = s
            .save(
                "u1",
                "to delete",
                None,
                "SELECT 1",
                None,
                None,
                &allowlist(),
            )
            .unwrap();
        s.soft_delete(&sq.list_id, "u1").unwrap();
        let listed = s.list("u1").unwrap();
        assert!(listed.is_empty());
        assert!(s.get(&sq.list_id, "u1").unwrap().is_none());
    }

    #[test]
    fn update_cannot_change_owner() {
        let s = store();
        let sq = s
            .save("u1", "n", None, "SELECT 1", None, None, &allowlist())
            .unwrap();
        let updated = s
            .update(
                &sq.list_id,
                "u1",
                SavedQueryUpdate {
                    name: Some("renamed".into()),
                    ..Default::default()
                },
                &allowlist(),
            )
            .unwrap();
        assert_eq!(updated.owner_user_id, "u1");
        assert_eq!(updated.name, "renamed");
    }

    #[test]
    fn list_orders_by_updated_at_desc() {
        let s = store();
        let a = s
            .save("u1", "a", None, "SELECT 1", None, None, &allowlist())
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let _b = s
            .save("u1", "b", None, "SELECT 1", None, None, &allowlist())
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        s.update(
            &a.list_id,
            "u1",
            SavedQueryUpdate {
                description: Some("touch".into()),
                ..Default::default()
            },
            &allowlist(),
        )
        .unwrap();
        let listed = s.list("u1").unwrap();
        assert_eq!(listed[0].list_id, a.list_id);
    }
}
