use std::sync::Mutex;

use njvox_core::error::{NjvoxError, Result};
use njvox_core::types::{now_rfc3339, Oid, Role};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, instrument};

use crate::types::{derive_session_name, Message, Session};

const DEFAULT_NAME_WIDTH: usize = 60;

/// Per-user ordered conversation log. Writes to a single `session_id`
/// are serialized through the same connection lock that guards the
/// `sequence_number` allocation, so two concurrent `append_message`
/// calls for the same session can never collide.
pub struct SessionStore {
    db: Mutex<Connection>,
}

impl SessionStore {
    pub fn new(conn: Connection) -> Result<Self> {
        crate::db::init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Create a new session. Returns the session row only — the caller
    /// (Chat Orchestrator) is responsible for appending the first
    /// message as a separate, explicit `append_message` call.
    #[instrument(skip(self, first_message))]
    pub fn create_session(&self, user_id: &str, first_message: &str, model_id: &str) -> Result<Session> {
        let session_id = Oid::new().to_string();
        let name = derive_session_name(first_message, DEFAULT_NAME_WIDTH);
        let now = now_rfc3339();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO sessions (session_id, user_id, name, model_id, created_at, updated_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1)",
            params![session_id, user_id, name, model_id, now],
        )?;
        info!(session_id = %session_id, user_id, "session created");

        Ok(Session {
            session_id,
            user_id: user_id.to_string(),
            name,
            model_id: model_id.to_string(),
            created_at: now.clone(),
            updated_at: now,
            is_active: true,
        })
    }

    pub fn get_session(&self, session_id: &str, user_id: &str) -> Result<Option<Session>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT session_id, user_id, name, model_id, created_at, updated_at, is_active
             FROM sessions WHERE session_id = ?1 AND user_id = ?2",
            params![session_id, user_id],
            row_to_session,
        )
        .optional()
        .map_err(NjvoxError::from)
    }

    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT session_id, user_id, name, model_id, created_at, updated_at, is_active
             FROM sessions WHERE user_id = ?1 AND is_active = 1
             ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_session)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Append a message, allocating the next gap-free `sequence_number`
    /// for this session inside the same locked critical section that
    /// performs the insert — the read-then-insert race is closed by the
    /// connection mutex, not by a database-level transaction.
    #[instrument(skip(self, text))]
    pub fn append_message(&self, session_id: &str, role: Role, text: &str) -> Result<Message> {
        let message_id = Oid::new().to_string();
        let now = now_rfc3339();

        let db = self.db.lock().unwrap();
        let next_seq: i64 = db
            .query_row(
                "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM messages WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?;

        db.execute(
            "INSERT INTO messages (message_id, session_id, role, text, timestamp, sequence_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![message_id, session_id, role.to_string(), text, now, next_seq],
        )?;
        db.execute(
            "UPDATE sessions SET updated_at = ?2 WHERE session_id = ?1",
            params![session_id, now],
        )?;

        Ok(Message {
            message_id,
            session_id: session_id.to_string(),
            role,
            text: text.to_string(),
            timestamp: now,
            sequence_number: next_seq,
        })
    }

    pub fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT message_id, session_id, role, text, timestamp, sequence_number
             FROM messages WHERE session_id = ?1 ORDER BY sequence_number ASC",
        )?;
        let rows = stmt.query_map(params![session_id], row_to_message)?;
        rows.filter_map(|r| r.ok())
            .map(Ok)
            .collect::<Result<Vec<_>>>()
    }

    pub fn update_model(&self, session_id: &str, user_id: &str, model_id: &str) -> Result<()> {
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE sessions SET model_id = ?3, updated_at = ?4
             WHERE session_id = ?1 AND user_id = ?2",
            params![session_id, user_id, model_id, now],
        )?;
        if rows == 0 {
            return Err(NjvoxError::NotFound(format!("session {}", session_id)));
        }
        Ok(())
    }

    pub fn soft_delete_session(&self, session_id: &str, user_id: &str) -> Result<()> {
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE sessions SET is_active = 0, updated_at = ?3
             WHERE session_id = ?1 AND user_id = ?2",
            params![session_id, user_id, now],
        )?;
        if rows == 0 {
            return Err(NjvoxError::NotFound(format!("session {}", session_id)));
        }
        Ok(())
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let is_active: i64 = row.get(6)?;
    Ok(Session {
        session_id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        model_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        is_active: is_active != 0,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role_str: String = row.get(2)?;
    let role: Role = role_str
        .parse()
        .unwrap_or(Role::User);
    Ok(Message {
        message_id: row.get(0)?,
        session_id: row.get(1)?,
        role,
        text: row.get(3)?,
        timestamp: row.get(4)?,
        sequence_number: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn store() -> SessionStore {
        SessionStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn create_and_fetch_session() {
        let s = store();
        let session = s.create_session("u1", "hello world", "gemini-pro").unwrap();
        let fetched = s.get_session(&session.session_id, "u1").unwrap().unwrap();
        assert_eq!(fetched.name, "hello world");
        assert!(fetched.is_active);
    }

    #[test]
    fn append_message_assigns_dense_sequence() {
        let s = store();
        let session = s.create_session("u1", "hi", "m").unwrap();
        let m1 = s.append_message(&session.session_id, Role::User, "hi").unwrap();
        let m2 = s
            .append_message(&session.session_id, Role::Assistant, "hello")
            .unwrap();
        assert_eq!(m1.sequence_number, 1);
        assert_eq!(m2.sequence_number, 2);
    }

    #[test]
    fn list_messages_is_sequence_ordered() {
        let s = store();
        let session = s.create_session("u1", "hi", "m").unwrap();
        for i in 0..5 {
            s.append_message(&session.session_id, Role::User, &format!("msg {i}"))
                .unwrap();
        }
        let msgs = s.list_messages(&session.session_id).unwrap();
        let seqs: Vec<i64> = msgs.iter().map(|m| m.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn concurrent_appends_never_collide() {
        let s = Arc::new(store());
        let session = s.create_session("u1", "hi", "m").unwrap();
        let session_id = session.session_id.clone();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let s = Arc::clone(&s);
                let session_id = session_id.clone();
                thread::spawn(move || {
                    s.append_message(&session_id, Role::User, &format!("from {i}"))
                        .unwrap()
                })
            })
            .collect();

        let mut seqs: Vec<i64> = handles
            .into_iter()
            .map(|h| h.join().unwrap().sequence_number)
            .collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (1..=8).collect::<Vec<i64>>());
    }

    #[test]
    fn soft_delete_removes_from_list() {
        let s = store();
        let session = s.create_session("u1", "hi", "m").unwrap();
        s.soft_delete_session(&session.session_id, "u1").unwrap();
        assert!(s.list_sessions("u1").unwrap().is_empty());
    }

    #[test]
    fn update_model_is_owner_scoped() {
        let s = store();
        let session = s.create_session("u1", "hi", "m1").unwrap();
        let err = s.update_model(&session.session_id, "u2", "m2").unwrap_err();
        assert!(matches!(err, NjvoxError::NotFound(_)));
    }
}
