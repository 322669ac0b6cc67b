use njvox_core::error::Result;
use rusqlite::Connection;

/// Create the `sessions` and `messages` tables and their indexes.
/// Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            session_id  TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            name        TEXT NOT NULL,
            model_id    TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            is_active   INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_user
            ON sessions (user_id, updated_at DESC);

        CREATE TABLE IF NOT EXISTS messages (
            message_id      TEXT PRIMARY KEY,
            session_id      TEXT NOT NULL,
            role            TEXT NOT NULL,
            text            TEXT NOT NULL,
            timestamp       TEXT NOT NULL,
            sequence_number INTEGER NOT NULL,
            UNIQUE (session_id, sequence_number)
        );
        CREATE INDEX IF NOT EXISTS idx_messages_session
            ON messages (session_id, sequence_number);",
    )?;
    Ok(())
}
