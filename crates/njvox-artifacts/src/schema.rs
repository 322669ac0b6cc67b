pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS saved_queries (
    list_id               TEXT PRIMARY KEY,
    owner_user_id         TEXT NOT NULL,
    name                  TEXT NOT NULL,
    description           TEXT,
    sql_text              TEXT NOT NULL,
    natural_language_prompt TEXT,
    row_count             INTEGER,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL,
    is_active             INTEGER NOT NULL DEFAULT 1,
    access_count          INTEGER NOT NULL DEFAULT 0,
    last_accessed_at      TEXT
);

CREATE INDEX IF NOT EXISTS idx_saved_queries_owner
    ON saved_queries (owner_user_id, updated_at DESC);
"#;
