use serde::{Deserialize, Serialize};

/// A reusable query definition scoped to its owning user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedQuery {
    pub list_id: String,
    pub owner_user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub sql_text: String,
    pub natural_language_prompt: Option<String>,
    /// Last observed row count; may be stale until the list is re-run.
    pub row_count: Option<u64>,
    pub created_at: String,
    pub updated_at: String,
    pub is_active: bool,
    pub access_count: u64,
    pub last_accessed_at: Option<String>,
}

/// Field-level update. `owner_user_id` is deliberately absent — the store
/// rejects mutation of ownership by construction, not by runtime check.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SavedQueryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sql_text: Option<String>,
    pub natural_language_prompt: Option<String>,
    pub row_count: Option<u64>,
}
