use njvox_core::types::Role;
use serde::{Deserialize, Serialize};

/// A conversation container. `name` is derived from the
/// first user turn and never recomputed afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub name: String,
    pub model_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub is_active: bool,
}

/// One turn of one speaker. `sequence_number` is
/// strictly increasing and gap-free within a `session_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub session_id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: String,
    pub sequence_number: i64,
}

/// Truncate `text` to `width` chars for use as a derived session name,
/// collapsing internal whitespace runs the way a title would read.
pub fn derive_session_name(text: &str, width: usize) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(width.saturating_sub(1)).collect();
    format!("{truncated}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_passes_through() {
        assert_eq!(derive_session_name("hi there", 40), "hi there");
    }

    #[test]
    fn long_text_truncates_with_ellipsis() {
        let text = "a".repeat(100);
        let name = derive_session_name(&text, 20);
        assert_eq!(name.chars().count(), 20);
        assert!(name.ends_with('…'));
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(derive_session_name("hi   there\n\nfriend", 40), "hi there friend");
    }
}
