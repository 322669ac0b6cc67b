//! Syntactic and semantic SQL gating. Rejects anything non-`SELECT` or
//! off-allow-list. This is a tokenizer-level guard, not a full parser —
//! the allow-list is the actual security boundary (warehouse credentials
//! are scoped read-only, so a query that slips past the guard still can't
//! write). The guard's job is to fail fast with a precise reason and to
//! never silently swallow a warehouse error.

use njvox_core::error::GuardRejectReason;
use regex::Regex;
use std::sync::OnceLock;

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "CREATE", "ALTER", "DROP", "TRUNCATE", "REPLACE",
];

fn select_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)^\s*select\b").expect("valid regex"))
}

fn table_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"`?([A-Za-z0-9_-]+)\.([A-Za-z0-9_-]+)\.([A-Za-z0-9_-]+)`?").expect("valid regex")
    })
}

fn keyword_re(keyword: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword))).expect("valid regex")
}

/// Outcome of [`validate`]. `effective_sql` on acceptance is the input SQL
/// unchanged — remapping is a separate, later stage, not the
/// guard's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Accepted { effective_sql: String },
    Rejected { reason: GuardRejectReason },
}

impl GuardOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, GuardOutcome::Accepted { .. })
    }
}

/// Strip leading whitespace and SQL comments (`--` line, `/* */` block)
/// so the SELECT-prefix check isn't fooled by a leading comment.
fn strip_leading_noise(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        let trimmed = rest.trim_start();
        if let Some(stripped) = trimmed.strip_prefix("--") {
            rest = match stripped.find('\n') {
                Some(i) => &stripped[i + 1..],
                None => "",
            };
            continue;
        }
        if let Some(stripped) = trimmed.strip_prefix("/*") {
            rest = match stripped.find("*/") {
                Some(i) => &stripped[i + 2..],
                None => "",
            };
            continue;
        }
        return trimmed;
    }
}

/// Validate a SQL statement against the SELECT-only + allow-list policy.
///
/// A query with zero extracted table references is permitted — the
/// warehouse will reject malformed SQL on its own; this is not a full
/// parser and makes no attempt to be one.
pub fn validate(sql: &str, allowlisted_tables: &[String]) -> GuardOutcome {
    let body = strip_leading_noise(sql);

    for kw in FORBIDDEN_KEYWORDS {
        if keyword_re(kw).is_match(sql) {
            return GuardOutcome::Rejected {
                reason: GuardRejectReason::ForbiddenKeyword(kw.to_string()),
            };
        }
    }

    if !select_prefix_re().is_match(body) {
        return GuardOutcome::Rejected {
            reason: GuardRejectReason::NotSelect,
        };
    }

    if let Some(offending) = first_off_allowlist(sql, allowlisted_tables) {
        return GuardOutcome::Rejected {
            reason: GuardRejectReason::OffAllowlist(offending),
        };
    }

    GuardOutcome::Accepted {
        effective_sql: sql.to_string(),
    }
}

/// Every fully-qualified `project.dataset.table` reference in `sql`,
/// in order of first appearance (deduplicated).
pub fn extract_table_refs(sql: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut refs = Vec::new();
    for cap in table_ref_re().captures_iter(sql) {
        let full = format!("{}.{}.{}", &cap[1], &cap[2], &cap[3]);
        if seen.insert(full.to_lowercase()) {
            refs.push(full);
        }
    }
    refs
}

fn first_off_allowlist(sql: &str, allowlisted_tables: &[String]) -> Option<String> {
    let allowed: std::collections::HashSet<String> =
        allowlisted_tables.iter().map(|t| t.to_lowercase()).collect();
    extract_table_refs(sql)
        .into_iter()
        .find(|r| !allowed.contains(&r.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowlist() -> Vec<String> {
        vec!["nj-voter-analytics.voters.voters".to_string()]
    }

    #[test]
    fn accepts_plain_select_on_allowlisted_table() {
        let sql = "SELECT COUNT(*) FROM `nj-voter-analytics.voters.voters`";
        assert_eq!(
            validate(sql, &allowlist()),
            GuardOutcome::Accepted {
                effective_sql: sql.to_string()
            }
        );
    }

    #[test]
    fn rejects_non_select() {
        let sql = "SHOW TABLES";
        assert_eq!(
            validate(sql, &allowlist()),
            GuardOutcome::Rejected {
                reason: GuardRejectReason::NotSelect
            }
        );
    }

    #[test]
    fn rejects_forbidden_keyword() {
        let sql = "DELETE FROM voters.voters WHERE 1=1";
        let outcome = validate(sql, &allowlist());
        assert_eq!(
            outcome,
            GuardOutcome::Rejected {
                reason: GuardRejectReason::ForbiddenKeyword("DELETE".to_string())
            }
        );
    }

    #[test]
    fn rejects_forbidden_keyword_inside_select_shaped_statement() {
        let sql = "SELECT * FROM voters.voters; DELETE FROM voters.voters";
        let outcome = validate(sql, &allowlist());
        assert!(matches!(
            outcome,
            GuardOutcome::Rejected {
                reason: GuardRejectReason::ForbiddenKeyword(_)
            }
        ));
    }

    #[test]
    fn rejects_off_allowlist_table() {
        let sql = "SELECT * FROM nj-voter-analytics.voters.secret_table";
        let outcome = validate(sql, &allowlist());
        assert!(matches!(
            outcome,
            GuardOutcome::Rejected {
                reason: GuardRejectReason::OffAllowlist(_)
            }
        ));
    }

    #[test]
    fn allowlist_check_is_case_insensitive() {
        let sql = "SELECT * FROM NJ-VOTER-ANALYTICS.VOTERS.VOTERS";
        assert!(validate(sql, &allowlist()).is_ok());
    }

    #[test]
    fn accepts_query_with_no_table_refs() {
        let sql = "SELECT 1";
        assert!(validate(sql, &allowlist()).is_ok());
    }

    #[test]
    fn leading_comment_does_not_bypass_select_check() {
        let sql = "-- comment\nSELECT 1";
        assert!(validate(sql, &allowlist()).is_ok());
    }
}
