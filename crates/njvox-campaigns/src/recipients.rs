use njvox_core::error::{NjvoxError, Result};
use njvox_remap::FieldRemapper;
use njvox_warehouse::WarehouseClient;
use serde_json::Value;
use tracing::{info, warn};

use crate::email::EmailRecipient;

/// Recipient set is capped here regardless of how many person ids the
/// list query resolves to.
pub const RECIPIENT_SAFETY_CAP: usize = 1000;

/// How to recover `person_id` from a stored list query that doesn't
/// already project one. Supplied by configuration since the join back
/// to an identity table is warehouse-schema specific; the engine never
/// guesses it.
#[derive(Debug, Clone)]
pub struct PersonIdRecovery {
    pub person_id_column: String,
    /// SQL fragment appended after `FROM list_results` to join back to
    /// the table that owns `person_id`, e.g.
    /// `JOIN proj.dataset.individuals idv ON idv.key = list_results.key`.
    pub recovery_join: String,
}

fn projects_person_id(sql: &str, person_id_column: &str) -> bool {
    let needle = person_id_column.to_lowercase();
    sql.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .any(|token| token == needle)
}

/// Wraps `stored_sql` to guarantee a `person_id` projection without
/// mutating the stored query itself — the wrapping is local to the send
/// operation.
pub fn wrap_for_person_id(stored_sql: &str, recovery: &PersonIdRecovery) -> String {
    if projects_person_id(stored_sql, &recovery.person_id_column) {
        format!(
            "WITH list_results AS ({stored_sql}) SELECT DISTINCT {col} AS person_id FROM list_results",
            col = recovery.person_id_column
        )
    } else {
        format!(
            "WITH list_results AS ({stored_sql}) SELECT DISTINCT idv.{col} AS person_id \
             FROM list_results {join}",
            col = recovery.person_id_column,
            join = recovery.recovery_join
        )
    }
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Resolves a `SavedQuery`'s stored SQL to an email-bearing recipient
/// set: recover `person_id`s via one warehouse call, then fetch contact
/// fields for those ids via a second, engine-controlled query.
#[allow(clippy::too_many_arguments)]
pub async fn resolve_recipients(
    client: &dyn WarehouseClient,
    remapper: &FieldRemapper,
    stored_sql: &str,
    recovery: &PersonIdRecovery,
    allowlisted_tables: &[String],
    contact_table: &str,
    row_cap: u64,
    timeout_secs: u64,
) -> Result<Vec<EmailRecipient>> {
    let wrapped = wrap_for_person_id(stored_sql, recovery);
    let id_result = njvox_warehouse::execute(
        client,
        allowlisted_tables,
        remapper,
        &wrapped,
        row_cap,
        timeout_secs,
        "campaign-recipient-ids",
    )
    .await
    .map_err(|e| NjvoxError::Backend(e.detail))?;

    let person_id_idx = id_result
        .columns
        .iter()
        .position(|c| c == "person_id")
        .ok_or_else(|| NjvoxError::Backend("recipient query did not return person_id".into()))?;

    let mut person_ids: Vec<String> = id_result
        .rows
        .iter()
        .filter_map(|row| row.get(person_id_idx).and_then(value_to_string))
        .collect();

    if person_ids.len() > RECIPIENT_SAFETY_CAP {
        warn!(
            resolved = person_ids.len(),
            cap = RECIPIENT_SAFETY_CAP,
            "recipient set exceeds safety cap, truncating"
        );
        person_ids.truncate(RECIPIENT_SAFETY_CAP);
    }

    if person_ids.is_empty() {
        return Ok(Vec::new());
    }

    let id_list = person_ids
        .iter()
        .map(|id| format!("'{}'", id.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(",");

    let email_query = format!(
        "SELECT person_id, email, first_name, last_name, city \
         FROM {contact_table} \
         WHERE person_id IN ({id_list}) \
         AND email IS NOT NULL AND email != '' AND email LIKE '%@%'"
    );

    let contact_result = njvox_warehouse::execute(
        client,
        allowlisted_tables,
        remapper,
        &email_query,
        RECIPIENT_SAFETY_CAP as u64,
        timeout_secs,
        "campaign-recipient-contacts",
    )
    .await
    .map_err(|e| NjvoxError::Backend(e.detail))?;

    let col_idx = |name: &str| contact_result.columns.iter().position(|c| c == name);
    let (pid_i, email_i, first_i, last_i, city_i) = (
        col_idx("person_id"),
        col_idx("email"),
        col_idx("first_name"),
        col_idx("last_name"),
        col_idx("city"),
    );

    let recipients: Vec<EmailRecipient> = contact_result
        .rows
        .iter()
        .filter_map(|row| {
            let person_id = pid_i.and_then(|i| row.get(i)).and_then(value_to_string)?;
            let email = email_i.and_then(|i| row.get(i)).and_then(value_to_string)?;
            Some(EmailRecipient {
                person_id,
                email,
                first_name: first_i
                    .and_then(|i| row.get(i))
                    .and_then(value_to_string)
                    .unwrap_or_default(),
                last_name: last_i
                    .and_then(|i| row.get(i))
                    .and_then(value_to_string)
                    .unwrap_or_default(),
                city: city_i
                    .and_then(|i| row.get(i))
                    .and_then(value_to_string)
                    .unwrap_or_default(),
            })
        })
        .collect();

    info!(
        resolved = person_ids.len(),
        with_email = recipients.len(),
        "recipient resolution complete"
    );
    Ok(recipients)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recovery() -> PersonIdRecovery {
        PersonIdRecovery {
            person_id_column: "person_id".into(),
            recovery_join: "JOIN proj.dataset.individuals idv ON idv.key = list_results.key".into(),
        }
    }

    #[test]
    fn already_projecting_person_id_skips_join() {
        let wrapped = wrap_for_person_id("SELECT person_id FROM proj.dataset.voters", &recovery());
        assert!(!wrapped.contains("idv."));
        assert!(wrapped.contains("SELECT DISTINCT person_id AS person_id"));
    }

    #[test]
    fn missing_person_id_adds_recovery_join() {
        let wrapped = wrap_for_person_id("SELECT name FROM proj.dataset.voters", &recovery());
        assert!(wrapped.contains("JOIN proj.dataset.individuals idv"));
    }

    #[test]
    fn never_mutates_stored_sql() {
        let stored = "SELECT name FROM proj.dataset.voters";
        let wrapped = wrap_for_person_id(stored, &recovery());
        assert!(wrapped.contains(stored));
    }
}
