use std::time::Instant;

use njvox_guard::GuardOutcome;
use njvox_remap::FieldRemapper;
use serde::Serialize;
use tracing::{info, warn};

use crate::client::{SubmitOptions, WarehouseClient};

/// A result streamed straight to the caller — never persisted. Carries
/// both SQL forms so a warehouse error or a surprising answer can always
/// be traced back to what was actually sent.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    pub truncated: bool,
    pub elapsed_ms: u64,
    pub original_sql: String,
    pub effective_sql: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorResultKind {
    GuardReject,
    Backend,
    Timeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResult {
    pub kind: ErrorResultKind,
    pub detail: String,
    pub original_sql: String,
    pub effective_sql: Option<String>,
}

/// `execute(sql, caller_context) → QueryResult | ErrorResult`,
///
/// 1. Guard. 2. Remap. 3. Submit with cache/timeout/row-cap/label.
/// 4. Truncation detection. 5. Coercion (delegated to
///    [`crate::client::WarehouseValue::to_json`]). 6. Assemble result.
pub async fn execute(
    client: &dyn WarehouseClient,
    allowlisted_tables: &[String],
    remapper: &FieldRemapper,
    sql: &str,
    row_cap: u64,
    timeout_secs: u64,
    caller_label: &str,
) -> Result<QueryResult, ErrorResult> {
    let effective_sql = match njvox_guard::validate(sql, allowlisted_tables) {
        GuardOutcome::Rejected { reason } => {
            warn!(reason = %reason, "query guard rejected statement");
            return Err(ErrorResult {
                kind: ErrorResultKind::GuardReject,
                detail: reason.to_string(),
                original_sql: sql.to_string(),
                effective_sql: None,
            });
        }
        GuardOutcome::Accepted { effective_sql } => effective_sql,
    };

    let effective_sql = remapper.apply(&effective_sql);

    let opts = SubmitOptions {
        row_cap,
        timeout_secs,
        query_cache: true,
        label: caller_label.to_string(),
    };

    let started = Instant::now();
    let submit = tokio::time::timeout(
        std::time::Duration::from_secs(timeout_secs),
        client.submit(&effective_sql, opts),
    )
    .await;

    let elapsed_ms = started.elapsed().as_millis() as u64;

    let rows = match submit {
        Err(_elapsed) => {
            return Err(ErrorResult {
                kind: ErrorResultKind::Timeout,
                detail: format!("warehouse query exceeded {}s", timeout_secs),
                original_sql: sql.to_string(),
                effective_sql: Some(effective_sql),
            });
        }
        Ok(Err(e)) => {
            return Err(ErrorResult {
                kind: ErrorResultKind::Backend,
                detail: e.to_string(),
                original_sql: sql.to_string(),
                effective_sql: Some(effective_sql),
            });
        }
        Ok(Ok(rows)) => rows,
    };

    let row_count = rows.rows.len();
    let truncated = rows
        .total_rows
        .map(|total| total > row_count as u64)
        .unwrap_or(false);

    info!(
        row_count,
        truncated, elapsed_ms, label = caller_label, "warehouse query complete"
    );

    Ok(QueryResult {
        columns: rows.columns,
        rows: rows
            .rows
            .into_iter()
            .map(|row| row.iter().map(|v| v.to_json()).collect())
            .collect(),
        row_count,
        truncated,
        elapsed_ms,
        original_sql: sql.to_string(),
        effective_sql,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{WarehouseRows, WarehouseValue};
    use async_trait::async_trait;

    struct FixtureClient {
        rows: Vec<Vec<WarehouseValue>>,
        columns: Vec<String>,
        total_rows: Option<u64>,
    }

    #[async_trait]
    impl WarehouseClient for FixtureClient {
        async fn submit(
            &self,
            _sql: &str,
            _opts: SubmitOptions,
        ) -> njvox_core::error::Result<WarehouseRows> {
            Ok(WarehouseRows {
                columns: self.columns.clone(),
                rows: self.rows.clone(),
                total_rows: self.total_rows,
            })
        }
    }

    fn allowlist() -> Vec<String> {
        vec!["proj.voters.voters".to_string()]
    }

    #[tokio::test]
    async fn guard_reject_short_circuits_before_submit() {
        let client = FixtureClient {
            rows: vec![],
            columns: vec![],
            total_rows: None,
        };
        let remapper = FieldRemapper::nj_voter_defaults();
        let err = execute(
            &client,
            &allowlist(),
            &remapper,
            "DELETE FROM proj.voters.voters",
            1000,
            60,
            "test",
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorResultKind::GuardReject);
    }

    #[tokio::test]
    async fn successful_query_reports_effective_sql_and_coerced_rows() {
        let client = FixtureClient {
            rows: vec![vec![WarehouseValue::Int(1), WarehouseValue::Numeric("3.50".into())]],
            columns: vec!["n".into(), "amt".into()],
            total_rows: Some(1),
        };
        let remapper = FieldRemapper::nj_voter_defaults();
        let result = execute(
            &client,
            &allowlist(),
            &remapper,
            "SELECT COUNT(*) n, amount amt FROM proj.voters.voters WHERE party = 'Republican'",
            1000,
            60,
            "test",
        )
        .await
        .unwrap();
        assert!(result.effective_sql.contains("demo_party"));
        assert!(result.effective_sql.contains("'REPUBLICAN'"));
        assert_eq!(result.row_count, 1);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn truncation_detected_when_total_exceeds_captured_rows() {
        let client = FixtureClient {
            rows: vec![vec![WarehouseValue::Int(1)]],
            columns: vec!["n".into()],
            total_rows: Some(5),
        };
        let remapper = FieldRemapper::nj_voter_defaults();
        let result = execute(
            &client,
            &allowlist(),
            &remapper,
            "SELECT n FROM proj.voters.voters",
            1,
            60,
            "test",
        )
        .await
        .unwrap();
        assert!(result.truncated);
    }
}
