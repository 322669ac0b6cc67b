use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use njvox_agent::TurnMessage;
use njvox_core::types::Role;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::auth::authenticate;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct GenerateSqlRequest {
    pub prompt: String,
}

#[derive(Serialize)]
pub struct GenerateSqlResponse {
    pub sql: String,
    pub prompt: String,
}

/// Asks the agent runtime for a single SELECT statement without
/// executing it — a convenience for UIs that want to show/edit SQL
/// before running `/query/execute`.
pub async fn generate_sql(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<GenerateSqlRequest>,
) -> Result<Json<GenerateSqlResponse>, ApiError> {
    let user_id = authenticate(&headers, &state.config).map_err(ApiError)?;

    let instruction = format!(
        "Produce exactly one read-only BigQuery SELECT statement for this request, \
         using only the allow-listed tables, and respond with the SQL and nothing else:\n{}",
        req.prompt
    );
    let history = vec![TurnMessage { role: Role::User, text: instruction }];
    let outcome = state
        .agent
        .respond("query-generate-sql", &user_id, &state.config.agent.default_model_id, &history)
        .await;

    let raw_sql = match outcome {
        njvox_agent::AssistantOutcome::Text(text) => strip_sql_fences(&text),
        njvox_agent::AssistantOutcome::StartNewSession => String::new(),
    };
    // Remap even though this endpoint never executes the SQL itself, so both
    // entry points into the executor apply identical rewriting.
    let sql = state.remapper.apply(&raw_sql);

    Ok(Json(GenerateSqlResponse { sql, prompt: req.prompt }))
}

fn strip_sql_fences(text: &str) -> String {
    text.trim()
        .trim_start_matches("```sql")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
        .to_string()
}

#[derive(Deserialize)]
pub struct ExecuteQueryRequest {
    pub sql: String,
}

/// Runs the safety-gated executor directly over the HTTP boundary
///, returning the same shape the `warehouse_select` tool would.
pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ExecuteQueryRequest>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&headers, &state.config).map_err(ApiError)?;

    match njvox_warehouse::execute(
        state.warehouse.as_ref(),
        &state.layout.allowlisted_tables,
        &state.remapper,
        &req.sql,
        state.layout.row_cap,
        state.layout.query_timeout_secs,
        "http-query-execute",
    )
    .await
    {
        Ok(result) => Ok(Json(json!({
            "rows": result.rows,
            "columns": result.columns,
            "total_count": result.row_count,
            "truncated": result.truncated,
        }))),
        Err(err) => Ok(Json(json!({
            "error": {
                "kind": format!("{:?}", err.kind),
                "detail": err.detail,
                "original_sql": err.original_sql,
                "effective_sql": err.effective_sql,
            }
        }))),
    }
}
