use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use njvox_artifacts::SavedQueryUpdate;
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::auth::authenticate;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateListRequest {
    pub name: String,
    pub description: Option<String>,
    pub sql: String,
    pub natural_language_prompt: Option<String>,
    pub row_count: Option<u64>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateListRequest>,
) -> Result<Json<njvox_artifacts::SavedQuery>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    let saved = state.artifacts.save(
        &user_id,
        &req.name,
        req.description.as_deref(),
        &req.sql,
        req.natural_language_prompt.as_deref(),
        req.row_count,
        &state.layout.allowlisted_tables,
    )?;
    Ok(Json(saved))
}

pub async fn list_all(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<njvox_artifacts::SavedQuery>>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    Ok(Json(state.artifacts.list(&user_id)?))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<njvox_artifacts::SavedQuery>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    match state.artifacts.get(&id, &user_id)? {
        Some(q) => Ok(Json(q)),
        None => Err(ApiError(njvox_core::error::NjvoxError::NotFound(format!("list {id}")))),
    }
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(update): Json<SavedQueryUpdate>,
) -> Result<Json<njvox_artifacts::SavedQuery>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    let saved = state.artifacts.update(&id, &user_id, update, &state.layout.allowlisted_tables)?;
    Ok(Json(saved))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    state.artifacts.soft_delete(&id, &user_id)?;
    Ok(Json(json!({ "ok": true })))
}

/// Re-executes the list's stored SQL through the safety-gated executor
/// and bumps its access counter.
pub async fn run(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    let saved = state
        .artifacts
        .get(&id, &user_id)?
        .ok_or_else(|| njvox_core::error::NjvoxError::NotFound(format!("list {id}")))?;

    let result = njvox_warehouse::execute(
        state.warehouse.as_ref(),
        &state.layout.allowlisted_tables,
        &state.remapper,
        &saved.sql_text,
        state.layout.row_cap,
        state.layout.query_timeout_secs,
        "http-list-run",
    )
    .await;

    state.artifacts.increment_access(&id)?;

    match result {
        Ok(r) => Ok(Json(json!({
            "rows": r.rows,
            "columns": r.columns,
            "total_count": r.row_count,
            "truncated": r.truncated,
        }))),
        Err(e) => Ok(Json(json!({
            "error": { "kind": format!("{:?}", e.kind), "detail": e.detail }
        }))),
    }
}

#[derive(Deserialize)]
pub struct RegenerateSqlRequest {
    pub prompt: String,
}

/// Regenerates the list's SQL from a fresh natural-language prompt,
/// reusing the same runtime path as `/query/generate-sql`, then persists
/// the new SQL onto the existing list.
pub async fn regenerate_sql(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RegenerateSqlRequest>,
) -> Result<Json<njvox_artifacts::SavedQuery>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    state
        .artifacts
        .get(&id, &user_id)?
        .ok_or_else(|| njvox_core::error::NjvoxError::NotFound(format!("list {id}")))?;

    let instruction = format!(
        "Produce exactly one read-only BigQuery SELECT statement for this request, \
         using only the allow-listed tables, and respond with the SQL and nothing else:\n{}",
        req.prompt
    );
    let history = vec![njvox_agent::TurnMessage { role: njvox_core::types::Role::User, text: instruction }];
    let outcome = state
        .agent
        .respond("list-regenerate-sql", &user_id, &state.config.agent.default_model_id, &history)
        .await;
    let sql = match outcome {
        njvox_agent::AssistantOutcome::Text(text) => text.trim().trim_start_matches("```sql").trim_start_matches("```").trim_end_matches("```").trim().to_string(),
        njvox_agent::AssistantOutcome::StartNewSession => String::new(),
    };

    let update = SavedQueryUpdate {
        sql_text: Some(sql),
        natural_language_prompt: Some(req.prompt),
        ..Default::default()
    };
    let saved = state.artifacts.update(&id, &user_id, update, &state.layout.allowlisted_tables)?;
    Ok(Json(saved))
}

/// Streams the list's last-run rows back as CSV.
pub async fn export_csv(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    let saved = state
        .artifacts
        .get(&id, &user_id)?
        .ok_or_else(|| njvox_core::error::NjvoxError::NotFound(format!("list {id}")))?;

    let result = njvox_warehouse::execute(
        state.warehouse.as_ref(),
        &state.layout.allowlisted_tables,
        &state.remapper,
        &saved.sql_text,
        state.layout.row_cap,
        state.layout.query_timeout_secs,
        "http-list-export",
    )
    .await
    .map_err(|e| njvox_core::error::NjvoxError::Backend(e.detail))?;

    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer
        .write_record(&result.columns)
        .map_err(|e| njvox_core::error::NjvoxError::Internal(e.to_string()))?;
    for row in &result.rows {
        let record: Vec<String> = row.iter().map(json_value_to_csv_field).collect();
        writer
            .write_record(&record)
            .map_err(|e| njvox_core::error::NjvoxError::Internal(e.to_string()))?;
    }
    let bytes = writer.into_inner().map_err(|e| njvox_core::error::NjvoxError::Internal(e.to_string()))?;

    Ok((
        [
            ("content-type", "text/csv"),
            ("content-disposition", &format!("attachment; filename=\"{id}.csv\"")),
        ],
        bytes,
    )
        .into_response())
}

fn json_value_to_csv_field(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
