use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use njvox_campaigns::{Campaign, CampaignEvent, CampaignStatus, CampaignUpdate};
use njvox_core::error::NjvoxError;
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::auth::authenticate;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateCampaignRequest {
    pub list_id: String,
    pub subject: String,
    pub document_ref: String,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<Json<Campaign>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    let campaign = state.campaigns.create(&user_id, &req.list_id, &req.subject, &req.document_ref)?;
    Ok(Json(campaign))
}

fn parse_status(s: &str) -> Option<CampaignStatus> {
    match s {
        "draft" => Some(CampaignStatus::Draft),
        "sending" => Some(CampaignStatus::Sending),
        "partial" => Some(CampaignStatus::Partial),
        "sent" => Some(CampaignStatus::Sent),
        "failed" => Some(CampaignStatus::Failed),
        _ => None,
    }
}

#[derive(Deserialize)]
pub struct ListCampaignsQuery {
    pub status: Option<String>,
}

pub async fn list_all(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::extract::Query(q): axum::extract::Query<ListCampaignsQuery>,
) -> Result<Json<Vec<Campaign>>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    let status = q.status.as_deref().and_then(parse_status);
    Ok(Json(state.campaigns.list(&user_id, status)?))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    match state.campaigns.get(&id, &user_id)? {
        Some(c) => Ok(Json(c)),
        None => Err(ApiError(NjvoxError::NotFound(format!("campaign {id}")))),
    }
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(update): Json<CampaignUpdate>,
) -> Result<Json<Campaign>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    Ok(Json(state.campaigns.update(&id, &user_id, update)?))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    state.campaigns.delete(&id, &user_id)?;
    Ok(Json(json!({ "ok": true })))
}

async fn send_campaign(
    state: &AppState,
    campaign_id: &str,
    user_id: &str,
    test_email: Option<&str>,
) -> Result<(), ApiError> {
    let campaign = state
        .campaigns
        .get(campaign_id, user_id)?
        .ok_or_else(|| NjvoxError::NotFound(format!("campaign {campaign_id}")))?;
    let list = state
        .artifacts
        .get(&campaign.list_id, user_id)?
        .ok_or_else(|| NjvoxError::NotFound(format!("list {}", campaign.list_id)))?;

    state
        .campaigns
        .send(
            campaign_id,
            user_id,
            &list.sql_text,
            &state.layout.person_id_recovery,
            &state.layout.allowlisted_tables,
            &state.layout.contact_table,
            state.layout.row_cap,
            state.layout.query_timeout_secs,
            test_email,
        )
        .await?;
    Ok(())
}

/// Resolves recipients from the campaign's list and dispatches the
/// campaign's document to all of them.
pub async fn send(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    send_campaign(&state, &id, &user_id, None).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct TestSendRequest {
    pub email: String,
}

/// Sends the campaign's document to a single test address, bypassing
/// list resolution entirely.
pub async fn test(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<TestSendRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    send_campaign(&state, &id, &user_id, Some(&req.email)).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<njvox_campaigns::CampaignStats>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    let campaign = state
        .campaigns
        .get(&id, &user_id)?
        .ok_or_else(|| NjvoxError::NotFound(format!("campaign {id}")))?;
    Ok(Json(campaign.stats))
}

pub async fn events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<CampaignEvent>>, ApiError> {
    let user_id = authenticate(&headers, &state.config)?;
    state
        .campaigns
        .get(&id, &user_id)?
        .ok_or_else(|| NjvoxError::NotFound(format!("campaign {id}")))?;
    Ok(Json(state.campaigns.list_events(&id)?))
}
