//! `/admin` routes. Every handler checks the admin token first.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use super::security::require_admin;
use super::{ok, ApiError, ApiResult, AppState};
use crate::models::{AdminDecision, Profile, UserView};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub decision: AdminDecision,
    #[serde(default)]
    pub notes: String,
}

pub async fn register_root(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(profile): Json<Profile>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    require_admin(&headers, state.admin_token())?;
    let user = state.platform.referrals.register_root(&profile).await?;
    Ok((
        StatusCode::CREATED,
        ok(serde_json::json!({ "user": UserView::from(&user) }))?,
    ))
}

pub async fn review_deposit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ReviewRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let admin_id = require_admin(&headers, state.admin_token())?;
    let review = state
        .platform
        .deposits
        .review_deposit(&id, req.decision, &req.notes, &admin_id)
        .await?;
    ok(review)
}

pub async fn cancel_investment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(&headers, state.admin_token())?;
    let investment = state.platform.investments.cancel_investment(&id)?;
    ok(serde_json::json!({ "investment": investment }))
}

pub async fn pending_withdrawals(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(&headers, state.admin_token())?;
    let withdrawals = state.platform.withdrawals.pending_for_admin()?;
    ok(serde_json::json!({ "withdrawals": withdrawals }))
}

pub async fn act_on_withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ReviewRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let admin_id = require_admin(&headers, state.admin_token())?;
    let withdrawal = state
        .platform
        .admin_act_on_withdrawal(&id, req.decision, &req.notes, &admin_id)
        .await?;
    ok(serde_json::json!({ "withdrawal": withdrawal }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub payout_reference: String,
}

pub async fn complete_withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<CompleteRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(&headers, state.admin_token())?;
    let withdrawal = state
        .platform
        .withdrawals
        .mark_completed(&id, &req.payout_reference)?;
    ok(serde_json::json!({ "withdrawal": withdrawal }))
}

#[derive(Debug, Default, Deserialize)]
pub struct DailyRequest {
    /// YYYY-MM-DD; today (UTC) when absent
    pub date: Option<String>,
}

pub async fn run_daily(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<DailyRequest>>,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(&headers, state.admin_token())?;
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let day = match req.date.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|e| ApiError::bad_request(format!("invalid date {}: {}", raw, e)))?,
        None => Utc::now().date_naive(),
    };
    let report = state.platform.jobs.run_day(day).await?;
    ok(report)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    pub user_id: Option<String>,
}

pub async fn reconcile(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<ReconcileRequest>>,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(&headers, state.admin_token())?;
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let tree = &state.platform.referrals;
    match req.user_id {
        Some(id) => {
            let repair = tree.reconcile_level_counts(&id)?;
            ok(serde_json::json!({ "repair": repair }))
        }
        None => {
            let report = tree.reconcile_all()?;
            ok(report)
        }
    }
}
