use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::{ok, ApiResult, AppState};
use crate::config::SMARTLINE_DEPTH;
use crate::ledger::{self, LedgerSummary};
use crate::models::{EntryType, Profile, UserView};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub sponsor_id: String,
    #[serde(flatten)]
    pub profile: Profile,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let user = state
        .platform
        .register_user(&req.sponsor_id, &req.profile)
        .await?;
    let body = ok(serde_json::json!({ "user": UserView::from(&user) }))?;
    Ok((StatusCode::CREATED, body))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let user = state.platform.referrals.user(&id)?;
    ok(serde_json::json!({ "user": UserView::from(&user) }))
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(rename = "type")]
    pub kind: Option<EntryType>,
}

pub async fn transactions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<TransactionsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let store = &state.platform.store;
    store.require_user(&id)?;
    let entries = ledger::history(store, &id, q.kind)?;
    let summary = LedgerSummary::of(&entries);
    ok(serde_json::json!({ "entries": entries, "summary": summary }))
}

#[derive(Debug, Deserialize)]
pub struct ReferralsQuery {
    pub depth: Option<usize>,
}

pub async fn referrals(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<ReferralsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let tree = &state.platform.referrals;
    let user = tree.user(&id)?;
    let levels = tree.downline(&id, q.depth.unwrap_or(SMARTLINE_DEPTH))?;
    ok(serde_json::json!({
        "referralCount": user.referral_count,
        "levelCounts": user.level_counts,
        "levels": levels,
    }))
}
