use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::{ok, ApiResult, AppState};
use crate::amount::{self, Amount};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub user_id: String,
    #[serde(with = "amount::as_usd")]
    pub amount: Amount,
    pub method: String,
    pub wallet_address: String,
}

/// The OTP goes out by email only, never in the response
pub async fn request(
    State(state): State<AppState>,
    Json(req): Json<WithdrawalRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let withdrawal = state
        .platform
        .request_withdrawal(&req.user_id, req.amount, &req.method, &req.wallet_address)
        .await?;
    Ok((
        StatusCode::CREATED,
        ok(serde_json::json!({
            "withdrawal": withdrawal,
            "otpExpiresInSecs": state.platform.schedule.otp_ttl_secs,
        }))?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    #[serde(with = "amount::as_usd")]
    pub amount: Amount,
}

pub async fn quote(
    State(state): State<AppState>,
    Query(q): Query<QuoteQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let schedule = &state.platform.schedule;
    ok(serde_json::json!({
        "quote": state.platform.withdrawals.quote(q.amount),
        "minimum": amount::format_usd(schedule.withdrawal_minimum),
    }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub otp: String,
}

pub async fn verify(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let withdrawal = state.platform.verify_withdrawal_otp(&id, &req.otp)?;
    ok(serde_json::json!({ "withdrawal": withdrawal }))
}

pub async fn get_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let withdrawal = state.platform.withdrawals.withdrawal(&id)?;
    ok(serde_json::json!({ "withdrawal": withdrawal }))
}

pub async fn withdrawals_for(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let withdrawals = state.platform.withdrawals.withdrawals_for(&id)?;
    ok(serde_json::json!({ "withdrawals": withdrawals }))
}
