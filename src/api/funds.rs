//! Investments and deposits

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use super::security::require_admin;
use super::{ok, ApiResult, AppState};
use crate::amount::{self, Amount};
use crate::models::PackageType;

fn default_package() -> PackageType {
    PackageType::FsIncome
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvestmentRequest {
    pub user_id: String,
    #[serde(with = "amount::as_usd")]
    pub amount: Amount,
    #[serde(default = "default_package")]
    pub package_type: PackageType,
}

/// Direct package booking by an operator; members go through `/deposits`
pub async fn create_investment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateInvestmentRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    require_admin(&headers, state.admin_token())?;
    let receipt = state
        .platform
        .create_investment(&req.user_id, req.amount, req.package_type)?;
    Ok((StatusCode::CREATED, ok(receipt)?))
}

pub async fn get_investment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let investment = state.platform.investments.investment(&id)?;
    ok(serde_json::json!({ "investment": investment }))
}

pub async fn investments_for(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let investments = state.platform.investments.investments_for(&id)?;
    ok(serde_json::json!({ "investments": investments }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitDepositRequest {
    pub user_id: String,
    #[serde(with = "amount::as_usd")]
    pub amount: Amount,
    #[serde(default = "default_package")]
    pub package_type: PackageType,
    pub payment_method: String,
    #[serde(default)]
    pub payment_reference: String,
}

pub async fn submit_deposit(
    State(state): State<AppState>,
    Json(req): Json<SubmitDepositRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let deposit = state.platform.deposits.submit_deposit(
        &req.user_id,
        req.amount,
        req.package_type,
        &req.payment_method,
        &req.payment_reference,
    )?;
    Ok((StatusCode::CREATED, ok(serde_json::json!({ "deposit": deposit }))?))
}

pub async fn deposits_for(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let deposits = state.platform.deposits.deposits_for(&id)?;
    ok(serde_json::json!({ "deposits": deposits }))
}
