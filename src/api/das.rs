use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::{ok, ApiResult, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    pub user_id: String,
}

pub async fn enroll(
    State(state): State<AppState>,
    Json(req): Json<EnrollRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let outcome = state.platform.enroll_in_das(&req.user_id)?;
    ok(outcome)
}

pub async fn countdown(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let view = state.platform.get_das_countdown(&user_id)?;
    ok(view)
}

pub async fn stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let stats = state.platform.das.get_actual_stats(&user_id)?;
    ok(stats)
}
