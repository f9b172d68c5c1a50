use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

use super::{ok, ApiResult, AppState};

pub async fn health(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let platform = &state.platform;
    ok(serde_json::json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "users": platform.store.user_count(),
        "notifier": platform.notifier.name(),
        "lastDailyRun": platform.jobs.last_run(),
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.platform.metrics.render(),
    )
}

/// Rates and thresholds the engine enforces, for display
pub async fn reward_schedule(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    ok(serde_json::json!({ "schedule": &*state.platform.schedule }))
}
