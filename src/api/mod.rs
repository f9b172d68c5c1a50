//! HTTP surface (axum). Handlers translate JSON bodies into platform calls
//! and map [`CoreError`] kinds onto status codes.

pub mod admin;
pub mod das;
pub mod funds;
pub mod security;
pub mod system;
pub mod users;
pub mod withdrawals;

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use crate::error::{CoreError, ErrorKind};
use crate::platform::Platform;

#[derive(Clone)]
pub struct AppState {
    pub platform: Arc<Platform>,
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(platform: Arc<Platform>, admin_token: Option<String>) -> Self {
        Self {
            platform,
            admin_token: admin_token.map(Arc::from),
        }
    }

    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref()
    }
}

/// `{ok:false, code, error}` with a status derived from the error kind
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: "invalid or missing admin token".into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match err.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Dependency => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("[API] internal error: {}", err);
            "internal error".to_string()
        } else {
            err.to_string()
        };
        Self {
            status,
            code: err.code(),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "ok": false,
            "code": self.code,
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// `{ok:true, ...value}`
pub fn ok<T: Serialize>(value: T) -> ApiResult<Json<serde_json::Value>> {
    let mut body = serde_json::to_value(value).map_err(CoreError::from)?;
    match body.as_object_mut() {
        Some(map) => {
            map.insert("ok".into(), serde_json::Value::Bool(true));
            Ok(Json(body))
        }
        None => Ok(Json(serde_json::json!({ "ok": true, "data": body }))),
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let list: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    if list.is_empty() {
        // same-origin only
        CorsLayer::new().allow_methods(Any)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(list))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

pub fn router(state: AppState, max_body_bytes: usize, cors_origins: &[String]) -> Router {
    Router::new()
        // system
        .route("/health", get(system::health))
        .route("/metrics", get(system::metrics))
        .route("/config/rewards", get(system::reward_schedule))
        // users & tree
        .route("/auth/register", post(users::register))
        .route("/users/:id", get(users::get_user))
        .route("/users/:id/transactions", get(users::transactions))
        .route("/users/:id/referrals", get(users::referrals))
        .route("/users/:id/investments", get(funds::investments_for))
        .route("/users/:id/deposits", get(funds::deposits_for))
        .route("/users/:id/withdrawals", get(withdrawals::withdrawals_for))
        // funds
        .route("/investments", post(funds::create_investment))
        .route("/investments/:id", get(funds::get_investment))
        .route("/deposits", post(funds::submit_deposit))
        // withdrawals
        .route("/withdrawals", post(withdrawals::request))
        .route("/withdrawals/quote", get(withdrawals::quote))
        .route("/withdrawals/:id", get(withdrawals::get_withdrawal))
        .route("/withdrawals/:id/verify", post(withdrawals::verify))
        // das
        .route("/das/enroll", post(das::enroll))
        .route("/das/:user_id/countdown", get(das::countdown))
        .route("/das/:user_id/stats", get(das::stats))
        // admin
        .route("/admin/users/root", post(admin::register_root))
        .route("/admin/deposits/:id", post(admin::review_deposit))
        .route("/admin/investments/:id/cancel", post(admin::cancel_investment))
        .route("/admin/withdrawals/pending", get(admin::pending_withdrawals))
        .route("/admin/withdrawals/:id", post(admin::act_on_withdrawal))
        .route("/admin/withdrawals/:id/complete", post(admin::complete_withdrawal))
        .route("/admin/jobs/daily", post(admin::run_daily))
        .route("/admin/referrals/reconcile", post(admin::reconcile))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}
