//! Admin token verification for `/admin` routes.
//!
//! The token is accepted from `x-admin-token` or `Authorization: Bearer`.
//! With no token configured every admin request is refused.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use super::ApiError;

const ADMIN_ID_HEADER: &str = "x-admin-id";

fn presented_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(tok) = headers.get("x-admin-token").and_then(|v| v.to_str().ok()) {
        return Some(tok.trim());
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Compare digests so the comparison time does not depend on the prefix
fn same_token(a: &str, b: &str) -> bool {
    Sha256::digest(a.as_bytes()) == Sha256::digest(b.as_bytes())
}

pub fn verify_admin_token(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected.filter(|t| !t.is_empty()) else {
        tracing::warn!("[SECURITY] admin token not configured");
        return false;
    };
    matches!(presented_token(headers), Some(t) if same_token(t, expected))
}

/// Verify the token and return the acting admin's id (`x-admin-id`, or
/// `admin`)
pub fn require_admin(headers: &HeaderMap, expected: Option<&str>) -> Result<String, ApiError> {
    if !verify_admin_token(headers, expected) {
        return Err(ApiError::unauthorized());
    }
    Ok(headers
        .get(ADMIN_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("admin")
        .to_string())
}
