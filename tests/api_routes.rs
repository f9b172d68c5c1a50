mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{dollars, harness, Harness};
use fxline::api::{self, AppState};

const TOKEN: &str = "test-admin-token";

fn app(h: &Harness) -> Router {
    let state = AppState::new(h.platform.clone(), Some(TOKEN.to_string()));
    api::router(state, 64 * 1024, &[])
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", TOKEN))
        .header("x-admin-id", "ops-1")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn registration(n: u32, sponsor: &str) -> Value {
    json!({
        "sponsorId": sponsor,
        "firstName": format!("Api{}", n),
        "lastName": "Client",
        "mobile": format!("+3361000{:04}", n),
        "email": format!("api{}@fxline.test", n),
        "password": "secret-pass",
    })
}

#[tokio::test]
async fn health_and_schedule() {
    let h = harness();
    let app = app(&h);

    let (status, body) = call(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["status"], "up");
    assert_eq!(body["notifier"], "memory");

    let (status, body) = call(&app, get("/config/rewards")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schedule"]["driRateBps"], 600);
    assert_eq!(body["schedule"]["smartline"].as_array().unwrap().len(), 5);
    assert_eq!(body["schedule"]["withdrawalMinimum"], "15.00");
}

#[tokio::test]
async fn admin_routes_require_token() {
    let h = harness();
    let app = app(&h);

    let (status, body) = call(&app, get("/admin/withdrawals/pending")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["ok"], false);
    assert_eq!(body["code"], "unauthorized");

    let req = Request::builder()
        .uri("/admin/withdrawals/pending")
        .header("x-admin-token", "wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/admin/withdrawals/pending")
        .header("x-admin-token", TOKEN)
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["withdrawals"], json!([]));
}

#[tokio::test]
async fn register_invest_and_read_back() {
    let h = harness();
    let app = app(&h);

    let root = json!({
        "firstName": "Root",
        "lastName": "Admin",
        "mobile": "+336100009999",
        "email": "root@fxline.test",
        "password": "secret-pass",
    });
    let (status, body) = call(&app, admin_post("/admin/users/root", root)).await;
    assert_eq!(status, StatusCode::CREATED);
    let root_id = body["user"]["id"].as_str().unwrap().to_string();
    let root_code = body["user"]["ownSponsorId"].as_str().unwrap().to_string();
    assert!(body["user"].get("passwordHash").is_none());

    let (status, body) = call(&app, post("/auth/register", registration(1, &root_code.to_lowercase()))).await;
    assert_eq!(status, StatusCode::CREATED);
    let member_id = body["user"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["user"]["parent"], root_id.as_str());

    let (status, body) = call(
        &app,
        admin_post("/investments", json!({ "userId": member_id, "amount": "1000" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["investment"]["packageType"], "fs_income");
    assert_eq!(body["rewards"].as_array().unwrap().len(), 2);

    let (status, body) = call(&app, get(&format!("/users/{}", root_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["walletBalance"], "75.00");
    assert_eq!(body["user"]["level1Count"], 1);

    let (status, body) = call(&app, get(&format!("/users/{}/transactions", root_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"].as_array().unwrap().len(), 2);
    assert_eq!(body["summary"]["driIncome"], "60.00");

    let (status, body) = call(&app, get(&format!("/users/{}/referrals", root_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["referralCount"], 1);
    assert_eq!(body["levels"][0]["members"][0]["id"], member_id.as_str());
}

#[tokio::test]
async fn direct_investment_needs_admin_token() {
    let h = harness();
    let app = app(&h);
    let root = h.root().await;
    let member = h.join(&root).await;

    let body = json!({ "userId": member.id, "amount": "100000" });
    let (status, resp) = call(&app, post("/investments", body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp["code"], "unauthorized");

    let req = Request::builder()
        .method("POST")
        .uri("/investments")
        .header("content-type", "application/json")
        .header("authorization", "Bearer wrong")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // nothing was booked and nobody was paid
    assert!(h.platform.investments.investments_for(&member.id).unwrap().is_empty());
    assert_eq!(h.user(&root.id).wallet_balance, 0);
    assert!(h.platform.store.ledger_entries().unwrap().is_empty());
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let h = harness();
    let app = app(&h);

    let (status, body) = call(&app, post("/auth/register", registration(2, "FX123"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_sponsor");

    let (status, body) = call(&app, get("/users/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "user_not_found");

    let root = h.root().await;
    let (status, body) = call(
        &app,
        post(
            "/withdrawals",
            json!({ "userId": root.id, "amount": 20, "method": "bank", "walletAddress": "GB00" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "insufficient_balance");
}

#[tokio::test]
async fn withdrawal_round_trip_over_http() {
    let h = harness();
    let app = app(&h);
    let root = h.root().await;
    h.fund_wallet(&root.id, dollars(100));

    let (status, body) = call(&app, get("/withdrawals/quote?amount=15.10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quote"]["serviceCharge"], "0.76");
    assert_eq!(body["minimum"], "15.00");

    let (status, body) = call(
        &app,
        post(
            "/withdrawals",
            json!({ "userId": root.id, "amount": "20.00", "method": "bank", "walletAddress": "GB00" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["withdrawal"].get("otp").is_none());
    let id = body["withdrawal"]["id"].as_str().unwrap().to_string();
    let code = h.outbox.otp_for(&id).unwrap();

    let (status, body) = call(&app, post(&format!("/withdrawals/{}/verify", id), json!({ "otp": code }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["withdrawal"]["status"], "pending_admin");

    let (status, body) = call(
        &app,
        admin_post(&format!("/admin/withdrawals/{}", id), json!({ "decision": "approve", "notes": "ok" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["withdrawal"]["status"], "approved");
    assert_eq!(body["withdrawal"]["adminId"], "ops-1");

    let (status, body) = call(
        &app,
        admin_post(
            &format!("/admin/withdrawals/{}/complete", id),
            json!({ "payoutReference": "wire-77" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["withdrawal"]["status"], "completed");
    assert_eq!(h.user(&root.id).wallet_balance, dollars(81));
}

#[tokio::test]
async fn daily_job_trigger() {
    let h = harness();
    let app = app(&h);
    let root = h.root().await;
    h.platform
        .create_investment(&root.id, dollars(1000), fxline::models::PackageType::FsIncome)
        .unwrap();

    let (status, body) = call(&app, admin_post("/admin/jobs/daily", json!({ "date": "2026-05-01" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accrual"]["credited"], 1);
    assert_eq!(body["accrual"]["totalCredited"], "2.727");

    let (status, body) = call(&app, admin_post("/admin/jobs/daily", json!({ "date": "2026-05-01" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accrual"]["alreadyRan"], true);

    let (status, body) = call(&app, admin_post("/admin/jobs/daily", json!({ "date": "May 1" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}
