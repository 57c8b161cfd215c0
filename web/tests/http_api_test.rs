//! Router-level tests: the HTTP surface wired over the in-memory store.

#![allow(clippy::unwrap_used, clippy::panic)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use courtbook_core::types::{Activity, Court, CourtId};
use courtbook_testing::{FixedClock, MemoryStore};
use courtbook_web::{build_router, AppState, Config};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    court: Court,
}

async fn test_app() -> TestApp {
    let store = MemoryStore::shared();
    let clock = Arc::new(FixedClock::default_instant());

    let court = Court {
        id: CourtId::new(),
        name: "Court 1".to_string(),
        primary_activity: Activity::Padel,
        compatible_secondary: vec![],
    };
    courtbook_core::store::BookingStore::insert_court(store.as_ref(), &court)
        .await
        .unwrap();

    let mut config = Config::from_env();
    config.jobs.secret = Some("sweep-secret".to_string());

    let state = AppState::from_store(store, clock, config);
    TestApp {
        router: build_router(state),
        court,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_answers_ok() {
    let app = test_app().await;
    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn booking_and_payment_flow_over_http() {
    let app = test_app().await;

    let create = json!({
        "user_id": uuid::Uuid::new_v4(),
        "court_id": app.court.id,
        "activity": "PADEL",
        "start": "2026-08-07T10:00:00Z",
        "end": "2026-08-07T11:00:00Z",
        "price": 2000,
        "method": "CARD",
    });
    let (status, body) = send(&app.router, post_json("/api/reservations", &create)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "PENDING");
    let reservation_id = body["id"].as_str().unwrap().to_string();

    // An overlapping booking answers 409 with an actionable reason.
    let (status, body) = send(&app.router, post_json("/api/reservations", &create)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let confirm = json!({
        "source_type": "RESERVATION",
        "source_id": reservation_id,
        "amount": 2000,
        "method": "CARD",
        "gateway_reference": "gw_1",
    });
    let (status, body) = send(&app.router, post_json("/api/payments/confirmed", &confirm)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["recorded"], true);
    assert_eq!(body["amount"], 2000);

    // A retried webhook hits the state machine.
    let (status, body) = send(&app.router, post_json("/api/payments/confirmed", &confirm)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_STATE");

    // The ledger report shows exactly one row.
    let (status, body) = send(&app.router, get("/api/ledger?source_type=RESERVATION")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["amount"], 2000);
}

#[tokio::test]
async fn job_triggers_require_the_secret() {
    let app = test_app().await;

    let (status, _) = send(&app.router, get("/api/jobs/expire-reservations")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app.router,
        get("/api/jobs/expire-reservations?secret=wrong"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{body}");

    let (status, body) = send(
        &app.router,
        get("/api/jobs/expire-reservations?secret=sweep-secret"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["cleaned"], 0);
    assert_eq!(body["timeout_minutes"], 15);

    let (status, body) = send(&app.router, get("/api/jobs/reconcile?secret=sweep-secret&days=5")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["days"], 5);
}

#[tokio::test]
async fn promotion_validation_reports_reasons() {
    let app = test_app().await;

    let validate = json!({
        "code": "NOPE",
        "amount": 2000,
    });
    let (status, body) = send(&app.router, post_json("/api/promotions/validate", &validate)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert_eq!(body["reason"], "code_not_found");
}

#[tokio::test]
async fn wallet_topup_is_idempotent_over_http() {
    let app = test_app().await;
    let user = uuid::Uuid::new_v4();

    let topup = json!({
        "user_id": user,
        "amount": 2500,
        "method": "CARD",
        "reference": "receipt-77",
    });
    let (status, body) = send(&app.router, post_json("/api/wallet/topup", &topup)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["balance"], 2500);

    let (status, body) = send(&app.router, post_json("/api/wallet/topup", &topup)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["recorded"], false);
    assert_eq!(body["balance"], 2500);

    let (status, body) = send(&app.router, get(&format!("/api/wallet/{user}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 2500);
    assert_eq!(body["entries"].as_array().unwrap().len(), 1);
}
