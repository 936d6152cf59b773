//! HTTP surface tests: authentication contract, booking flow, checkout.

#![allow(clippy::unwrap_used)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use darshan::collaborators::{InvoiceIssuer, Mailer, RecordingMailer, SequentialInvoiceIssuer};
use darshan::server::{self, AppState};
use darshan::session::{IdentityProvider, Role, StaticTokenProvider};
use darshan::types::UserId;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tirtha_core::environment::Clock;
use tirtha_testing::test_clock;
use tower::ServiceExt;

const ADMIN_TOKEN: &str = "admin-token";
const USER_TOKEN: &str = "user-token";

fn test_app() -> (Router, AppState) {
    let identity = Arc::new(StaticTokenProvider::new());
    identity.register(ADMIN_TOKEN, UserId::new(), Role::Admin);
    identity.register(USER_TOKEN, UserId::new(), Role::User);

    let state = AppState::with_collaborators(
        Arc::new(test_clock()) as Arc<dyn Clock>,
        Arc::new(RecordingMailer::new()) as Arc<dyn Mailer>,
        Arc::new(SequentialInvoiceIssuer::new()) as Arc<dyn InvoiceIssuer>,
        identity as Arc<dyn IdentityProvider>,
    );
    (server::router(state.clone()), state)
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register_temple(app: &Router) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/api/temples",
        Some(ADMIN_TOKEN),
        Some(json!({
            "name": "Meenakshi Amman",
            "latitude": 9.9195,
            "longitude": 78.1193,
            "city": "Madurai",
            "state": "Tamil Nadu",
            "country": "India",
            "rating": 4.8,
            "visit_points": 150,
            "darshan_enabled": true,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["temple_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn admin_endpoints_enforce_the_bearer_contract() {
    let (app, _state) = test_app();

    for uri in ["/api/admin/bookings", "/api/admin/users"] {
        // 401 without a token
        let (status, _) = call(&app, "GET", uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri} without token");

        // 401 with an unknown token
        let (status, _) = call(&app, "GET", uri, Some("who-is-this"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri} with bad token");

        // 403 authenticated but not admin
        let (status, _) = call(&app, "GET", uri, Some(USER_TOKEN), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri} as user");

        // 200 as admin
        let (status, body) = call(&app, "GET", uri, Some(ADMIN_TOKEN), None).await;
        assert_eq!(status, StatusCode::OK, "{uri} as admin");
        assert!(body.is_array());
    }
}

#[tokio::test]
async fn booking_flow_over_http() {
    let (app, _state) = test_app();
    let temple_id = register_temple(&app).await;

    // Create: lands in awaiting with an invoice.
    let (status, booking) = call(
        &app,
        "POST",
        "/api/bookings",
        Some(USER_TOKEN),
        Some(json!({
            "temple_id": temple_id,
            "name": "Asha",
            "email": "asha@example.com",
            "phone": "+919876543210",
            "darshan_type": "free",
            "amount_paid": 0,
            "scheduled_for": "2026-07-01T05:30:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["status"], "awaiting");
    assert!(booking["invoice"].as_str().unwrap().starts_with("INV-"));
    let booking_id = booking["booking_id"].as_str().unwrap().to_string();

    // Non-admin transition: forbidden.
    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/bookings/{booking_id}/status"),
        Some(USER_TOKEN),
        Some(json!({"status": "confirmed"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admin confirm: applied.
    let (status, confirmed) = call(
        &app,
        "POST",
        &format!("/api/bookings/{booking_id}/status"),
        Some(ADMIN_TOKEN),
        Some(json!({"status": "confirmed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["status"], "confirmed");

    // Cancel after confirm: business-rule rejection.
    let (status, error) = call(
        &app,
        "POST",
        &format!("/api/bookings/{booking_id}/status"),
        Some(ADMIN_TOKEN),
        Some(json!({"status": "cancelled"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], "BUSINESS_RULE");
}

#[tokio::test]
async fn booking_against_unknown_temple_is_not_found() {
    let (app, _state) = test_app();

    let (status, _) = call(
        &app,
        "POST",
        "/api/bookings",
        Some(USER_TOKEN),
        Some(json!({
            "temple_id": uuid::Uuid::new_v4(),
            "name": "Asha",
            "email": "asha@example.com",
            "phone": "+919876543210",
            "darshan_type": "vip",
            "amount_paid": 2500,
            "scheduled_for": "2026-07-01T05:30:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn checkout_quotes_and_redeems_once() {
    let (app, _state) = test_app();

    // Admin creates a single-use 20% code.
    let (status, _) = call(
        &app,
        "POST",
        "/api/admin/promos",
        Some(ADMIN_TOKEN),
        Some(json!({
            "code": "fest20",
            "discount_percent": 20,
            "max_uses": 1,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Unauthenticated quote: promo applies, case-insensitively.
    let (status, quote) = call(
        &app,
        "POST",
        "/api/checkout/quote",
        None,
        Some(json!({"subtotal": 1000, "promo_code": "FEST20"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["final_price"], 800);
    assert_eq!(quote["discount"]["percent"], 20);

    // Quoting again consumed nothing; completion is what redeems.
    let complete_body = json!({
        "product_id": uuid::Uuid::new_v4(),
        "product_name": "Brass diya",
        "quantity": 2,
        "unit_price": 500,
        "promo_code": "fest20",
        "name": "Asha",
        "email": "asha@example.com",
        "phone": "+919876543210",
    });
    let (status, completed) = call(
        &app,
        "POST",
        "/api/checkout/complete",
        Some(USER_TOKEN),
        Some(complete_body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["pricing"]["final_price"], 800);
    assert_eq!(completed["status"], "pending");

    // The single use is now consumed: a second checkout fails closed.
    let (status, error) = call(
        &app,
        "POST",
        "/api/checkout/complete",
        Some(USER_TOKEN),
        Some(complete_body),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(
        error["message"]
            .as_str()
            .unwrap()
            .contains("fully redeemed")
    );
}

#[tokio::test]
async fn invalid_promo_fails_the_quote_closed() {
    let (app, _state) = test_app();

    let (status, error) = call(
        &app,
        "POST",
        "/api/checkout/quote",
        None,
        Some(json!({"subtotal": 1000, "promo_code": "NOPE"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], "BUSINESS_RULE");
}

#[tokio::test]
async fn approved_contribution_surfaces_in_discovery() {
    let (app, state) = test_app();

    let (status, contribution) = call(
        &app,
        "POST",
        "/api/contributions",
        Some(USER_TOKEN),
        Some(json!({
            "name": "Kashi Vishwanath",
            "latitude": 25.3109,
            "longitude": 83.0107,
            "city": "Varanasi",
            "state": "Uttar Pradesh",
            "country": "India",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(contribution["status"], "pending");
    let contribution_id = contribution["contribution_id"].as_str().unwrap().to_string();

    let (status, reviewed) = call(
        &app,
        "POST",
        &format!("/api/contributions/{contribution_id}/review"),
        Some(ADMIN_TOKEN),
        Some(json!({"verdict": "approved"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviewed["status"], "approved");

    // The bridge registers the temple asynchronously; wait for it to land.
    let mut registered = false;
    for _ in 0..50 {
        if state.temples.state(|s| s.count()).await > 0 {
            registered = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(registered, "bridge did not register the approved temple");

    let (status, temples) = call(&app, "GET", "/api/temples?city=Varanasi", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(temples.as_array().unwrap().len(), 1);
    assert_eq!(temples[0]["name"], "Kashi Vishwanath");
}
