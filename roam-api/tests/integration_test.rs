use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use roam_api::middleware::{AdminClaims, RenterClaims};
use roam_api::{app, AppState, Backends, SweepTrigger};
use roam_booking::{SandboxBehavior, SandboxPaymentGateway, SignatureVerifier, SIGNATURE_HEADER};
use roam_core::{AuthorizationStatus, BookingStore, Clock, ManualClock};
use roam_shared::{BookingStatus, Masked, Vehicle};
use roam_store::app_config::Config;
use roam_store::{InMemoryBookingStore, InMemoryRateWindowStore, InMemoryVehicleCatalog};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

const CONFIG: &str = r#"
    [server]
    port = 0

    [storage]
    backend = "memory"

    [database]
    url = "postgres://unused"

    [redis]
    url = "redis://unused/"

    [auth]
    jwt_secret = "test-secret"

    [payments]
    webhook_secret = "whsec_test"
    authorization_timeout_ms = 200

    [booking]
    service_fee_cents = 1500
    max_rental_days = 30

    [reaper]
    interval_seconds = 86400
    max_age_seconds = 172800

    [rate_limits.reservations]
    max_per_window = 3
    window_seconds = 60
"#;

struct TestApp {
    router: Router,
    store: Arc<InMemoryBookingStore>,
    gateway: Arc<SandboxPaymentGateway>,
    clock: Arc<ManualClock>,
    vehicle: Vehicle,
}

impl TestApp {
    async fn new() -> Self {
        let config = Config::from_toml(CONFIG).unwrap();
        let store = Arc::new(InMemoryBookingStore::new());
        let catalog = Arc::new(InMemoryVehicleCatalog::new());
        let gateway = Arc::new(SandboxPaymentGateway::new());
        let clock = Arc::new(ManualClock::new("2024-07-01T09:00:00Z".parse().unwrap()));

        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            host_id: "host-1".to_string(),
            price_per_day_cents: 4500,
            currency: "USD".to_string(),
            active: true,
        };
        catalog.insert(vehicle.clone()).await;

        let backends = Backends {
            bookings: store.clone(),
            vehicles: catalog,
            rate_windows: Arc::new(InMemoryRateWindowStore::new()),
            gateway: gateway.clone(),
        };
        let state = AppState::build(&config, &backends, clock.clone(), SweepTrigger::new());

        Self { router: app(state), store, gateway, clock, vehicle }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, headers, body)
    }

    fn webhook(&self, payload: &Value) -> Request<Body> {
        let verifier = SignatureVerifier::new(
            Masked::new("whsec_test".to_string()),
            Duration::from_secs(300),
            self.clock.clone(),
        );
        let body = payload.to_string();
        let signature = verifier.sign(self.clock.now().timestamp(), body.as_bytes());
        Request::post("/v1/webhooks/payments")
            .header(header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body))
            .unwrap()
    }
}

fn token<T: serde::Serialize>(claims: &T) -> String {
    encode(&Header::default(), claims, &EncodingKey::from_secret(b"test-secret")).unwrap()
}

fn exp() -> usize {
    (Utc::now() + chrono::Duration::hours(1)).timestamp() as usize
}

fn renter_token(sub: &str) -> String {
    token(&RenterClaims { sub: sub.to_string(), role: "RENTER".to_string(), exp: exp() })
}

fn reservation_request(renter: &str, body: Value) -> Request<Body> {
    Request::post("/v1/reservations")
        .header(header::AUTHORIZATION, format!("Bearer {}", renter_token(renter)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn reservation_body(vehicle_id: Uuid, start: &str, end: &str, key: &str) -> Value {
    json!({
        "vehicle_id": vehicle_id,
        "start_date": start,
        "end_date": end,
        "idempotency_key": key,
    })
}

fn succeeded_event(booking_id: &str, authorization_id: &str, amount: i64) -> Value {
    json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": "payment_intent.succeeded",
        "data": {"object": {
            "id": authorization_id,
            "status": "succeeded",
            "amount": amount,
            "metadata": {"booking_id": booking_id}
        }}
    })
}

#[tokio::test]
async fn test_reservation_then_webhook_confirms_booking() {
    let app = TestApp::new().await;

    // 1. Reserve
    let (status, _, body) = app
        .send(reservation_request(
            "renter-1",
            reservation_body(app.vehicle.id, "2024-07-10T10:00:00Z", "2024-07-15T10:00:00Z", "k1"),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["total_cents"], 5 * 4500 + 1500);
    assert_eq!(body["currency"], "USD");
    assert!(body["payment_client_secret"].as_str().unwrap().contains("_secret_"));

    let booking_id = body["booking_id"].as_str().unwrap().to_string();
    let booking = app.store.get(booking_id.parse().unwrap()).await.unwrap().unwrap();
    let authorization_id = booking.payment_authorization_id.clone().unwrap();

    // 2. Renter completes checkout with the provider
    let paid = app.gateway.complete(&authorization_id).unwrap();
    assert_eq!(paid.status, AuthorizationStatus::Succeeded);
    assert_eq!(paid.amount_cents, booking.total_cents);

    // 3. Provider confirms, twice
    for expected in ["confirmed", "already_terminal"] {
        let event = succeeded_event(&booking_id, &authorization_id, booking.total_cents);
        let (status, _, body) = app.send(app.webhook(&event)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], expected);
    }

    // 4. Renter sees the confirmed booking
    let (status, _, body) = app
        .send(
            Request::get(format!("/v1/reservations/{}", booking_id))
                .header(header::AUTHORIZATION, format!("Bearer {}", renter_token("renter-1")))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");

    // Other renters cannot see it
    let (status, _, body) = app
        .send(
            Request::get(format!("/v1/reservations/{}", booking_id))
                .header(header::AUTHORIZATION, format!("Bearer {}", renter_token("renter-2")))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_overlap_conflicts_and_checkout_day_is_free() {
    let app = TestApp::new().await;

    let (status, _, _) = app
        .send(reservation_request(
            "renter-1",
            reservation_body(app.vehicle.id, "2024-07-10T10:00:00Z", "2024-07-15T10:00:00Z", "a"),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = app
        .send(reservation_request(
            "renter-2",
            reservation_body(app.vehicle.id, "2024-07-12T10:00:00Z", "2024-07-14T10:00:00Z", "b"),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");

    let (status, _, _) = app
        .send(reservation_request(
            "renter-3",
            reservation_body(app.vehicle.id, "2024-07-15T10:00:00Z", "2024-07-18T10:00:00Z", "c"),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_reservation_errors_are_structured() {
    let app = TestApp::new().await;

    // Missing token
    let (status, _, body) = app
        .send(
            Request::post("/v1/reservations")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    reservation_body(app.vehicle.id, "2024-07-10T10:00:00Z", "2024-07-15T10:00:00Z", "k").to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthenticated");

    // Empty range
    let (status, _, body) = app
        .send(reservation_request(
            "renter-1",
            reservation_body(app.vehicle.id, "2024-07-10T08:00:00Z", "2024-07-10T20:00:00Z", "k1"),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_date_range");

    // Unknown vehicle
    let (status, _, body) = app
        .send(reservation_request(
            "renter-1",
            reservation_body(Uuid::new_v4(), "2024-07-10T10:00:00Z", "2024-07-15T10:00:00Z", "k2"),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "vehicle_not_found");

    // Declined card
    app.gateway.set_behavior(SandboxBehavior::Decline);
    let (status, _, body) = app
        .send(reservation_request(
            "renter-4",
            reservation_body(app.vehicle.id, "2024-07-20T10:00:00Z", "2024-07-22T10:00:00Z", "k3"),
        ))
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "payment_authorization_failed");
    assert!(app.store.all().await.iter().all(|b| b.status != BookingStatus::Pending));
}

#[tokio::test]
async fn test_store_outage_returns_503() {
    let app = TestApp::new().await;
    app.store.set_unavailable(true);

    let (status, _, body) = app
        .send(reservation_request(
            "renter-1",
            reservation_body(app.vehicle.id, "2024-07-10T10:00:00Z", "2024-07-15T10:00:00Z", "k1"),
        ))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "upstream_unavailable");

    // Webhooks ask the provider to retry later.
    let event = succeeded_event(&Uuid::new_v4().to_string(), "sbx_pi_1", 100);
    let (status, _, _) = app.send(app.webhook(&event)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_rate_limit_returns_retry_after() {
    let app = TestApp::new().await;

    for i in 0..3 {
        let (status, _, _) = app
            .send(reservation_request(
                "renter-1",
                reservation_body(app.vehicle.id, "2024-07-10T08:00:00Z", "2024-07-10T20:00:00Z", &format!("k{}", i)),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, headers, body) = app
        .send(reservation_request(
            "renter-1",
            reservation_body(app.vehicle.id, "2024-07-10T10:00:00Z", "2024-07-15T10:00:00Z", "k9"),
        ))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "rate_limited");
    assert_eq!(headers.get(header::RETRY_AFTER).unwrap(), "60");

    // A different renter has its own window.
    let (status, _, _) = app
        .send(reservation_request(
            "renter-2",
            reservation_body(app.vehicle.id, "2024-07-10T10:00:00Z", "2024-07-15T10:00:00Z", "k9"),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let app = TestApp::new().await;
    let event = succeeded_event(&Uuid::new_v4().to_string(), "sbx_pi_1", 100);

    let unsigned = Request::post("/v1/webhooks/payments")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(event.to_string()))
        .unwrap();
    let (status, _, body) = app.send(unsigned).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");

    let forged = Request::post("/v1/webhooks/payments")
        .header(SIGNATURE_HEADER, format!("t={},v1={}", app.clock.now().timestamp(), "ab".repeat(32)))
        .body(Body::from(event.to_string()))
        .unwrap();
    let (status, _, _) = app.send(forged).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_availability_reports_conflicts_and_quote() {
    let app = TestApp::new().await;
    let (status, _, _) = app
        .send(reservation_request(
            "renter-1",
            reservation_body(app.vehicle.id, "2024-07-10T10:00:00Z", "2024-07-15T10:00:00Z", "k1"),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = |start: &str, end: &str| {
        format!("/v1/vehicles/{}/availability?start_date={}&end_date={}", app.vehicle.id, start, end)
    };

    let (status, _, body) = app
        .send(Request::get(uri("2024-07-12", "2024-07-14")).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);

    let (status, _, body) = app
        .send(Request::get(uri("2024-07-15", "2024-07-18")).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);
    assert_eq!(body["quote"]["total_cents"], 3 * 4500 + 1500);

    let (status, _, body) = app
        .send(Request::get(uri("2024-07-18", "2024-07-15")).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_date_range");
}

#[tokio::test]
async fn test_admin_sweep_requires_admin_role() {
    let app = TestApp::new().await;
    let admin = token(&AdminClaims { sub: "ops-1".to_string(), role: "ADMIN".to_string(), exp: exp() });

    let (status, _, body) = app
        .send(
            Request::post("/v1/admin/sweeps")
                .header(header::AUTHORIZATION, format!("Bearer {}", admin))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "scheduled");

    let (status, _, _) = app
        .send(
            Request::post("/v1/admin/sweeps")
                .header(header::AUTHORIZATION, format!("Bearer {}", renter_token("renter-1")))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let (status, _, body) = app.send(Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_retried_request_replays_first_result() {
    let app = TestApp::new().await;
    let body = reservation_body(app.vehicle.id, "2024-07-10T10:00:00Z", "2024-07-15T10:00:00Z", "retry-1");

    let (first_status, _, first) = app.send(reservation_request("renter-1", body.clone())).await;
    let (second_status, _, second) = app.send(reservation_request("renter-1", body)).await;

    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::CREATED);
    assert_eq!(first["booking_id"], second["booking_id"]);
    assert_eq!(first["payment_client_secret"], second["payment_client_secret"]);
    assert_eq!(app.store.all().await.len(), 1);
    assert_eq!(app.gateway.authorizations_created(), 1);
}
