//! End-to-end tests for the rate-limit middleware and stats route.

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{middleware, Router};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use ridegate::audit::{AuditDispatcher, AuditError, AuditRecord, AuditSink, SecurityEvent};
use ridegate::clock::ManualClock;
use ridegate::config::GateConfig;
use ridegate::http::{build_router, enforce_rate_limit, RateLimitState};
use ridegate::ratelimit::{AuthenticatedActor, Category, RateLimiter};

const START_MS: u64 = 1_700_000_000_000;

#[derive(Default)]
struct RecordingSink {
    security: Mutex<Vec<SecurityEvent>>,
    audit: Mutex<Vec<AuditRecord>>,
}

#[async_trait]
impl AuditSink for RecordingSink {
    async fn record_security_event(&self, event: &SecurityEvent) -> Result<(), AuditError> {
        self.security.lock().push(event.clone());
        Ok(())
    }

    async fn record_audit_event(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.audit.lock().push(record.clone());
        Ok(())
    }
}

fn limiter(clock: Arc<ManualClock>, sink: Arc<RecordingSink>) -> Arc<RateLimiter> {
    Arc::new(
        RateLimiter::new()
            .with_clock(clock)
            .with_audit(AuditDispatcher::new(sink)),
    )
}

fn request(method: &str, uri: &str, forwarded_for: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", forwarded_for)
        .body(Body::empty())
        .unwrap()
}

fn header(response: &axum::response::Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {}", name))
        .to_str()
        .unwrap()
        .to_string()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_payment_quota_rejects_fourth_request() {
    let clock = Arc::new(ManualClock::new(START_MS));
    let sink = Arc::new(RecordingSink::default());
    let app = build_router(limiter(clock.clone(), sink.clone()), &GateConfig::default());

    for expected_remaining in ["2", "1", "0"] {
        let response = app
            .clone()
            .oneshot(request("POST", "/api/payments/charge", "203.0.113.7"))
            .await
            .unwrap();

        // No payment route is mounted, but the request was admitted.
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(header(&response, "x-ratelimit-limit"), "3");
        assert_eq!(header(&response, "x-ratelimit-remaining"), expected_remaining);
        assert_eq!(header(&response, "x-ratelimit-category"), "payment");
        assert_eq!(header(&response, "x-ratelimit-reset"), "1700000060");
        assert!(response.headers().get("retry-after").is_none());
    }

    let response = app
        .clone()
        .oneshot(request("POST", "/api/payments/charge", "203.0.113.7"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&response, "x-ratelimit-remaining"), "0");
    assert_eq!(header(&response, "retry-after"), "900");

    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(body["error"]["category"], "payment");
    assert_eq!(body["error"]["retryAfter"], 900);
    assert_eq!(
        body["error"]["message"],
        "Too many payment requests. You have been blocked for 15 minutes."
    );

    // Another client is unaffected.
    let response = app
        .clone()
        .oneshot(request("POST", "/api/payments/charge", "203.0.113.8"))
        .await
        .unwrap();
    assert_eq!(header(&response, "x-ratelimit-remaining"), "2");

    // Audit delivery happens in the background.
    for _ in 0..50 {
        if !sink.security.lock().is_empty() && !sink.audit.lock().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let events = sink.security.lock().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source_ip, "203.0.113.7");
    assert_eq!(events[0].request_path, "/api/payments/charge");
    assert_eq!(sink.audit.lock()[0].actor_id, "ip:203.0.113.7");
}

#[tokio::test]
async fn test_blocked_actor_gets_decreasing_retry_after() {
    let clock = Arc::new(ManualClock::new(START_MS));
    let app = build_router(
        limiter(clock.clone(), Arc::new(RecordingSink::default())),
        &GateConfig::default(),
    );

    for _ in 0..4 {
        app.clone()
            .oneshot(request("POST", "/api/wallet/topup", "198.51.100.4"))
            .await
            .unwrap();
    }

    clock.advance(60_000);
    let response = app
        .clone()
        .oneshot(request("POST", "/api/wallet/topup", "198.51.100.4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&response, "retry-after"), "840");

    clock.advance(840_000);
    let response = app
        .clone()
        .oneshot(request("POST", "/api/wallet/topup", "198.51.100.4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(header(&response, "x-ratelimit-remaining"), "2");
}

#[tokio::test]
async fn test_authenticated_actor_is_counted_by_user() {
    let clock = Arc::new(ManualClock::new(START_MS));
    let limiter = limiter(clock, Arc::new(RecordingSink::default()));
    let app = build_router(limiter.clone(), &GateConfig::default());

    for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
        let mut req = request("POST", "/api/checkout", ip);
        req.extensions_mut().insert(AuthenticatedActor {
            id: "42".to_string(),
            role: "rider".to_string(),
            email: Some("rider@example.com".to_string()),
        });
        app.clone().oneshot(req).await.unwrap();
    }

    let window = limiter
        .window(Category::Payment, &ridegate::ratelimit::ActorKey::User("42".to_string()))
        .unwrap();
    assert_eq!(window.count, 3);
}

#[tokio::test]
async fn test_peer_address_used_without_forwarded_headers() {
    let clock = Arc::new(ManualClock::new(START_MS));
    let limiter = limiter(clock, Arc::new(RecordingSink::default()));
    let app = build_router(limiter.clone(), &GateConfig::default());

    let mut req = Request::builder()
        .uri("/api/restaurants")
        .body(Body::empty())
        .unwrap();
    let peer: SocketAddr = "192.0.2.33:40000".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(peer));

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(header(&response, "x-ratelimit-category"), "default");
    assert!(limiter
        .window(Category::Default, &ridegate::ratelimit::ActorKey::Ip("192.0.2.33".to_string()))
        .is_some());
}

#[tokio::test]
async fn test_fixed_category_layer() {
    let clock = Arc::new(ManualClock::new(START_MS));
    let limiter = limiter(clock, Arc::new(RecordingSink::default()));

    let app = Router::new()
        .route("/hooks/inbound", post(|| async { "ok" }))
        .layer(middleware::from_fn_with_state(
            RateLimitState::fixed(limiter.clone(), Category::Webhook),
            enforce_rate_limit,
        ));

    let response = app
        .oneshot(request("POST", "/hooks/inbound", "203.0.113.50"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-ratelimit-category"), "webhook");
    assert_eq!(header(&response, "x-ratelimit-limit"), "100");
    assert_eq!(header(&response, "x-ratelimit-remaining"), "99");
}

#[tokio::test]
async fn test_stats_and_health_routes() {
    let clock = Arc::new(ManualClock::new(START_MS));
    let app = build_router(
        limiter(clock, Arc::new(RecordingSink::default())),
        &GateConfig::default(),
    );

    for _ in 0..6 {
        app.clone()
            .oneshot(request("POST", "/api/auth/login", "203.0.113.99"))
            .await
            .unwrap();
    }

    let response = app
        .clone()
        .oneshot(request("GET", "/health", "203.0.113.1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-ratelimit-limit").is_none());

    let response = app
        .clone()
        .oneshot(request("GET", "/admin/rate-limit/stats", "203.0.113.1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-ratelimit-category"), "admin");

    let stats = json_body(response).await;
    assert_eq!(stats["byCategory"]["auth"], 1);
    assert_eq!(stats["byCategory"]["admin"], 1);
    assert_eq!(stats["activeWindows"], 2);
    assert_eq!(stats["blockedActors"], 1);
}
