//! End-to-end tests of the HTTP surface.
//!
//! The router is driven in-process with `oneshot`; the CRM is a wiremock
//! server so the exact upstream calls can be asserted.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use referral_relay::crm::CrmClient;
use referral_relay::create_router;
use referral_relay::rate_limit::RateLimiter;
use referral_relay::state::{AppState, CrmTarget};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOCATION: &str = "loc-123";
const CONTACT_PATH: &str = "/locations/loc-123/contacts/contact_1";

fn crm_state(server: &MockServer, limiter: RateLimiter) -> AppState {
    let crm = CrmTarget {
        client: CrmClient::new(&server.uri(), "test-key", "2021-07-28").unwrap(),
        location_id: LOCATION.to_string(),
    };
    AppState::new(Some(crm), Arc::new(limiter), "test".to_string())
}

fn app_with_crm(server: &MockServer, limiter: RateLimiter) -> Router {
    create_router(Arc::new(crm_state(server, limiter)))
}

fn app_behind_proxy(server: &MockServer, limiter: RateLimiter) -> Router {
    create_router(Arc::new(crm_state(server, limiter).with_trust_proxy(true)))
}

fn app_without_crm() -> Router {
    let state = AppState::new(None, Arc::new(RateLimiter::default()), "test".to_string());
    create_router(Arc::new(state))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-forwarded-for", "198.51.100.4")
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("request failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body should be JSON")
    };
    (status, body)
}

fn contact_with_fields(fields: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "contact": { "id": "contact_1", "customFields": fields }
    }))
}

#[tokio::test]
async fn increments_existing_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTACT_PATH))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(contact_with_fields(json!([
            {"id": "unrelated", "value": "99"},
            {"key": "referral_count", "value": "5"}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(CONTACT_PATH))
        .and(body_json(json!({
            "customFields": [{"key": "referral_count", "field_value": "6"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"succeded": true})))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_with_crm(&server, RateLimiter::default());
    let (status, body) = send(&app, get("/increment-referral?contactId=contact_1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Referral count updated successfully");
    assert_eq!(body["data"]["contactId"], "contact_1");
    assert_eq!(body["data"]["previousCount"], 5);
    assert_eq!(body["data"]["newCount"], 6);
    assert!(body["data"]["processingTimeMs"].is_u64());
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn missing_field_starts_at_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTACT_PATH))
        .respond_with(contact_with_fields(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(CONTACT_PATH))
        .and(body_json(json!({
            "customFields": [{"key": "referral_count", "field_value": "1"}]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_with_crm(&server, RateLimiter::default());
    let (status, body) = send(&app, get("/increment-referral?contactId=contact_1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["previousCount"], 0);
    assert_eq!(body["data"]["newCount"], 1);
}

#[tokio::test]
async fn unknown_contact_is_404_without_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "gone"})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = app_with_crm(&server, RateLimiter::default());
    let (status, body) = send(&app, get("/increment-referral?contactId=contact_1")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Contact not found");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn empty_contact_payload_is_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"contact": null})))
        .mount(&server)
        .await;

    let app = app_with_crm(&server, RateLimiter::default());
    let (status, body) = send(&app, get("/increment-referral?contactId=contact_1")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Contact not found");
}

#[tokio::test]
async fn upstream_auth_failure_is_sanitized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(contact_with_fields(json!([{"key": "referral_count", "value": "2"}])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(
            ResponseTemplate::new(401).set_body_string("invalid token sk_live_SECRET for location"),
        )
        .mount(&server)
        .await;

    let app = app_with_crm(&server, RateLimiter::default());
    let (status, body) = send(&app, get("/increment-referral?contactId=contact_1")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Authentication error with external service");
    let raw = body.to_string();
    assert!(!raw.contains("SECRET"));
    assert!(!raw.contains("invalid token"));
}

#[tokio::test]
async fn upstream_rate_limit_is_429() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let app = app_with_crm(&server, RateLimiter::default());
    let (status, body) = send(&app, get("/increment-referral?contactId=contact_1")).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Rate limit exceeded, please try again later");
}

#[tokio::test]
async fn other_upstream_failure_is_generic_500() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway at 10.1.2.3"))
        .mount(&server)
        .await;

    let app = app_with_crm(&server, RateLimiter::default());
    let (status, body) = send(&app, get("/increment-referral?contactId=contact_1")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to update referral count");
    assert!(!body.to_string().contains("10.1.2.3"));
}

#[tokio::test]
async fn invalid_contact_id_is_400_with_details() {
    let server = MockServer::start().await;
    let app = app_with_crm(&server, RateLimiter::default());

    let (status, body) = send(&app, get("/increment-referral?contactId=bad%2Fid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid request parameters");
    assert_eq!(body["details"][0]["param"], "contactId");

    let (status, body) = send(&app, get("/increment-referral")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["msg"], "contactId is required");

    // no CRM call for rejected input
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn rate_limit_rejects_after_max_requests() {
    let server = MockServer::start().await;
    let app = app_behind_proxy(&server, RateLimiter::new(2, Duration::from_secs(60)));

    // invalid ids still consume the budget, and never reach the CRM
    for _ in 0..2 {
        let (status, _) = send(&app, get("/increment-referral?contactId=a%20b")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, body) = send(&app, get("/increment-referral?contactId=contact_1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);
    assert_eq!(body["retryAfter"], "1 minute");

    // other clients are unaffected
    let request = Request::builder()
        .uri("/increment-referral?contactId=a%20b")
        .header("x-forwarded-for", "203.0.113.50")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn options_succeeds_even_when_rate_limited() {
    let server = MockServer::start().await;
    let app = app_with_crm(&server, RateLimiter::new(1, Duration::from_secs(60)));

    send(&app, get("/increment-referral?contactId=a%20b")).await;
    let (status, _) = send(&app, get("/increment-referral?contactId=contact_1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/increment-referral")
        .header("x-forwarded-for", "198.51.100.4")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "GET, OPTIONS");
    assert_eq!(headers["access-control-allow-headers"], "Content-Type");
}

#[tokio::test]
async fn browser_preflight_is_answered() {
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/increment-referral")
        .header("origin", "https://forms.example.com")
        .header("access-control-request-method", "GET")
        .body(Body::empty())
        .unwrap();
    let response = app_without_crm().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn missing_configuration_is_generic_500() {
    let app = app_without_crm();
    let (status, body) = send(&app, get("/increment-referral?contactId=contact_1")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Server configuration error");
    let raw = body.to_string();
    assert!(!raw.contains("GHL_"));
    assert!(!raw.to_lowercase().contains("api key"));
}

#[tokio::test]
async fn health_is_ok_without_credentials() {
    let app = app_without_crm();
    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "test");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn non_get_is_method_not_allowed() {
    let app = app_without_crm();
    for verb in ["POST", "PUT", "DELETE"] {
        let request = Request::builder()
            .method(verb)
            .uri("/increment-referral?contactId=contact_1")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{verb}");
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Method not allowed");
    }
}

#[tokio::test]
async fn unknown_route_lists_endpoints() {
    let app = app_without_crm();
    let (status, body) = send(&app, get("/nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Endpoint not found");
    let endpoints = body["availableEndpoints"].as_array().unwrap();
    assert!(endpoints.iter().any(|e| e == "GET /health"));

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/nope")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn metrics_are_exposed() {
    let app = app_without_crm();
    send(&app, get("/increment-referral?contactId=contact_1")).await;

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("referral_requests_total"));
}

#[tokio::test]
async fn forwarded_header_is_ignored_without_trusted_proxy() {
    let server = MockServer::start().await;
    let app = app_with_crm(&server, RateLimiter::new(1, Duration::from_secs(60)));

    let mut statuses = Vec::new();
    for i in 0..4 {
        let request = Request::builder()
            .uri("/increment-referral?contactId=a%20b")
            .header("x-forwarded-for", format!("203.0.113.{i}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        statuses.push(status);
    }

    assert_eq!(
        statuses,
        vec![
            StatusCode::BAD_REQUEST,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
        ]
    );
}

#[tokio::test]
async fn head_is_method_not_allowed_without_side_effects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(contact_with_fields(json!([{"key": "referral_count", "value": "1"}])))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = app_with_crm(&server, RateLimiter::new(1, Duration::from_secs(60)));
    let request = Request::builder()
        .method("HEAD")
        .uri("/increment-referral?contactId=contact_1")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(server.received_requests().await.unwrap().is_empty());

    // no rate limit budget was spent: the one allowed request is still available
    let (status, _) = send(&app, get("/increment-referral?contactId=a%20b")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn repeated_contact_id_without_configuration_is_500() {
    let app = app_without_crm();
    let (status, body) = send(&app, get("/increment-referral?contactId=a&contactId=b")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Server configuration error");
}

#[tokio::test]
async fn repeated_contact_id_is_400_envelope() {
    let server = MockServer::start().await;
    let app = app_with_crm(&server, RateLimiter::default());
    let (status, body) = send(&app, get("/increment-referral?contactId=a&contactId=b")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request parameters");
    assert_eq!(body["details"][0]["param"], "contactId");
    assert_eq!(body["details"][0]["msg"], "contactId must be provided once");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn non_get_on_health_and_metrics_is_json_405() {
    let app = app_without_crm();
    for uri in ["/health", "/metrics"] {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{uri}");
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Method not allowed");
    }
}
