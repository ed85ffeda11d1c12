use axum::{
    Json,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};

use super::referral::preflight_handler;

pub const AVAILABLE_ENDPOINTS: &[&str] = &[
    "GET /increment-referral?contactId=<id>",
    "GET /health",
    "GET /metrics",
];

// Unmatched routes - OPTIONS still succeeds so browsers can preflight anything
pub async fn not_found_handler(method: Method) -> Response {
    if method == Method::OPTIONS {
        return preflight_handler().await;
    }

    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "Endpoint not found",
            "availableEndpoints": AVAILABLE_ENDPOINTS,
        })),
    )
        .into_response()
}
