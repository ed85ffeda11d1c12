//! Webhook relay that bumps a contact's `referral_count` custom field in the
//! CRM by one per request.

pub mod config;
pub mod crm;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod referral;
pub mod state;
pub mod validation;

use axum::{
    Router,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::handlers::{
    health_handler, increment_referral_handler, method_not_allowed_handler, metrics_handler,
    not_found_handler, preflight_handler,
};
use crate::state::AppState;

pub const REFERRAL_ROUTE: &str = "/increment-referral";

/// Builds the service. CORS headers go on every response, errors included.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            REFERRAL_ROUTE,
            // axum hands HEAD to the GET handler unless HEAD has its own
            get(increment_referral_handler)
                .head(method_not_allowed_handler)
                .options(preflight_handler)
                .fallback(method_not_allowed_handler),
        )
        .route(
            "/health",
            get(health_handler)
                .options(preflight_handler)
                .fallback(method_not_allowed_handler),
        )
        .route(
            "/metrics",
            get(metrics_handler)
                .options(preflight_handler)
                .fallback(method_not_allowed_handler),
        )
        .fallback(not_found_handler)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    tracing::error!(panic = detail, "Unhandled panic while serving request");
    metrics::record_outcome(AppError::Internal.outcome());

    AppError::Internal.into_response()
}
