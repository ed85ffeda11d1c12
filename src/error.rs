//! Request-level errors and how each one is shown to the caller.
//!
//! Upstream detail stays in the logs. The response body only ever carries
//! one of the fixed messages below, except for validation errors which
//! return their field details.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::crm::CrmError;
use crate::models::ResponseEnvelope;
use crate::validation::FieldError;

pub const CONFIGURATION_MESSAGE: &str = "Server configuration error";
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests, please try again later.";
pub const INVALID_PARAMS_MESSAGE: &str = "Invalid request parameters";
pub const NOT_FOUND_MESSAGE: &str = "Contact not found";
pub const UPSTREAM_AUTH_MESSAGE: &str = "Authentication error with external service";
pub const UPSTREAM_RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded, please try again later";
pub const UPSTREAM_MESSAGE: &str = "Failed to update referral count";
pub const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method not allowed";
pub const INTERNAL_MESSAGE: &str = "Internal server error";

/// Local outcome for a failed CRM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamOutcome {
    AuthFailure,
    NotFound,
    RateLimited,
    Other,
}

const UPSTREAM_STATUS_OUTCOMES: &[(u16, UpstreamOutcome)] = &[
    (401, UpstreamOutcome::AuthFailure),
    (403, UpstreamOutcome::AuthFailure),
    (404, UpstreamOutcome::NotFound),
    (429, UpstreamOutcome::RateLimited),
];

impl UpstreamOutcome {
    pub fn for_status(status: Option<u16>) -> Self {
        status
            .and_then(|s| {
                UPSTREAM_STATUS_OUTCOMES
                    .iter()
                    .find(|(code, _)| *code == s)
                    .map(|(_, outcome)| *outcome)
            })
            .unwrap_or(UpstreamOutcome::Other)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("CRM credentials or location are not configured")]
    Configuration,

    #[error("rate limit exceeded")]
    RateLimited { retry_after: String },

    #[error("invalid request parameters")]
    Validation(Vec<FieldError>),

    #[error("contact not found")]
    NotFound,

    #[error("CRM rejected credentials")]
    UpstreamAuth,

    #[error("CRM rate limited the relay")]
    UpstreamRateLimited,

    #[error("CRM call failed")]
    Upstream,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("internal error")]
    Internal,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Configuration | AppError::UpstreamAuth => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream | AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::RateLimited { .. } | AppError::UpstreamRateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// Label used for the request outcome metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            AppError::Configuration => "configuration_error",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::Validation(_) => "invalid",
            AppError::NotFound => "not_found",
            AppError::UpstreamAuth => "upstream_auth",
            AppError::UpstreamRateLimited => "upstream_rate_limited",
            AppError::Upstream => "upstream_error",
            AppError::MethodNotAllowed => "method_not_allowed",
            AppError::Internal => "internal_error",
        }
    }

    fn envelope(self) -> ResponseEnvelope {
        match self {
            AppError::Configuration => ResponseEnvelope::failure(CONFIGURATION_MESSAGE),
            AppError::RateLimited { retry_after } => {
                ResponseEnvelope::failure(RATE_LIMITED_MESSAGE).with_retry_after(retry_after)
            }
            AppError::Validation(details) => {
                ResponseEnvelope::failure(INVALID_PARAMS_MESSAGE).with_details(details)
            }
            AppError::NotFound => ResponseEnvelope::failure(NOT_FOUND_MESSAGE),
            AppError::UpstreamAuth => ResponseEnvelope::failure(UPSTREAM_AUTH_MESSAGE),
            AppError::UpstreamRateLimited => {
                ResponseEnvelope::failure(UPSTREAM_RATE_LIMITED_MESSAGE)
            }
            AppError::Upstream => ResponseEnvelope::failure(UPSTREAM_MESSAGE),
            AppError::MethodNotAllowed => ResponseEnvelope::failure(METHOD_NOT_ALLOWED_MESSAGE),
            AppError::Internal => ResponseEnvelope::failure(INTERNAL_MESSAGE),
        }
    }
}

impl From<&CrmError> for AppError {
    fn from(err: &CrmError) -> Self {
        if matches!(err, CrmError::ContactMissing) {
            return AppError::NotFound;
        }
        match UpstreamOutcome::for_status(err.status()) {
            UpstreamOutcome::AuthFailure => AppError::UpstreamAuth,
            UpstreamOutcome::NotFound => AppError::NotFound,
            UpstreamOutcome::RateLimited => AppError::UpstreamRateLimited,
            UpstreamOutcome::Other => AppError::Upstream,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self.envelope())).into_response()
    }
}
