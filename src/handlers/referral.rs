use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

use crate::error::AppError;
use crate::extract::ClientKey;
use crate::metrics::record_outcome;
use crate::models::{IncrementData, IncrementQuery, ResponseEnvelope};
use crate::referral::{count_update, current_count, next_count};
use crate::state::AppState;
use crate::validation::validate_contact_ids;

pub const SUCCESS_MESSAGE: &str = "Referral count updated successfully";

/// GET /increment-referral?contactId=<id>
///
/// Reads the contact, adds one to its `referral_count` field and writes it
/// back. The read and the write are separate CRM calls, so two concurrent
/// requests for the same contact can both read N and both write N+1.
#[instrument(name = "increment_referral", skip_all, fields(client_key = %client_key.0))]
pub async fn increment_referral_handler(
    State(state): State<Arc<AppState>>,
    client_key: ClientKey,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ResponseEnvelope>, AppError> {
    let query = IncrementQuery::from_pairs(pairs);
    let result = increment_referral(&state, &client_key, &query.contact_ids).await;
    match &result {
        Ok(_) => record_outcome("success"),
        Err(e) => record_outcome(e.outcome()),
    }
    result.map(Json)
}

async fn increment_referral(
    state: &AppState,
    client_key: &ClientKey,
    contact_ids: &[String],
) -> Result<ResponseEnvelope, AppError> {
    let Some(crm) = state.crm.as_ref() else {
        error!("CRM credentials or location id missing, rejecting request");
        return Err(AppError::Configuration);
    };

    let start_time = Instant::now();

    if !state.rate_limiter.admit(&client_key.0) {
        warn!("Rate limit exceeded");
        return Err(AppError::RateLimited {
            retry_after: state.rate_limiter.retry_after(),
        });
    }

    let errors = validate_contact_ids(contact_ids);
    if !errors.is_empty() {
        info!(error_count = errors.len(), "Rejected invalid contactId");
        return Err(AppError::Validation(errors));
    }
    // validation guarantees a non-empty id
    let contact_id = contact_ids.first().map(String::as_str).unwrap_or_default();

    let contact = crm
        .client
        .fetch_contact(&crm.location_id, contact_id)
        .await
        .map_err(|e| {
            error!(
                contact_id,
                upstream_status = ?e.status(),
                elapsed_ms = millis(start_time.elapsed()),
                timestamp = %chrono::Utc::now().to_rfc3339(),
                error = %e,
                upstream_body = upstream_body(&e),
                "Failed to fetch contact"
            );
            AppError::from(&e)
        })?;

    let previous_count = current_count(&contact.custom_fields);
    let new_count = next_count(previous_count);

    crm.client
        .update_contact(&crm.location_id, contact_id, &[count_update(new_count)])
        .await
        .map_err(|e| {
            error!(
                contact_id,
                previous_count,
                new_count,
                upstream_status = ?e.status(),
                elapsed_ms = millis(start_time.elapsed()),
                timestamp = %chrono::Utc::now().to_rfc3339(),
                error = %e,
                upstream_body = upstream_body(&e),
                "Failed to update referral count"
            );
            AppError::from(&e)
        })?;

    let processing_time_ms = millis(start_time.elapsed());
    info!(
        contact_id,
        previous_count, new_count, processing_time_ms, "Referral count updated"
    );

    Ok(ResponseEnvelope::success(
        SUCCESS_MESSAGE,
        IncrementData {
            contact_id: contact_id.to_string(),
            previous_count,
            new_count,
            processing_time_ms,
        },
    ))
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn upstream_body(err: &crate::crm::CrmError) -> &str {
    match err {
        crate::crm::CrmError::Status { body, .. } => body,
        _ => "",
    }
}

// OPTIONS on any route, CORS headers come from the router layers
pub async fn preflight_handler() -> Response {
    StatusCode::OK.into_response()
}

// Any method other than GET/OPTIONS, HEAD included
pub async fn method_not_allowed_handler() -> AppError {
    AppError::MethodNotAllowed
}
