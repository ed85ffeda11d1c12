//! HTTP client for the CRM contacts API.
//!
//! Two calls only: read a contact and write its custom fields. Every call
//! carries the bearer credential and the fixed `Version` header. Failures are
//! reported once, with no retry.

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::metrics::UPSTREAM_LATENCY;

#[derive(Debug, Error)]
pub enum CrmError {
    /// The CRM answered with a non-success status.
    #[error("CRM responded with HTTP {status}")]
    Status { status: u16, body: String },

    /// No response at all: connect failure, timeout, broken connection.
    #[error("CRM request failed: {message}")]
    Transport { message: String },

    #[error("could not decode CRM response: {message}")]
    Decode { message: String },

    /// Success status but no contact in the payload.
    #[error("CRM returned no contact")]
    ContactMissing,

    #[error("could not build CRM client: {0}")]
    ClientBuild(String),
}

impl CrmError {
    /// Upstream HTTP status, when the CRM answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            CrmError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CrmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CrmError::Decode { message: err.to_string() }
        } else {
            CrmError::Transport { message: err.to_string() }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
}

/// Custom field as read from a contact. The CRM identifies a field by `id`,
/// `key`, or both.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomField {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, alias = "field_value")]
    pub value: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ContactEnvelope {
    #[serde(default)]
    contact: Option<Contact>,
}

/// Custom field as written back to a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomFieldUpdate {
    pub key: String,
    pub field_value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateContactBody<'a> {
    custom_fields: &'a [CustomFieldUpdate],
}

#[derive(Clone)]
pub struct CrmClient {
    client: reqwest::Client,
    base_url: String,
}

impl CrmClient {
    pub fn new(base_url: &str, api_key: &str, api_version: &str) -> Result<Self, CrmError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| CrmError::ClientBuild("API key is not a valid header value".into()))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            "version",
            HeaderValue::from_str(api_version)
                .map_err(|_| CrmError::ClientBuild("invalid API version header".into()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| CrmError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn contact_url(&self, location_id: &str, contact_id: &str) -> String {
        format!(
            "{}/locations/{}/contacts/{}",
            self.base_url, location_id, contact_id
        )
    }

    #[instrument(skip(self), err(level = "debug"))]
    pub async fn fetch_contact(
        &self,
        location_id: &str,
        contact_id: &str,
    ) -> Result<Contact, CrmError> {
        let start = Instant::now();
        let result = self
            .client
            .get(self.contact_url(location_id, contact_id))
            .send()
            .await;
        UPSTREAM_LATENCY
            .with_label_values(&["fetch_contact"])
            .observe(start.elapsed().as_secs_f64());

        let response = error_for_status(result?).await?;
        let envelope = response.json::<ContactEnvelope>().await?;
        debug!(found = envelope.contact.is_some(), "Fetched contact");

        envelope.contact.ok_or(CrmError::ContactMissing)
    }

    #[instrument(skip(self, fields), fields(field_count = fields.len()), err(level = "debug"))]
    pub async fn update_contact(
        &self,
        location_id: &str,
        contact_id: &str,
        fields: &[CustomFieldUpdate],
    ) -> Result<(), CrmError> {
        let start = Instant::now();
        let result = self
            .client
            .put(self.contact_url(location_id, contact_id))
            .json(&UpdateContactBody { custom_fields: fields })
            .send()
            .await;
        UPSTREAM_LATENCY
            .with_label_values(&["update_contact"])
            .observe(start.elapsed().as_secs_f64());

        error_for_status(result?).await?;
        Ok(())
    }
}

// Keeps the upstream body for server-side logging
async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, CrmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CrmError::Status {
        status: status.as_u16(),
        body,
    })
}
