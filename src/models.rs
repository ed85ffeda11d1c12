use serde::Serialize;

use crate::validation::{CONTACT_ID_PARAM, FieldError};

// Query string of GET /increment-referral, kept as raw pairs so a
// malformed or repeated parameter still reaches validation
#[derive(Debug, Default)]
pub struct IncrementQuery {
    pub contact_ids: Vec<String>,
}

impl IncrementQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let contact_ids = pairs
            .into_iter()
            .filter(|(name, _)| name == CONTACT_ID_PARAM)
            .map(|(_, value)| value)
            .collect();
        Self { contact_ids }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IncrementData {
    pub contact_id: String,
    pub previous_count: i64,
    pub new_count: i64,
    pub processing_time_ms: u64,
}

/// JSON body of every referral response.
///
/// Build it through [`ResponseEnvelope::success`] or
/// [`ResponseEnvelope::failure`] so only one side is ever populated.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<IncrementData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<String>,
}

impl ResponseEnvelope {
    pub fn success(message: impl Into<String>, data: IncrementData) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
            error: None,
            details: None,
            retry_after: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error.into()),
            details: None,
            retry_after: None,
        }
    }

    pub fn with_details(mut self, details: Vec<FieldError>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_retry_after(mut self, retry_after: impl Into<String>) -> Self {
        self.retry_after = Some(retry_after.into());
        self
    }
}
