use std::sync::Arc;

use crate::config::Args;
use crate::crm::{CrmClient, CrmError};
use crate::rate_limit::RateLimiter;

/// CRM client together with the location every contact is addressed under.
#[derive(Clone)]
pub struct CrmTarget {
    pub client: CrmClient,
    pub location_id: String,
}

// app's shared state
pub struct AppState {
    pub crm: Option<CrmTarget>, // None when credentials are missing
    pub rate_limiter: Arc<RateLimiter>,
    pub environment: String,
    pub trust_proxy: bool, // read client address from forwarding headers
}

impl AppState {
    pub fn new(crm: Option<CrmTarget>, rate_limiter: Arc<RateLimiter>, environment: String) -> Self {
        Self {
            crm,
            rate_limiter,
            environment,
            trust_proxy: false,
        }
    }

    pub fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    pub fn from_args(args: &Args, rate_limiter: Arc<RateLimiter>) -> Result<Self, CrmError> {
        let crm = match args.crm_credentials() {
            Some((api_key, location_id)) => Some(CrmTarget {
                client: CrmClient::new(&args.crm_base_url, api_key, &args.crm_api_version)?,
                location_id: location_id.to_string(),
            }),
            None => None,
        };

        Ok(Self::new(crm, rate_limiter, args.environment.clone()).with_trust_proxy(args.trust_proxy))
    }
}
