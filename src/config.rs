use clap::Parser;
use std::time::Duration;

pub const DEFAULT_CRM_BASE_URL: &str = "https://services.leadconnectorhq.com";
pub const DEFAULT_CRM_API_VERSION: &str = "2021-07-28";

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "referral-relay")]
#[command(about = "Webhook relay that increments a contact's referral count in the CRM")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    // CRM bearer credential
    #[arg(long, env = "GHL_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    // CRM location (tenant) the contacts live under
    #[arg(long, env = "GHL_LOCATION_ID")]
    pub location_id: Option<String>,

    #[arg(long, env = "GHL_BASE_URL", default_value = DEFAULT_CRM_BASE_URL)]
    pub crm_base_url: String,

    // Value sent in the `Version` header
    #[arg(long, env = "GHL_API_VERSION", default_value = DEFAULT_CRM_API_VERSION)]
    pub crm_api_version: String,

    // Rate limit max requests per window
    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value_t = 10)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = 60)]
    pub rate_window: u64,

    // How often stale rate limit keys are swept, in seconds
    #[arg(long, env = "RATE_LIMIT_SWEEP_SECS", default_value_t = 300)]
    pub sweep_interval: u64,

    // Take the client address from X-Forwarded-For / X-Real-IP. Only safe
    // behind a proxy that overwrites those headers.
    #[arg(long, env = "TRUST_PROXY", default_value_t = false)]
    pub trust_proxy: bool,

    // Reported by /health
    #[arg(long, env = "APP_ENV", default_value = "development")]
    pub environment: String,
}

impl Args {
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1))
    }

    /// Both CRM settings, or `None` when either is unset or blank.
    pub fn crm_credentials(&self) -> Option<(&str, &str)> {
        let api_key = self.api_key.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let location_id = self
            .location_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        Some((api_key, location_id))
    }
}
