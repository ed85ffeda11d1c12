mod fallback;
mod health;
mod metrics;
mod referral;

pub use fallback::{AVAILABLE_ENDPOINTS, not_found_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use referral::{
    SUCCESS_MESSAGE, increment_referral_handler, method_not_allowed_handler, preflight_handler,
};
