use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Gauge, HistogramVec, register_counter_vec, register_gauge,
    register_histogram_vec,
};

lazy_static! {
    pub static ref REFERRAL_REQUESTS: CounterVec = register_counter_vec!(
        "referral_requests_total",
        "Referral increment requests by outcome",
        &["outcome"]
    )
    .unwrap();
    pub static ref UPSTREAM_LATENCY: HistogramVec = register_histogram_vec!(
        "referral_upstream_latency_seconds",
        "CRM call latency in seconds",
        &["operation"]
    )
    .unwrap();
    pub static ref RATE_LIMIT_KEYS: Gauge = register_gauge!(
        "referral_rate_limit_keys",
        "Client keys currently tracked by the rate limiter"
    )
    .unwrap();
}

pub fn record_outcome(outcome: &str) {
    REFERRAL_REQUESTS.with_label_values(&[outcome]).inc();
}
