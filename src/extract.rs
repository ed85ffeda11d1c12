use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{HeaderMap, request::Parts};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::state::AppState;

/// Key the rate limiter buckets a caller under, normally its IP address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl ClientKey {
    /// Forwarding headers are only honoured with `trust_proxy`; otherwise any
    /// caller could pick its own bucket. Falls back to the peer address.
    pub fn resolve(parts: &Parts, trust_proxy: bool) -> Self {
        if trust_proxy {
            if let Some(key) = ClientKey::from_headers(&parts.headers) {
                return key;
            }
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        ClientKey(peer.unwrap_or_else(|| "unknown".to_string()))
    }

    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let real_ip = || {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        forwarded.or_else(real_ip).map(|v| ClientKey(v.to_string()))
    }
}

impl FromRequestParts<Arc<AppState>> for ClientKey {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(ClientKey::resolve(parts, state.trust_proxy))
    }
}
