use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use referral_relay::config::Args;
use referral_relay::create_router;
use referral_relay::rate_limit::{RateLimiter, sweep_expired};
use referral_relay::state::AppState;

// this is main async function with tokio
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("referral_relay=info,tower_http=info")),
        )
        .init();

    // parse cli arguments
    let args = Args::parse();

    let rate_limiter = Arc::new(RateLimiter::new(args.rate_limit, args.rate_window()));
    let state = Arc::new(AppState::from_args(&args, Arc::clone(&rate_limiter))?);

    if state.crm.is_none() {
        warn!("CRM credentials are not fully configured; referral requests will fail with 500");
    }

    // spawn the sweeper that evicts idle rate limit keys
    tokio::spawn(sweep_expired(Arc::clone(&rate_limiter), args.sweep_interval()));

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, environment = %args.environment, "Referral relay listening");
    info!(
        max_requests = args.rate_limit,
        window_secs = args.rate_window,
        "Rate limit configured"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Referral relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
