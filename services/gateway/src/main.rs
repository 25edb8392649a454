mod auth;
mod config;
mod error;
mod handlers;
mod models;
mod router;
mod scheduler;
mod state;

use config::Config;
use router::create_router;
use state::AppState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use types::clock::SystemClock;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    tracing::info!(
        window_ms = config.policy.window_ms,
        message_quota = config.policy.message_quota,
        require_co_location = config.policy.require_co_location,
        "Starting match gateway"
    );

    let state = AppState::new(&config, Arc::new(SystemClock));
    let _sweeper = scheduler::spawn_sweep(state.sweep.clone(), config.sweep_interval, config.sweep_clean);

    let app = create_router(state);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
