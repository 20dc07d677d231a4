//! Local Backend Binary - In-memory scene API for development
//!
//! Serves the scene REST contract, the upload storage and a simulated
//! processing pipeline from a single process. It wires up:
//! - In-memory scene store and object storage
//! - Pipeline simulator walking each job through the processing stages
//! - HTTP inbound adapter (axum)

use splatline::adapters::local::LocalBackend;
use splatline::config::LocalConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = LocalConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let backend = LocalBackend::new(config.public_url.clone(), Some(config.stage_interval));
    let app = backend.router();

    let listener = match tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
    {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}:{}: {}", config.addr, config.port, e);
            std::process::exit(1);
        }
    };
    info!(
        "Listening at {}:{} (public URL {}, {:?} per stage)",
        config.addr, config.port, config.public_url, config.stage_interval
    );
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server failed: {}", e);
        std::process::exit(1);
    }
}
