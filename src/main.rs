use anyhow::Context;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cinema_booking::{build_router, config::Config, AppState};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(&config.app.rust_log);
    let registry = tracing_subscriber::registry().with(filter);
    if config.app.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(&config);

    info!(
        environment = %config.app.environment,
        storage = ?config.storage.backend,
        locks = ?config.storage.locks,
        gateway = ?config.payment.gateway,
        "Starting cinema booking API"
    );

    let state = AppState::new(config.clone())
        .await
        .context("failed to initialise application state")?;

    // --- Фоновые задачи ---
    let reaper = state.cleanup_service().spawn();

    // --- Веб-сервер ---
    let app = build_router(state);
    let host: std::net::IpAddr = config
        .app
        .host
        .parse()
        .with_context(|| format!("invalid HOST '{}'", config.app.host))?;
    let addr = SocketAddr::from((host, config.app.port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    reaper.abort();
    Ok(())
}
