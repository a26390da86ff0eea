use std::net::SocketAddr;
use std::sync::Arc;

use identity_service::{
    build_router,
    config::{Config, LogFormat},
    services::{IdentityService, SmtpNotifier},
    store::PgStore,
    AppState,
};
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), identity_service::error::CoreError> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid
    let config = Config::from_env()?;

    init_tracing(&config);

    tracing::info!(
        service = %config.service_name,
        environment = ?config.environment,
        "Starting identity service"
    );

    // Connect to the database and ensure the schema exists
    let store = PgStore::connect(&config.database.url, config.database.max_connections).await?;
    tracing::info!("Database initialized");
    let store = Arc::new(store);

    let notifier = Arc::new(SmtpNotifier::new(&config.smtp, config.base_url.clone())?);
    tracing::info!("Notifier initialized");

    let identity = IdentityService::new(
        store.clone(),
        notifier,
        config.session.ttl_hours,
    )?;

    let state = AppState {
        config: config.clone(),
        store,
        identity,
    };

    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
