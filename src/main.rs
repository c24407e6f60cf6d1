use std::{net::SocketAddr, sync::Arc};

use gateway::{
    breaker::spawn_transition_logger,
    config::{GatewayConfig, LogFormat},
    dispatcher::HttpDownstream,
    registry::{ConsulRegistry, ServiceRegistry, register_self},
    router::build_router,
    saga::SqliteSagaStore,
    state::AppState,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::from_env();
    init_logging(config.log_format);

    let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let registry: Arc<dyn ServiceRegistry> = Arc::new(ConsulRegistry::new(&config.registry)?);
    register_self(registry.as_ref(), &config.registry.self_descriptor).await;

    let state = AppState::from_config(
        &config,
        registry,
        Arc::new(HttpDownstream::new()?),
        Arc::new(SqliteSagaStore::new(pool)),
    );
    spawn_transition_logger(state.dispatcher.subscribe());
    state.rate_monitor.clone().spawn();

    let app = build_router(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
