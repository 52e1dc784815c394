use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use library_hub::{
    config::Config,
    db::{self, LibraryRepository, MemoryRepository, PgRepository},
    routes::create_router,
    storage::build_store,
    utils::init_logger,
    AppState,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_logger("library_hub=debug,tower_http=debug,axum=debug", "library-hub.log");

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);

    let repo: Arc<dyn LibraryRepository> = match &config.database.url {
        Some(_) => {
            let pool = db::create_pool(&config.database).await?;

            info!("Running database migrations...");
            db::run_migrations(&pool).await?;
            info!("Database migrations completed");

            Arc::new(PgRepository::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory repository (data is lost on exit)");
            Arc::new(MemoryRepository::new())
        }
    };

    let store = build_store(&config.storage, &config.upload)?;
    info!(storage = if store.is_mock() { "mock" } else { "s3" }, "Object storage ready");

    let state = AppState {
        repo,
        store,
        config: config.clone(),
    };
    let app = create_router(state);

    let ip = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid HOST: {}", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
