use std::sync::Arc;

use server::config::ServerConfig;
use server::services::{MemoryStore, PgStore, Store, seed};
use server::{db, routes, state};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid server configuration");
            std::process::exit(2);
        }
    };

    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = db::init_pool(database_url, config.db_max_connections)
                .await
                .expect("database init failed");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory storage");
            Arc::new(MemoryStore::new())
        }
    };

    if config.seed_demo {
        if let Err(e) = seed::seed_demo(store.as_ref()).await {
            tracing::warn!(error = %e, "demo seed failed");
        }
    }

    let app = routes::app(state::AppState::new(store));
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");

    tracing::info!(%addr, backend = config.backend(), "annotate server listening");
    axum::serve(listener, app).await.expect("server failed");
}
