//! HTTP server entrypoint: wires up the Postgres store, the Redis
//! write-through cache, and the in-process workflow client behind the
//! `axum` router.

use std::sync::Arc;

use backoffice_core::config::ServiceConfig;
use backoffice_core::http::{router, AppState};
use backoffice_core::logger::setup_logger;
use backoffice_core::service::position_cache::RedisPositionCache;
use backoffice_core::store::postgres::PostgresStore;
use backoffice_core::workflow::orchestrator::InProcessWorkflowClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logger();

    let config = ServiceConfig::default();
    tracing::info!(%config, "starting backoffice-server");

    let store = Arc::new(PostgresStore::connect(&config.database_url).await?);
    let cache = Arc::new(RedisPositionCache::connect(&config.redis_url).await?);
    let workflow = Arc::new(InProcessWorkflowClient::new(store.clone(), cache.clone()));

    let state = AppState {
        store,
        cache,
        workflow,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.http_bind_addr).await?;
    tracing::info!(addr = %config.http_bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
