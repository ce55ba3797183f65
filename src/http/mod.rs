//! HTTP surface: one `axum` router exposing the staging/deal, NAV, and
//! corporate-action endpoints described by spec.md §6, backed by
//! [`AppState`]'s store/cache/workflow-client handles.

pub mod corporate_actions;
pub mod deals;
pub mod error;
pub mod nav;
pub mod staging;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::constants::routes;
use crate::service::position_cache::PositionCache;
use crate::store::Store;
use crate::workflow::orchestrator::WorkflowClient;

/// Shared handles every handler needs: the persistence layer, the
/// write-through cache, and the workflow client used to kick off durable
/// runs without blocking the request.
#[derive(Clone)]
pub struct AppState {
    /// Persistence abstraction (Postgres in production, in-memory in tests).
    pub store: Arc<dyn Store>,
    /// Write-through position/NAV cache (Redis in production, no-op in tests).
    pub cache: Arc<dyn PositionCache>,
    /// Durable-workflow client used by the `/process` and `/run` endpoints.
    pub workflow: Arc<dyn WorkflowClient>,
}

/// Build the service router. `server.rs` attaches this to a `TcpListener`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            routes::STAGING_TRANSACTIONS,
            post(staging::create_staging),
        )
        .route(
            routes::STAGING_TRANSACTION_BY_ID,
            get(staging::get_staging).patch(staging::patch_staging),
        )
        .route(
            routes::STAGING_TRANSACTION_PROCESS,
            post(staging::process_staging),
        )
        .route(routes::DEALS, post(deals::create_deal))
        .route(
            routes::DEAL_BY_ID,
            axum::routing::patch(deals::modify_deal).delete(deals::delete_deal),
        )
        .route(routes::DEAL_PROCESS, post(deals::process_deal))
        .route(routes::NAV_IBOR, get(nav::get_ibor_nav))
        .route(routes::NAV_IBOR_SNAPSHOT, post(nav::snapshot_ibor_nav))
        .route(routes::NAV_ABOR_RUN, post(nav::start_abor_run))
        .route(routes::NAV_ABOR_RESULT, get(nav::get_abor_result))
        .route(
            routes::CORPORATE_ACTIONS,
            post(corporate_actions::create_event),
        )
        .route(
            routes::CORPORATE_ACTION_BY_ID,
            get(corporate_actions::get_event),
        )
        .route(
            routes::CORPORATE_ACTION_ELECTIONS,
            post(corporate_actions::submit_election),
        )
        .route(
            routes::CORPORATE_ACTION_PROCESS,
            post(corporate_actions::process_event),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
