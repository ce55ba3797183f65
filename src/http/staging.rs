//! `/staging-transactions` endpoints: single pending-trade CRUD plus kicking
//! off the C6 trade-lifecycle workflow.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::constants::headers;
use crate::http::error::ApiResult;
use crate::http::AppState;
use crate::model::PendingTradeId;
use crate::service::parse_positive_id;
use crate::service::pending_trade::{
    CreateStagingRequest, PendingTradeService, StagingView, UpdateStagingRequest,
};
use crate::workflow::orchestrator::WorkflowHandle;

fn header_value(header_map: &HeaderMap, name: &str) -> Option<String> {
    header_map
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `POST /staging-transactions`, idempotent on the `Idempotency-Key` header.
pub async fn create_staging(
    State(state): State<AppState>,
    header_map: HeaderMap,
    Json(req): Json<CreateStagingRequest>,
) -> ApiResult<Json<StagingView>> {
    let idempotency_key = header_value(&header_map, headers::IDEMPOTENCY_KEY);
    let service = PendingTradeService::new(state.store.as_ref());
    let view = service
        .create_staging(req, idempotency_key.as_deref())
        .await?;
    Ok(Json(view))
}

/// `GET /staging-transactions/{id}`.
pub async fn get_staging(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StagingView>> {
    let id = PendingTradeId(parse_positive_id(&id, "id")?);
    let service = PendingTradeService::new(state.store.as_ref());
    let view = service.get_staging(id).await?;
    Ok(Json(view))
}

/// `PATCH /staging-transactions/{id}`, recording `X-Actor`/`X-Change-Reason`
/// on the audit trail when present.
pub async fn patch_staging(
    State(state): State<AppState>,
    Path(id): Path<String>,
    header_map: HeaderMap,
    Json(req): Json<UpdateStagingRequest>,
) -> ApiResult<Json<StagingView>> {
    let id = PendingTradeId(parse_positive_id(&id, "id")?);
    let actor = header_value(&header_map, headers::ACTOR);
    let reason = header_value(&header_map, headers::CHANGE_REASON);
    let service = PendingTradeService::new(state.store.as_ref());
    let view = service.patch_staging(id, req, actor, reason).await?;
    Ok(Json(view))
}

/// `POST /staging-transactions/{id}/process`: kicks off the trade-lifecycle
/// workflow and returns its handle without waiting for completion.
pub async fn process_staging(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<WorkflowHandle>)> {
    let id = PendingTradeId(parse_positive_id(&id, "id")?);
    let service = PendingTradeService::new(state.store.as_ref());
    service.get_staging(id).await?;
    let handle = state.workflow.start_trade_lifecycle(id).await?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}
