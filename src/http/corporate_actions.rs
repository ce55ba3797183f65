//! `/corporate-actions` endpoints: event declaration, election submission,
//! and kicking off per-holder processing (C10).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::http::error::ApiResult;
use crate::http::AppState;
use crate::model::CaEventId;
use crate::service::corporate_action::{
    CaEventView, CorporateActionService, CreateCaEventRequest, SubmitElectionRequest,
};
use crate::service::parse_positive_id;
use crate::workflow::orchestrator::WorkflowHandle;

/// `POST /corporate-actions`.
pub async fn create_event(
    State(state): State<AppState>,
    Json(req): Json<CreateCaEventRequest>,
) -> ApiResult<Json<CaEventView>> {
    let service = CorporateActionService::new(state.store.as_ref());
    let view = service.create_event(req).await?;
    Ok(Json(view))
}

/// `GET /corporate-actions/{id}`.
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CaEventView>> {
    let id = CaEventId(parse_positive_id(&id, "id")?);
    let service = CorporateActionService::new(state.store.as_ref());
    let view = service.get_event(id).await?;
    Ok(Json(view))
}

/// `POST /corporate-actions/{id}/elections`.
pub async fn submit_election(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubmitElectionRequest>,
) -> ApiResult<StatusCode> {
    let id = CaEventId(parse_positive_id(&id, "id")?);
    let service = CorporateActionService::new(state.store.as_ref());
    service.submit_election(id, req).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /corporate-actions/{id}/process`: kicks off per-holder processing
/// and returns its handle without waiting for completion.
pub async fn process_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<WorkflowHandle>)> {
    let id = CaEventId(parse_positive_id(&id, "id")?);
    let service = CorporateActionService::new(state.store.as_ref());
    service.get_event(id).await?;
    let handle = state.workflow.start_corporate_action(id).await?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}
