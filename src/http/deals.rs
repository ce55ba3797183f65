//! `/staging-transactions/deals` endpoints: deal-block creation and the C5
//! modify/delete adjustment surface, plus kicking off a lifecycle workflow
//! per leg.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::http::error::ApiResult;
use crate::http::AppState;
use crate::model::{DealBlockId, Level, Lifecycle};
use crate::service::parse_positive_id;
use crate::service::pending_trade::{
    CreateDealStagingRequest, CreateDealStagingView, DealAdjustmentView, ModifyDealRequest,
    PendingTradeService,
};
use crate::workflow::orchestrator::WorkflowHandle;

/// `POST /staging-transactions/deals`.
pub async fn create_deal(
    State(state): State<AppState>,
    Json(req): Json<CreateDealStagingRequest>,
) -> ApiResult<Json<CreateDealStagingView>> {
    let service = PendingTradeService::new(state.store.as_ref());
    let view = service.create_deal_staging(req).await?;
    Ok(Json(view))
}

/// `PATCH /staging-transactions/deals/{deal_block_id}`.
pub async fn modify_deal(
    State(state): State<AppState>,
    Path(deal_block_id): Path<String>,
    Json(req): Json<ModifyDealRequest>,
) -> ApiResult<Json<DealAdjustmentView>> {
    let deal_block_id = DealBlockId(parse_positive_id(&deal_block_id, "deal_block_id")?);
    let service = PendingTradeService::new(state.store.as_ref());
    let view = service.modify_deal_staging(deal_block_id, req).await?;
    Ok(Json(view))
}

/// `DELETE /staging-transactions/deals/{deal_block_id}`.
pub async fn delete_deal(
    State(state): State<AppState>,
    Path(deal_block_id): Path<String>,
) -> ApiResult<Json<DealAdjustmentView>> {
    let deal_block_id = DealBlockId(parse_positive_id(&deal_block_id, "deal_block_id")?);
    let service = PendingTradeService::new(state.store.as_ref());
    let view = service.delete_deal_staging(deal_block_id).await?;
    Ok(Json(view))
}

/// `POST /staging-transactions/deals/{block_staging_id}/process`: kicks off
/// the trade-lifecycle workflow for every active allocation leg underneath
/// the block. The block-level pending trade itself is never driven through
/// the workflow — `block_staging_id` only locates its children.
pub async fn process_deal(
    State(state): State<AppState>,
    Path(block_staging_id): Path<String>,
) -> ApiResult<(StatusCode, Json<Vec<WorkflowHandle>>)> {
    let deal_block_id = DealBlockId(parse_positive_id(&block_staging_id, "block_staging_id")?);
    state
        .store
        .get_deal_block(deal_block_id)
        .await?
        .ok_or(crate::error::CoreError::NotFound("deal_block_not_found"))?;

    let trades = state
        .store
        .list_pending_trades_for_block(deal_block_id)
        .await?;

    let mut handles = Vec::with_capacity(trades.len());
    for trade in trades {
        if trade.lifecycle != Lifecycle::Active || trade.level != Level::Allocation {
            continue;
        }
        handles.push(state.workflow.start_trade_lifecycle(trade.id).await?);
    }
    Ok((StatusCode::ACCEPTED, Json(handles)))
}
