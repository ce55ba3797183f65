//! `/nav` endpoints: synchronous IBOR valuation and the ABOR end-of-day
//! workflow surface.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::http::error::ApiResult;
use crate::http::AppState;
use crate::model::{NavLineItem, NavRunId, Portfolio, PortfolioId, RunType};
use crate::service::nav::NavService;
use crate::service::parse_positive_id;
use crate::workflow::orchestrator::WorkflowHandle;

/// Optional valuation instant for `GET /nav/ibor/{portfolio_id}`; defaults to
/// now.
#[derive(Debug, Deserialize)]
pub struct IborQuery {
    /// Explicit valuation instant, overriding "now".
    pub asof_ts: Option<DateTime<Utc>>,
}

/// Valuation date, required by every ABOR endpoint.
#[derive(Debug, Deserialize)]
pub struct AborDateQuery {
    /// End-of-day valuation date.
    pub asof_date: NaiveDate,
}

/// `{nav_run_id, report_currency, nav_rc, line_items}`: the response shape
/// shared by every NAV read.
#[derive(Debug, Serialize)]
pub struct NavResultView {
    /// The run this total was computed under.
    pub nav_run_id: NavRunId,
    /// Reporting currency of `nav_rc`.
    pub report_currency: String,
    /// Total net asset value.
    pub nav_rc: Decimal,
    /// Per-instrument breakdown.
    pub line_items: Vec<NavLineItem>,
}

async fn load_portfolio(state: &AppState, portfolio_id: PortfolioId) -> Result<Portfolio, CoreError> {
    state
        .store
        .get_portfolio(portfolio_id)
        .await?
        .ok_or(CoreError::NotFound("portfolio_not_found"))
}

/// `GET /nav/ibor/{portfolio_id}`: live valuation against current positions.
pub async fn get_ibor_nav(
    State(state): State<AppState>,
    Path(portfolio_id): Path<String>,
    Query(query): Query<IborQuery>,
) -> ApiResult<Json<NavResultView>> {
    let portfolio_id = PortfolioId(parse_positive_id(&portfolio_id, "portfolio_id")?);
    let portfolio = load_portfolio(&state, portfolio_id).await?;
    let service = NavService::new(state.store.as_ref());
    let (nav_run_id, result, line_items) = service
        .compute_ibor_nav(
            portfolio_id,
            &portfolio.report_currency,
            query.asof_ts,
            RunType::Realtime,
        )
        .await?;
    Ok(Json(NavResultView {
        nav_run_id,
        report_currency: result.report_currency,
        nav_rc: result.nav_rc,
        line_items,
    }))
}

/// `POST /nav/ibor/{portfolio_id}/snapshot`: an explicit, named intra-day
/// snapshot, computed the same way as the live read.
pub async fn snapshot_ibor_nav(
    State(state): State<AppState>,
    Path(portfolio_id): Path<String>,
) -> ApiResult<Json<NavResultView>> {
    let portfolio_id = PortfolioId(parse_positive_id(&portfolio_id, "portfolio_id")?);
    let portfolio = load_portfolio(&state, portfolio_id).await?;
    let service = NavService::new(state.store.as_ref());
    let (nav_run_id, result, line_items) = service
        .compute_ibor_nav(
            portfolio_id,
            &portfolio.report_currency,
            None,
            RunType::Snapshot,
        )
        .await?;
    Ok(Json(NavResultView {
        nav_run_id,
        report_currency: result.report_currency,
        nav_rc: result.nav_rc,
        line_items,
    }))
}

/// `POST /nav/abor/{portfolio_id}/run`: kicks off the end-of-day ABOR
/// workflow; the caller reads the result back via
/// `GET /nav/abor/{portfolio_id}/result`.
pub async fn start_abor_run(
    State(state): State<AppState>,
    Path(portfolio_id): Path<String>,
    Json(req): Json<AborDateQuery>,
) -> ApiResult<(StatusCode, Json<WorkflowHandle>)> {
    let portfolio_id = PortfolioId(parse_positive_id(&portfolio_id, "portfolio_id")?);
    let portfolio = load_portfolio(&state, portfolio_id).await?;
    let handle = state
        .workflow
        .start_abor_nav(portfolio_id, portfolio.report_currency, req.asof_date)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}

/// `GET /nav/abor/{portfolio_id}/result`.
pub async fn get_abor_result(
    State(state): State<AppState>,
    Path(portfolio_id): Path<String>,
    Query(query): Query<AborDateQuery>,
) -> ApiResult<Json<NavResultView>> {
    let portfolio_id = PortfolioId(parse_positive_id(&portfolio_id, "portfolio_id")?);
    let service = NavService::new(state.store.as_ref());
    let (_run, result, line_items) = service
        .get_abor_result(portfolio_id, query.asof_date)
        .await?;
    Ok(Json(NavResultView {
        nav_run_id: result.nav_run_id,
        report_currency: result.report_currency,
        nav_rc: result.nav_rc,
        line_items,
    }))
}
