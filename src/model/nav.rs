//! NAV run headers, results, and per-instrument line items (C9).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::ids::{InstrumentId, NavRunId, PortfolioId};

/// Which valuation basis a NAV run computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    /// Intra-day, against live positions, no persisted `asof_date`.
    Realtime,
    /// An explicit intra-day snapshot taken on demand.
    Snapshot,
    /// End-of-day, against `position_snapshot_eod`.
    Eod,
}

/// Lifecycle status of a NAV run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavRunStatus {
    /// Header inserted, computation not yet finished.
    Running,
    /// Result and line items persisted.
    Completed,
    /// Computation raised an error.
    Failed,
}

/// NAV run header. IBOR runs key on `(portfolio_id, run_type, asof_ts)`;
/// ABOR runs key on `(portfolio_id, run_type, asof_date)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavRun {
    /// Primary key.
    pub id: NavRunId,
    /// Portfolio being valued.
    pub portfolio_id: PortfolioId,
    /// Realtime / snapshot / eod.
    pub run_type: RunType,
    /// Precise valuation instant (IBOR).
    pub asof_ts: Option<DateTime<Utc>>,
    /// Valuation date (ABOR).
    pub asof_date: Option<NaiveDate>,
    /// Running / completed / failed.
    pub status: NavRunStatus,
    /// Idempotency scope, when the run was started via an idempotent endpoint.
    pub idempotency_scope: Option<String>,
    /// Idempotency key, when the run was started via an idempotent endpoint.
    pub idempotency_key: Option<String>,
}

/// The computed total value of a NAV run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavResult {
    /// Owning run.
    pub nav_run_id: NavRunId,
    /// Reporting currency the total is expressed in.
    pub report_currency: String,
    /// Total net asset value in `report_currency`.
    pub nav_rc: Decimal,
}

/// Per-instrument breakdown of a NAV run's total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavLineItem {
    /// Owning run.
    pub nav_run_id: NavRunId,
    /// Valued instrument.
    pub instrument_id: InstrumentId,
    /// Quantity held as of the valuation.
    pub quantity: Decimal,
    /// Price used, in the instrument's quote currency.
    pub price: Decimal,
    /// FX rate used, quote currency -> report currency.
    pub fx_rate: Decimal,
    /// `quantity * price * fx_rate`, in report currency.
    pub market_value_rc: Decimal,
    /// Price observation time used (ABOR audit trail).
    pub price_asof_ts: Option<DateTime<Utc>>,
    /// Price source identifier used (ABOR audit trail).
    pub price_source_id: Option<String>,
    /// FX rate observation time used (ABOR audit trail).
    pub fx_rate_asof_ts: Option<DateTime<Utc>>,
    /// FX rate source identifier used (ABOR audit trail).
    pub fx_rate_source_id: Option<String>,
}
