//! Pending Trade: the central entity of the lifecycle, and its audit trail.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ids::{DealAllocationId, DealBlockId, InstrumentId, PendingTradeId, PortfolioId};

/// Whether a pending trade is a standalone trade or one side of a deal
/// block/allocation pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// The block-level row of a deal.
    Block,
    /// An allocation-level row of a deal.
    Allocation,
}

/// Lifecycle position in the `entry -> pre_check -> position -> allocated ->
/// settled` pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Freshly created, not yet validated.
    Entry,
    /// Passed `precheck`.
    PreCheck,
    /// Journal entry and position posted.
    Position,
    /// Allocation ownership validated.
    Allocated,
    /// Terminal success state.
    Settled,
}

impl Status {
    /// The status this one advances to, or `None` if already terminal.
    pub fn next(self) -> Option<Status> {
        match self {
            Status::Entry => Some(Status::PreCheck),
            Status::PreCheck => Some(Status::Position),
            Status::Position => Some(Status::Allocated),
            Status::Allocated => Some(Status::Settled),
            Status::Settled => None,
        }
    }
}

/// Whether a row is still live, or has been superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Live; eligible for edits and status advances.
    Active,
    /// Cancelled before processing.
    Cancelled,
    /// Superseded by a deal modify/delete plan.
    Deleted,
}

/// Classifies deal-plan-originated rows; `None` (serialized as absent) for
/// ordinary rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSystem {
    /// Reversal leg of a deal modify.
    ModifyReversal,
    /// Replacement leg of a deal modify.
    ModifyReplacement,
    /// Reversal leg of a deal delete.
    DeleteReversal,
}

/// The central lifecycle row: a single trade instruction, standalone or
/// deal-originated, moving through the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTrade {
    /// Primary key.
    pub id: PendingTradeId,
    /// Standalone vs. deal block/allocation.
    pub level: Level,
    /// Back-reference to the owning deal block, when deal-originated.
    pub deal_block_id: Option<DealBlockId>,
    /// Back-reference to the specific allocation, when deal-originated.
    pub deal_allocation_id: Option<DealAllocationId>,
    /// Owning portfolio; required at `Level::Allocation`.
    pub portfolio_id: Option<PortfolioId>,
    /// Traded instrument.
    pub instrument_id: InstrumentId,
    /// Trade date.
    pub trade_date: NaiveDate,
    /// Optional contractual settle date.
    pub settle_date: Option<NaiveDate>,
    /// Signed quantity, scale 10.
    pub quantity: Decimal,
    /// Positive price, scale 12.
    pub price: Decimal,
    /// Quote currency of the traded instrument.
    pub quote_currency: String,
    /// Reporting currency of the owning portfolio.
    pub report_currency: String,
    /// `|quantity| * price`, rounded to money scale, in quote currency.
    pub qc_gross_amount: Decimal,
    /// `qc_gross_amount` converted to report currency (identity when
    /// `quote_currency == report_currency`), rounded to money scale.
    pub rc_gross_amount: Decimal,
    /// Current lifecycle-pipeline status.
    pub status: Status,
    /// Active / cancelled / deleted.
    pub lifecycle: Lifecycle,
    /// Monotonic per-row counter, incremented on every mutation.
    pub entry_version: i64,
    /// Deal-plan classification, if any.
    pub source_system: Option<SourceSystem>,
}

/// Append-only audit row for a `PATCH` on a Pending Trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTradeChange {
    /// Row being audited.
    pub pending_trade_id: PendingTradeId,
    /// When the change was recorded.
    pub changed_at: DateTime<Utc>,
    /// Who made the change, from the `X-Actor` header.
    pub actor: Option<String>,
    /// Why, from the `X-Change-Reason` header.
    pub reason: Option<String>,
    /// Prior field values, opaque JSON, only the patched subset.
    pub old_row: Value,
    /// New field values, opaque JSON, only the patched subset.
    pub new_row: Value,
}
