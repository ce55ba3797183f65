//! Double-entry journal: immutable headers and lines.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::ids::{
    DealAllocationId, DealBlockId, InstrumentId, JournalEntryId, PendingTradeId, PortfolioId,
};

/// Direction of a trade for journal purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeType {
    /// Quantity increased (quantity >= 0).
    Buy,
    /// Quantity decreased (quantity < 0).
    Sell,
}

impl TradeType {
    /// Classify by the sign of a signed quantity, per C7's `post_position`
    /// convention (`quantity >= 0` is a buy).
    pub fn from_quantity(quantity: Decimal) -> Self {
        if quantity >= Decimal::ZERO {
            TradeType::Buy
        } else {
            TradeType::Sell
        }
    }
}

/// What kind of posting a journal entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRole {
    /// An ordinary, first-time posting.
    Normal,
    /// Compensates (undoes) a prior `Normal` entry.
    Reversal,
    /// Re-posts after a reversal.
    Replacement,
}

/// Debit or credit side of a journal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DrCr {
    /// Debit.
    Dr,
    /// Credit.
    Cr,
}

impl DrCr {
    /// Debit when the signed quantity is non-negative, credit otherwise —
    /// the convention used throughout the lifecycle and CA engines.
    pub fn from_signed(value: Decimal) -> Self {
        if value >= Decimal::ZERO { DrCr::Dr } else { DrCr::Cr }
    }
}

/// An immutable journal entry header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Primary key.
    pub id: JournalEntryId,
    /// Originating pending trade, for lifecycle-driven entries.
    pub pending_trade_id: Option<PendingTradeId>,
    /// Originating deal block, for lifecycle/CA-driven entries.
    pub deal_block_id: Option<DealBlockId>,
    /// Originating deal allocation.
    pub deal_allocation_id: Option<DealAllocationId>,
    /// Business-effective date (trade date, or CA pay/ex date).
    pub effective_date: NaiveDate,
    /// Wall-clock posting time.
    pub posted_at: DateTime<Utc>,
    /// Buy or sell, by convention.
    pub trade_type: TradeType,
    /// Normal, reversal, or replacement.
    pub entry_role: EntryRole,
    /// The `Normal` entry this one reverses, when `entry_role = Reversal`.
    pub reversal_of_entry_id: Option<JournalEntryId>,
    /// The `Normal` entry this one replaces, when `entry_role = Replacement`.
    pub replacement_of_entry_id: Option<JournalEntryId>,
    /// Free-text description.
    pub description: String,
}

/// A single debit or credit line on a journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntryLine {
    /// Owning entry.
    pub entry_id: JournalEntryId,
    /// Portfolio affected.
    pub portfolio_id: PortfolioId,
    /// Instrument affected.
    pub instrument_id: InstrumentId,
    /// One of `POSITION`, `CASH`, `DIVIDEND_INCOME`, `STOCK_SPLIT`.
    pub account_code: String,
    /// Debit or credit.
    pub drcr: DrCr,
    /// Signed quantity, when the line carries one (position/split lines do;
    /// pure cash lines may not).
    pub quantity: Option<Decimal>,
    /// Signed monetary amount.
    pub amount: Decimal,
    /// Currency of `amount`.
    pub currency: String,
}
