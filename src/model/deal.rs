//! Deal Block / Deal Allocation: the business objects behind a block trade.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::ids::{DealAllocationId, DealBlockId, InstrumentId, PortfolioId};
use crate::model::pending_trade::Lifecycle;

/// BUY or SELL family of transaction types; determines the sign applied to
/// block/allocation quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Buy-equity family: positive sign.
    BuyEquity,
    /// Sell-equity family: negative sign.
    SellEquity,
}

impl TransactionType {
    /// Sign multiplier applied to the absolute total/allocation quantities.
    pub fn sign(self) -> Decimal {
        match self {
            TransactionType::BuyEquity => Decimal::ONE,
            TransactionType::SellEquity => -Decimal::ONE,
        }
    }
}

/// The business object behind a block trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealBlock {
    /// Primary key.
    pub id: DealBlockId,
    /// Traded instrument.
    pub instrument_id: InstrumentId,
    /// Trade date.
    pub trade_date: NaiveDate,
    /// Optional contractual settle date.
    pub settle_date: Option<NaiveDate>,
    /// Currency the block was traded in.
    pub trade_currency: String,
    /// Signed total quantity across all active allocations.
    pub total_quantity: Decimal,
    /// Trade price.
    pub price: Decimal,
    /// Active / cancelled / deleted.
    pub lifecycle: Lifecycle,
}

/// A per-portfolio allotment of a `DealBlock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealAllocation {
    /// Primary key.
    pub id: DealAllocationId,
    /// Owning block.
    pub block_id: DealBlockId,
    /// Receiving portfolio.
    pub portfolio_id: PortfolioId,
    /// Signed quantity.
    pub quantity: Decimal,
    /// Trade price (mirrors the block's).
    pub price: Decimal,
    /// Whether this allocation absorbed the block/allocation-sum residual.
    pub is_rounding_adjustment: bool,
    /// Active / cancelled / deleted.
    pub lifecycle: Lifecycle,
}
