//! Market data inputs to the NAV engine: prices and FX rates.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::ids::InstrumentId;

/// A single observed price for an instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketPrice {
    /// Priced instrument.
    pub instrument_id: InstrumentId,
    /// Calendar date the price applies to.
    pub asof_date: NaiveDate,
    /// Precise observation time.
    pub asof_ts: DateTime<Utc>,
    /// Observed price.
    pub price: Decimal,
    /// Currency the price is quoted in.
    pub currency: String,
    /// Whether this is the official end-of-day print.
    pub is_eod: bool,
    /// Upstream source identifier, for ABOR audit trails.
    pub source_id: String,
}

/// A single observed FX rate, `base_ccy -> quote_ccy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxRate {
    /// Base (from) currency.
    pub base_ccy: String,
    /// Quote (to) currency.
    pub quote_ccy: String,
    /// Precise observation time.
    pub asof_ts: DateTime<Utc>,
    /// `1 base_ccy = rate quote_ccy`.
    pub rate: Decimal,
    /// Whether this is the official end-of-day print.
    pub is_eod: bool,
    /// Upstream source identifier, for ABOR audit trails.
    pub source_id: String,
}
