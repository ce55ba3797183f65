//! Instrument entity and its subtype payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ids::InstrumentId;

/// Kind of instrument. `Cash` instruments are auto-provisioned per currency
/// the first time a currency is needed (security id `CASH_{CCY}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    /// Listed equity.
    Stock,
    /// Currency-denominated cash leg.
    Cash,
    /// Exchange-traded future.
    Futures,
    /// Foreign-exchange contract.
    Fx,
    /// Interest-rate or equity swap.
    Swap,
    /// Bond or other fixed-income security.
    FixedIncome,
}

/// An instrument: opaque id, type, quote currency and primary security
/// identifier. A subtype record may hang off it; the subtype's own fields
/// are carried as an opaque JSON payload because no core operation branches
/// on them directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    /// Primary key.
    pub id: InstrumentId,
    /// Kind of instrument.
    pub instrument_type: InstrumentType,
    /// 3-letter uppercase quote currency code.
    pub quote_currency: String,
    /// Primary security identifier (ticker, ISIN, or `CASH_{CCY}`).
    pub security_id: String,
    /// Opaque subtype payload (equity/futures/fx/swap/fixedincome details).
    pub subtype: Option<Value>,
}

impl Instrument {
    /// Security id used for the auto-provisioned cash instrument of a given
    /// currency.
    pub fn cash_security_id(currency: &str) -> String {
        format!("{}{}", crate::constants::CASH_SECURITY_ID_PREFIX, currency)
    }
}
