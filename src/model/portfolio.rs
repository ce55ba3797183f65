//! Portfolio entity.

use serde::{Deserialize, Serialize};

use crate::model::ids::PortfolioId;

/// A portfolio: opaque id plus a reporting currency. Immutable after
/// creation for the core's purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    /// Primary key.
    pub id: PortfolioId,
    /// 3-letter uppercase reporting currency code.
    pub report_currency: String,
}
