//! Position projection: live and end-of-day snapshot tables (C8).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ids::{InstrumentId, JournalEntryId, PortfolioId};

/// Live position for a `(portfolio, instrument)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionCurrent {
    /// Owning portfolio.
    pub portfolio_id: PortfolioId,
    /// Held instrument.
    pub instrument_id: InstrumentId,
    /// Signed quantity held.
    pub quantity: Decimal,
    /// Running cost basis in report currency, as last supplied.
    pub cost_basis_rc: Option<Decimal>,
    /// Journal entry that produced the latest update.
    pub last_journal_entry_id: JournalEntryId,
    /// Rotated on every update, used for cache optimistic concurrency.
    pub version_uuid: Uuid,
    /// Last write timestamp.
    pub updated_at: DateTime<Utc>,
}

/// End-of-day materialization of `PositionCurrent`, keyed by
/// `(asof_date, portfolio_id, instrument_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshotEod {
    /// Snapshot date.
    pub asof_date: NaiveDate,
    /// Owning portfolio.
    pub portfolio_id: PortfolioId,
    /// Held instrument.
    pub instrument_id: InstrumentId,
    /// Signed quantity held as of the snapshot.
    pub quantity: Decimal,
    /// Cost basis carried into the snapshot.
    pub cost_basis_rc: Option<Decimal>,
    /// Most recent journal entry reflected in this snapshot.
    pub through_entry_id: JournalEntryId,
}

/// Write-through cache payload for `position:{portfolio_id}:{instrument_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionCacheEntry {
    /// Signed quantity.
    pub quantity: Decimal,
    /// Current position version.
    pub version_uuid: Uuid,
    /// Last write timestamp.
    pub updated_at: DateTime<Utc>,
    /// Always `"db"`: marks the entry as sourced from a real write, not a
    /// placeholder.
    pub source: String,
}
