//! Corporate-action entities (C10).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::ids::{CaEventId, InstrumentId, JournalEntryId, PortfolioId};
use crate::model::pending_trade::Lifecycle;

/// Kind of corporate action handled by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaType {
    /// A per-share cash payment.
    CashDividend,
    /// A share-count adjustment at a fixed ratio.
    StockSplit,
}

/// Lifecycle status of a corporate-action event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaEventStatus {
    /// Declared, not yet processed.
    Pending,
    /// Per-holder effects applied.
    Processed,
    /// Withdrawn before processing.
    Cancelled,
}

/// A declared corporate action on an instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaEvent {
    /// Primary key.
    pub id: CaEventId,
    /// Cash dividend or stock split.
    pub ca_type: CaType,
    /// Instrument the event applies to.
    pub instrument_id: InstrumentId,
    /// Ex-dividend / ex-split date.
    pub ex_date: NaiveDate,
    /// Record date, if tracked.
    pub record_date: Option<NaiveDate>,
    /// Payment date, used as the journal entry's effective date when present.
    pub pay_date: Option<NaiveDate>,
    /// Payment currency, for cash dividends; falls back to the portfolio's
    /// report currency when absent.
    pub currency: Option<String>,
    /// Cash paid per held share, for cash dividends.
    pub cash_amount_per_share: Option<Decimal>,
    /// Split ratio numerator, for stock splits.
    pub split_numerator: Option<Decimal>,
    /// Split ratio denominator, for stock splits.
    pub split_denominator: Option<Decimal>,
    /// Whether holders must explicitly accept before the effect applies.
    pub require_election: bool,
    /// Pending / processed / cancelled.
    pub status: CaEventStatus,
    /// Active / cancelled / deleted.
    pub lifecycle: Lifecycle,
}

impl CaEvent {
    /// The effective date used for journal entries this event produces:
    /// pay date if known, otherwise ex date.
    pub fn effective_date(&self) -> NaiveDate {
        self.pay_date.unwrap_or(self.ex_date)
    }
}

/// A portfolio's decision on a corporate action requiring election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaChoice {
    /// Effect applies.
    Accept,
    /// Effect does not apply.
    Decline,
}

/// A portfolio's election on a corporate-action event; `(ca_event_id,
/// portfolio_id)` unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaElection {
    /// Event being elected on.
    pub ca_event_id: CaEventId,
    /// Electing portfolio.
    pub portfolio_id: PortfolioId,
    /// Accept or decline.
    pub choice: CaChoice,
}

/// Per-holder, per-event election-requirement override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaPortfolioRule {
    /// Portfolio the override applies to.
    pub portfolio_id: PortfolioId,
    /// CA type the override applies to.
    pub ca_type: CaType,
    /// Overrides the event's own `require_election` when `true`.
    pub require_election: bool,
}

/// The at-most-once per-holder application record; `(ca_event_id,
/// portfolio_id)` unique, claimed via `ON CONFLICT DO NOTHING`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaEffect {
    /// Event applied.
    pub ca_event_id: CaEventId,
    /// Affected portfolio.
    pub portfolio_id: PortfolioId,
    /// Journal entry produced by the effect.
    pub journal_entry_id: Option<JournalEntryId>,
    /// Cash credited, for cash dividends.
    pub cash_amount: Option<Decimal>,
    /// Share-count delta applied, for stock splits.
    pub share_delta: Option<Decimal>,
}
