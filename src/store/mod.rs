//! Persistence abstraction.
//!
//! `Store` is the single trait every service/activity/workflow depends on.
//! `postgres::PostgresStore` is the production `sqlx`-backed implementation;
//! `memory::MemoryStore` is an in-process fake used by the scenario test
//! suite, mirroring the original Python implementation's `conftest.py`
//! fixtures.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::CoreError;
use crate::model::{
    CaEffect, CaElection, CaEvent, CaEventId, CaEventStatus, CaPortfolioRule, CaType, DealAllocation,
    DealAllocationId, DealBlock, DealBlockId, Instrument, InstrumentId, JournalEntry,
    JournalEntryId, JournalEntryLine, Lifecycle, MarketPrice, NavLineItem, NavResult, NavRun,
    NavRunId, NavRunStatus, PendingTrade, PendingTradeChange, PendingTradeId, Portfolio,
    PortfolioId, PositionCurrent, PositionSnapshotEod, RunType, Status,
};

/// Fields a `PATCH /staging-transactions/{id}` request may update.
#[derive(Debug, Clone, Default)]
pub struct PendingTradePatch {
    /// New trade date, if supplied.
    pub trade_date: Option<NaiveDate>,
    /// New settle date, if supplied. `Some(None)` clears it.
    pub settle_date: Option<Option<NaiveDate>>,
    /// New quantity, if supplied.
    pub quantity: Option<Decimal>,
    /// New price, if supplied.
    pub price: Option<Decimal>,
}

/// Outcome of a `Store::advance_status` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The conditional update matched and committed.
    Advanced,
    /// The row was already at the target status; treated as success.
    AlreadyDone,
}

/// One allocation leg of a freshly created deal, pre-validated and
/// pre-rounded by the caller (C4/C5); `Store::create_deal` persists it
/// alongside its own allocation-level pending trade.
#[derive(Debug, Clone)]
pub struct NewDealAllocation {
    /// Receiving portfolio.
    pub portfolio_id: PortfolioId,
    /// Signed quantity.
    pub quantity: Decimal,
    /// Whether this leg absorbs the block/allocation-sum residual.
    pub is_rounding_adjustment: bool,
    /// Portfolio's reporting currency, carried onto the allocation's pending
    /// trade.
    pub report_currency: String,
    /// This leg's share of the block amount, in quote currency.
    pub qc_gross_amount: Decimal,
    /// This leg's share of the block amount, in report currency.
    pub rc_gross_amount: Decimal,
}

/// Input to `Store::create_deal`: a new block plus its allocations, with all
/// amounts already computed (C1's residual rule already applied).
#[derive(Debug, Clone)]
pub struct NewDeal {
    /// Traded instrument.
    pub instrument_id: InstrumentId,
    /// Trade date.
    pub trade_date: NaiveDate,
    /// Optional contractual settle date.
    pub settle_date: Option<NaiveDate>,
    /// Currency the block was traded in.
    pub quote_currency: String,
    /// Reporting currency carried onto the block-level pending trade
    /// (identity when the block has no single owning portfolio).
    pub report_currency: String,
    /// Signed total quantity.
    pub total_quantity: Decimal,
    /// Trade price.
    pub price: Decimal,
    /// Block's gross amount in quote currency.
    pub qc_gross_amount: Decimal,
    /// Block's gross amount in report currency.
    pub rc_gross_amount: Decimal,
    /// Allocation legs, in the order they should be persisted.
    pub allocations: Vec<NewDealAllocation>,
}

/// Result of `Store::create_deal`.
#[derive(Debug, Clone)]
pub struct DealCreationResult {
    /// The persisted block.
    pub block: DealBlock,
    /// The block-level pending trade.
    pub block_trade: PendingTrade,
    /// Each allocation paired with its allocation-level pending trade, in
    /// input order.
    pub allocations: Vec<(DealAllocation, PendingTrade)>,
}

/// One leg of a deal adjustment plan (C5): a reversal or replacement
/// allocation to persist alongside the target allocation-lifecycle state.
#[derive(Debug, Clone)]
pub struct DealPlanLeg {
    /// Affected portfolio.
    pub portfolio_id: PortfolioId,
    /// Signed quantity of this leg.
    pub quantity: Decimal,
    /// Deal-plan classification for the resulting pending trade.
    pub source_system: Option<crate::model::SourceSystem>,
    /// Lifecycle the persisted `DealAllocation` row should carry.
    pub allocation_lifecycle: Lifecycle,
    /// Whether this leg absorbs the plan's rounding residual.
    pub is_rounding_adjustment: bool,
    /// This leg's share of the plan amount, in quote currency.
    pub qc_gross_amount: Decimal,
    /// Portfolio's reporting currency.
    pub report_currency: String,
    /// This leg's share of the plan amount, in report currency.
    pub rc_gross_amount: Decimal,
}

/// Input to `Store::apply_deal_adjustment` (C5 modify/delete): the current
/// active allocations are always marked deleted first; `legs` are then
/// persisted as new allocation + pending-trade rows.
#[derive(Debug, Clone)]
pub struct DealAdjustmentPlan {
    /// Block being adjusted.
    pub deal_block_id: DealBlockId,
    /// Traded instrument (mirrors the block's).
    pub instrument_id: InstrumentId,
    /// Trade date (mirrors the block's).
    pub trade_date: NaiveDate,
    /// Optional settle date (mirrors the block's).
    pub settle_date: Option<NaiveDate>,
    /// Quote currency (mirrors the block's).
    pub quote_currency: String,
    /// Trade price (mirrors the block's).
    pub price: Decimal,
    /// Net quantity delta applied to the block's own `quantity` field.
    pub block_delta_quantity: Decimal,
    /// Block-level pending trade's gross amount, over the plan's absolute
    /// deltas.
    pub block_amount_qc: Decimal,
    /// The block's `quantity` after this adjustment (target total for
    /// modify; zero for delete).
    pub new_block_quantity: Decimal,
    /// Whether the block itself should be marked `lifecycle = deleted`.
    pub mark_block_deleted: bool,
    /// Reversal/replacement legs, in the order they should be persisted.
    pub legs: Vec<DealPlanLeg>,
}

/// Result of `Store::apply_deal_adjustment`.
#[derive(Debug, Clone)]
pub struct DealAdjustmentResult {
    /// The block-level pending trade created for this adjustment.
    pub block_trade: PendingTrade,
    /// Each leg paired with its allocation-level pending trade, in input
    /// order.
    pub legs: Vec<(DealAllocation, PendingTrade)>,
}

/// Key identifying a NAV run slot for insert-or-return-existing dedup.
#[derive(Debug, Clone)]
pub enum NavRunKey {
    /// IBOR: keyed by precise instant.
    Ibor {
        /// Portfolio being valued.
        portfolio_id: PortfolioId,
        /// Run type (`Realtime` or `Snapshot`).
        run_type: RunType,
        /// Valuation instant.
        asof_ts: DateTime<Utc>,
    },
    /// ABOR: keyed by calendar date.
    Abor {
        /// Portfolio being valued.
        portfolio_id: PortfolioId,
        /// Valuation date.
        asof_date: NaiveDate,
    },
}

/// Persistence operations needed by every layer above the store. All
/// methods that mutate more than one row document the transactional
/// boundary they require in their doc comment.
#[async_trait]
pub trait Store: Send + Sync {
    // -- Idempotency (C2) ---------------------------------------------
    /// Return a previously cached response for `(scope, key)`, if any.
    async fn idempotency_get_response(
        &self,
        scope: &str,
        key: &str,
    ) -> Result<Option<Value>, CoreError>;

    /// Attempt to atomically claim `(scope, key)`. Returns `true` iff this
    /// call inserted the row.
    async fn idempotency_claim(
        &self,
        scope: &str,
        key: &str,
        request_hash: &str,
    ) -> Result<bool, CoreError>;

    /// Upsert the cached response for `(scope, key)`.
    async fn idempotency_store_response(
        &self,
        scope: &str,
        key: &str,
        response: Value,
    ) -> Result<(), CoreError>;

    // -- State machine (C3) --------------------------------------------
    /// Conditionally update `status` from `from` to `to`, requiring
    /// `lifecycle = active`. See C3 for the full re-read/classify contract.
    async fn advance_status(
        &self,
        id: PendingTradeId,
        from: Status,
        to: Status,
    ) -> Result<AdvanceOutcome, CoreError>;

    // -- Portfolios / instruments ---------------------------------------
    /// Look up a portfolio by id.
    async fn get_portfolio(&self, id: PortfolioId) -> Result<Option<Portfolio>, CoreError>;

    /// Look up an instrument by id.
    async fn get_instrument(&self, id: InstrumentId) -> Result<Option<Instrument>, CoreError>;

    /// Find or auto-provision the cash instrument for `currency`.
    async fn ensure_cash_instrument(&self, currency: &str) -> Result<Instrument, CoreError>;

    // -- Pending trades (C4) ---------------------------------------------
    /// Insert a new pending trade row, returning it with its assigned id.
    async fn insert_pending_trade(&self, trade: PendingTrade) -> Result<PendingTrade, CoreError>;

    /// Look up a pending trade by id.
    async fn get_pending_trade(
        &self,
        id: PendingTradeId,
    ) -> Result<Option<PendingTrade>, CoreError>;

    /// List the pending trades belonging to a deal block, any lifecycle.
    async fn list_pending_trades_for_block(
        &self,
        deal_block_id: DealBlockId,
    ) -> Result<Vec<PendingTrade>, CoreError>;

    /// Apply a patch to an editable pending trade and append the
    /// corresponding audit row, in one transaction.
    async fn patch_pending_trade(
        &self,
        id: PendingTradeId,
        patch: PendingTradePatch,
        actor: Option<String>,
        reason: Option<String>,
    ) -> Result<PendingTrade, CoreError>;

    // -- Deal blocks / allocations (C5) -----------------------------------
    /// Insert a new deal block.
    async fn insert_deal_block(&self, block: DealBlock) -> Result<DealBlock, CoreError>;

    /// Look up a deal block by id.
    async fn get_deal_block(&self, id: DealBlockId) -> Result<Option<DealBlock>, CoreError>;

    /// Replace a deal block's persisted fields (quantity, lifecycle, ...).
    async fn update_deal_block(&self, block: DealBlock) -> Result<(), CoreError>;

    /// Insert a new deal allocation.
    async fn insert_deal_allocation(
        &self,
        allocation: DealAllocation,
    ) -> Result<DealAllocation, CoreError>;

    /// List the active allocations under a block.
    async fn list_active_allocations(
        &self,
        block_id: DealBlockId,
    ) -> Result<Vec<DealAllocation>, CoreError>;

    /// Mark every active allocation under a block as deleted, in one
    /// statement/transaction.
    async fn mark_allocations_deleted(&self, block_id: DealBlockId) -> Result<(), CoreError>;

    /// Insert a new deal block, its block-level pending trade, and every
    /// allocation leg with its own pending trade, in one transaction.
    async fn create_deal(&self, deal: NewDeal) -> Result<DealCreationResult, CoreError>;

    /// Mark the block's current active allocations deleted, then persist the
    /// adjustment plan's block-level pending trade and each leg's allocation
    /// + pending trade, and update the block's own row, all in one
    /// transaction.
    async fn apply_deal_adjustment(
        &self,
        plan: DealAdjustmentPlan,
    ) -> Result<DealAdjustmentResult, CoreError>;

    // -- Journal (C7) ------------------------------------------------------
    /// Insert a journal entry header and its lines in one transaction,
    /// returning the assigned entry id.
    async fn insert_journal_entry(
        &self,
        entry: JournalEntry,
        lines: Vec<JournalEntryLine>,
    ) -> Result<JournalEntryId, CoreError>;

    /// Find the most recent `Normal`-role journal entry for a deal block,
    /// used to populate `reversal_of`/`replacement_of`.
    async fn find_latest_normal_entry_for_block(
        &self,
        deal_block_id: DealBlockId,
    ) -> Result<Option<JournalEntry>, CoreError>;

    // -- Positions (C8) ------------------------------------------------------
    /// Upsert `position_current`: add `delta_quantity` to the existing
    /// quantity (or set it, on first write), refresh `cost_basis_rc` and
    /// `last_journal_entry_id`, and rotate `version_uuid`.
    async fn upsert_position_current(
        &self,
        portfolio_id: PortfolioId,
        instrument_id: InstrumentId,
        delta_quantity: Decimal,
        cost_basis_rc: Option<Decimal>,
        last_journal_entry_id: JournalEntryId,
    ) -> Result<PositionCurrent, CoreError>;

    /// Look up a single live position.
    async fn get_position_current(
        &self,
        portfolio_id: PortfolioId,
        instrument_id: InstrumentId,
    ) -> Result<Option<PositionCurrent>, CoreError>;

    /// List every live, nonzero position for a portfolio.
    async fn list_positions_current(
        &self,
        portfolio_id: PortfolioId,
    ) -> Result<Vec<PositionCurrent>, CoreError>;

    /// List every portfolio holding a nonzero live position in an
    /// instrument, used by the CA engine.
    async fn list_holders_of_instrument(
        &self,
        instrument_id: InstrumentId,
    ) -> Result<Vec<PositionCurrent>, CoreError>;

    /// Upsert the EOD snapshot for every live position of a portfolio as of
    /// `asof_date`.
    async fn snapshot_eod(
        &self,
        portfolio_id: PortfolioId,
        asof_date: NaiveDate,
    ) -> Result<Vec<PositionSnapshotEod>, CoreError>;

    /// List EOD snapshot rows for a portfolio as of a date.
    async fn list_position_snapshot_eod(
        &self,
        portfolio_id: PortfolioId,
        asof_date: NaiveDate,
    ) -> Result<Vec<PositionSnapshotEod>, CoreError>;

    // -- Market data (C9) ----------------------------------------------------
    /// Most recent price with `asof_ts <= given`, any date, any `is_eod`.
    async fn latest_market_price(
        &self,
        instrument_id: InstrumentId,
        asof_ts: DateTime<Utc>,
    ) -> Result<Option<MarketPrice>, CoreError>;

    /// The official EOD price for an instrument on a specific date.
    async fn eod_market_price(
        &self,
        instrument_id: InstrumentId,
        asof_date: NaiveDate,
    ) -> Result<Option<MarketPrice>, CoreError>;

    /// Most recent FX rate with `asof_ts <= given`, any `is_eod`.
    async fn latest_fx_rate(
        &self,
        base_ccy: &str,
        quote_ccy: &str,
        asof_ts: DateTime<Utc>,
    ) -> Result<Option<crate::model::FxRate>, CoreError>;

    /// Most recent EOD FX rate with `asof_ts <= given`.
    async fn eod_fx_rate(
        &self,
        base_ccy: &str,
        quote_ccy: &str,
        asof_ts: DateTime<Utc>,
    ) -> Result<Option<crate::model::FxRate>, CoreError>;

    // -- NAV runs (C9) ---------------------------------------------------------
    /// Insert a new `running` NAV run header for `key`, or return the id of
    /// an existing one for the same dedup key.
    async fn insert_or_get_nav_run(&self, key: NavRunKey) -> Result<(NavRunId, bool), CoreError>;

    /// Persist the result and line items for a run, then flip it to
    /// `Completed`, in one transaction.
    async fn complete_nav_run(
        &self,
        run_id: NavRunId,
        result: NavResult,
        line_items: Vec<NavLineItem>,
    ) -> Result<(), CoreError>;

    /// Fetch a persisted NAV result and its line items.
    async fn get_nav_result(
        &self,
        run_id: NavRunId,
    ) -> Result<Option<(NavRun, NavResult, Vec<NavLineItem>)>, CoreError>;

    /// Look up a completed ABOR run by `(portfolio_id, asof_date)`.
    async fn get_abor_run_by_date(
        &self,
        portfolio_id: PortfolioId,
        asof_date: NaiveDate,
    ) -> Result<Option<NavRun>, CoreError>;

    // -- Corporate actions (C10) ----------------------------------------------
    /// Insert a new corporate-action event.
    async fn insert_ca_event(&self, event: CaEvent) -> Result<CaEvent, CoreError>;

    /// Look up a corporate-action event by id.
    async fn get_ca_event(&self, id: CaEventId) -> Result<Option<CaEvent>, CoreError>;

    /// Flip a corporate-action event's status.
    async fn set_ca_event_status(
        &self,
        id: CaEventId,
        status: CaEventStatus,
    ) -> Result<(), CoreError>;

    /// Upsert a portfolio's election on an event.
    async fn upsert_ca_election(&self, election: CaElection) -> Result<(), CoreError>;

    /// Look up a portfolio's election on an event.
    async fn get_ca_election(
        &self,
        event_id: CaEventId,
        portfolio_id: PortfolioId,
    ) -> Result<Option<CaElection>, CoreError>;

    /// Look up a per-portfolio election-requirement override.
    async fn get_ca_portfolio_rule(
        &self,
        portfolio_id: PortfolioId,
        ca_type: CaType,
    ) -> Result<Option<CaPortfolioRule>, CoreError>;

    /// Attempt to claim the per-holder effect slot. Returns `true` iff this
    /// call inserted the row.
    async fn claim_ca_effect(
        &self,
        event_id: CaEventId,
        portfolio_id: PortfolioId,
    ) -> Result<bool, CoreError>;

    /// Record the outcome of a claimed per-holder effect.
    async fn update_ca_effect(&self, effect: CaEffect) -> Result<(), CoreError>;

    /// Look up the portfolio's lifecycle designation, used to recognise the
    /// `Lifecycle::Active` prerequisite without loading an entire row.
    async fn lifecycle_of(&self, id: PendingTradeId) -> Result<Option<Lifecycle>, CoreError>;
}
