//! In-memory fake `Store`, used by the scenario test suite so tests run fast
//! and without a live Postgres instance — mirroring the original
//! implementation's `conftest.py` fixtures.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{
    CaEffect, CaElection, CaEvent, CaEventId, CaEventStatus, CaPortfolioRule, CaType, DealAllocation,
    DealAllocationId, DealBlock, DealBlockId, FxRate, Instrument, InstrumentId, InstrumentType,
    JournalEntry, JournalEntryId, JournalEntryLine, Lifecycle, MarketPrice, NavLineItem, NavResult,
    NavRun, NavRunId, NavRunStatus, PendingTrade, PendingTradeChange, PendingTradeId, Portfolio,
    PortfolioId, PositionCurrent, PositionSnapshotEod, RunType, Status,
};
use crate::store::{
    AdvanceOutcome, DealAdjustmentPlan, DealAdjustmentResult, DealCreationResult, NavRunKey, NewDeal,
    PendingTradePatch, Store,
};

#[derive(Default)]
struct NextIds {
    pending_trade: i64,
    deal_block: i64,
    deal_allocation: i64,
    journal_entry: i64,
    nav_run: i64,
    ca_event: i64,
}

#[derive(Default)]
struct State {
    next: NextIds,
    portfolios: HashMap<PortfolioId, Portfolio>,
    instruments: HashMap<InstrumentId, Instrument>,
    next_instrument_id: i64,
    pending_trades: HashMap<PendingTradeId, PendingTrade>,
    pending_trade_changes: Vec<PendingTradeChange>,
    deal_blocks: HashMap<DealBlockId, DealBlock>,
    deal_allocations: HashMap<DealAllocationId, DealAllocation>,
    journal_entries: HashMap<JournalEntryId, JournalEntry>,
    journal_lines: HashMap<JournalEntryId, Vec<JournalEntryLine>>,
    positions_current: HashMap<(PortfolioId, InstrumentId), PositionCurrent>,
    positions_snapshot_eod: HashMap<(NaiveDate, PortfolioId, InstrumentId), PositionSnapshotEod>,
    market_prices: Vec<MarketPrice>,
    fx_rates: Vec<FxRate>,
    nav_runs: HashMap<NavRunId, NavRun>,
    nav_results: HashMap<NavRunId, NavResult>,
    nav_line_items: HashMap<NavRunId, Vec<NavLineItem>>,
    ca_events: HashMap<CaEventId, CaEvent>,
    ca_elections: HashMap<(CaEventId, PortfolioId), CaElection>,
    ca_portfolio_rules: HashMap<(PortfolioId, CaType), CaPortfolioRule>,
    ca_effects: HashMap<(CaEventId, PortfolioId), CaEffect>,
    idempotency: HashMap<(String, String), (Option<String>, Option<Value>)>,
}

/// An in-memory `Store` implementation backed by a single mutex-guarded
/// state struct. Not for production use.
pub struct MemoryStore {
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Test/seed helper: register a portfolio.
    pub fn seed_portfolio(&self, portfolio: Portfolio) {
        let mut state = self.state.lock().unwrap();
        state.portfolios.insert(portfolio.id, portfolio);
    }

    /// Test/seed helper: register an instrument.
    pub fn seed_instrument(&self, instrument: Instrument) {
        let mut state = self.state.lock().unwrap();
        if instrument.id.value() >= state.next_instrument_id {
            state.next_instrument_id = instrument.id.value() + 1;
        }
        state.instruments.insert(instrument.id, instrument);
    }

    /// Test/seed helper: register a market price observation.
    pub fn seed_market_price(&self, price: MarketPrice) {
        let mut state = self.state.lock().unwrap();
        state.market_prices.push(price);
    }

    /// Test/seed helper: register an FX rate observation.
    pub fn seed_fx_rate(&self, rate: FxRate) {
        let mut state = self.state.lock().unwrap();
        state.fx_rates.push(rate);
    }

    /// Test/seed helper: register a corporate-action portfolio rule.
    pub fn seed_ca_portfolio_rule(&self, rule: CaPortfolioRule) {
        let mut state = self.state.lock().unwrap();
        state
            .ca_portfolio_rules
            .insert((rule.portfolio_id, rule.ca_type), rule);
    }

    /// Test/seed helper: register a CA election ahead of processing.
    pub fn seed_ca_election(&self, election: CaElection) {
        let mut state = self.state.lock().unwrap();
        state
            .ca_elections
            .insert((election.ca_event_id, election.portfolio_id), election);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn idempotency_get_response(
        &self,
        scope: &str,
        key: &str,
    ) -> Result<Option<Value>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .idempotency
            .get(&(scope.to_string(), key.to_string()))
            .and_then(|(_, response)| response.clone()))
    }

    async fn idempotency_claim(
        &self,
        scope: &str,
        key: &str,
        request_hash: &str,
    ) -> Result<bool, CoreError> {
        let mut state = self.state.lock().unwrap();
        let entry_key = (scope.to_string(), key.to_string());
        if state.idempotency.contains_key(&entry_key) {
            return Ok(false);
        }
        state
            .idempotency
            .insert(entry_key, (Some(request_hash.to_string()), None));
        Ok(true)
    }

    async fn idempotency_store_response(
        &self,
        scope: &str,
        key: &str,
        response: Value,
    ) -> Result<(), CoreError> {
        let mut state = self.state.lock().unwrap();
        let entry_key = (scope.to_string(), key.to_string());
        let entry = state
            .idempotency
            .entry(entry_key)
            .or_insert((None, None));
        entry.1 = Some(response);
        Ok(())
    }

    async fn advance_status(
        &self,
        id: PendingTradeId,
        from: Status,
        to: Status,
    ) -> Result<AdvanceOutcome, CoreError> {
        let mut state = self.state.lock().unwrap();
        let trade = state
            .pending_trades
            .get_mut(&id)
            .ok_or(CoreError::NotFound("staging_not_found"))?;

        if trade.lifecycle != Lifecycle::Active {
            return Err(CoreError::LifecycleNotActive);
        }
        if trade.status == to {
            return Ok(AdvanceOutcome::AlreadyDone);
        }
        if trade.status != from {
            return Err(CoreError::StatusMismatch {
                expected: status_label(from),
                found: status_label(trade.status).to_string(),
            });
        }

        trade.status = to;
        trade.entry_version += 1;
        Ok(AdvanceOutcome::Advanced)
    }

    async fn get_portfolio(&self, id: PortfolioId) -> Result<Option<Portfolio>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.portfolios.get(&id).cloned())
    }

    async fn get_instrument(&self, id: InstrumentId) -> Result<Option<Instrument>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.instruments.get(&id).cloned())
    }

    async fn ensure_cash_instrument(&self, currency: &str) -> Result<Instrument, CoreError> {
        let mut state = self.state.lock().unwrap();
        let security_id = Instrument::cash_security_id(currency);
        if let Some(existing) = state
            .instruments
            .values()
            .find(|i| i.security_id == security_id)
        {
            return Ok(existing.clone());
        }
        let id = InstrumentId(state.next_instrument_id);
        state.next_instrument_id += 1;
        let instrument = Instrument {
            id,
            instrument_type: InstrumentType::Cash,
            quote_currency: currency.to_string(),
            security_id,
            subtype: None,
        };
        state.instruments.insert(id, instrument.clone());
        Ok(instrument)
    }

    async fn insert_pending_trade(&self, mut trade: PendingTrade) -> Result<PendingTrade, CoreError> {
        let mut state = self.state.lock().unwrap();
        state.next.pending_trade += 1;
        trade.id = PendingTradeId(state.next.pending_trade);
        state.pending_trades.insert(trade.id, trade.clone());
        Ok(trade)
    }

    async fn get_pending_trade(
        &self,
        id: PendingTradeId,
    ) -> Result<Option<PendingTrade>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.pending_trades.get(&id).cloned())
    }

    async fn list_pending_trades_for_block(
        &self,
        deal_block_id: DealBlockId,
    ) -> Result<Vec<PendingTrade>, CoreError> {
        let state = self.state.lock().unwrap();
        let mut trades: Vec<PendingTrade> = state
            .pending_trades
            .values()
            .filter(|t| t.deal_block_id == Some(deal_block_id))
            .cloned()
            .collect();
        trades.sort_by_key(|t| t.id);
        Ok(trades)
    }

    async fn patch_pending_trade(
        &self,
        id: PendingTradeId,
        patch: PendingTradePatch,
        actor: Option<String>,
        reason: Option<String>,
    ) -> Result<PendingTrade, CoreError> {
        let mut state = self.state.lock().unwrap();
        let trade = state
            .pending_trades
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound("staging_not_found"))?;

        if trade.status != Status::Entry || trade.lifecycle != Lifecycle::Active {
            return Err(CoreError::LifecycleNotActive);
        }

        let old_row = serde_json::json!({
            "trade_date": trade.trade_date,
            "settle_date": trade.settle_date,
            "quantity": trade.quantity,
            "price": trade.price,
            "entry_version": trade.entry_version,
        });

        let mut updated = trade.clone();
        if let Some(trade_date) = patch.trade_date {
            updated.trade_date = trade_date;
        }
        if let Some(settle_date) = patch.settle_date {
            updated.settle_date = settle_date;
        }
        if let Some(quantity) = patch.quantity {
            updated.quantity = quantity;
        }
        if let Some(price) = patch.price {
            updated.price = price;
        }
        updated.entry_version += 1;

        let new_row = serde_json::json!({
            "trade_date": updated.trade_date,
            "settle_date": updated.settle_date,
            "quantity": updated.quantity,
            "price": updated.price,
            "entry_version": updated.entry_version,
        });

        state.pending_trades.insert(id, updated.clone());
        state.pending_trade_changes.push(PendingTradeChange {
            pending_trade_id: id,
            changed_at: now_utc(),
            actor,
            reason,
            old_row,
            new_row,
        });

        Ok(updated)
    }

    async fn insert_deal_block(&self, mut block: DealBlock) -> Result<DealBlock, CoreError> {
        let mut state = self.state.lock().unwrap();
        state.next.deal_block += 1;
        block.id = DealBlockId(state.next.deal_block);
        state.deal_blocks.insert(block.id, block.clone());
        Ok(block)
    }

    async fn get_deal_block(&self, id: DealBlockId) -> Result<Option<DealBlock>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.deal_blocks.get(&id).cloned())
    }

    async fn update_deal_block(&self, block: DealBlock) -> Result<(), CoreError> {
        let mut state = self.state.lock().unwrap();
        state.deal_blocks.insert(block.id, block);
        Ok(())
    }

    async fn insert_deal_allocation(
        &self,
        mut allocation: DealAllocation,
    ) -> Result<DealAllocation, CoreError> {
        let mut state = self.state.lock().unwrap();
        state.next.deal_allocation += 1;
        allocation.id = DealAllocationId(state.next.deal_allocation);
        state
            .deal_allocations
            .insert(allocation.id, allocation.clone());
        Ok(allocation)
    }

    async fn list_active_allocations(
        &self,
        block_id: DealBlockId,
    ) -> Result<Vec<DealAllocation>, CoreError> {
        let state = self.state.lock().unwrap();
        let mut allocations: Vec<DealAllocation> = state
            .deal_allocations
            .values()
            .filter(|a| a.block_id == block_id && a.lifecycle == Lifecycle::Active)
            .cloned()
            .collect();
        allocations.sort_by_key(|a| a.portfolio_id);
        Ok(allocations)
    }

    async fn mark_allocations_deleted(&self, block_id: DealBlockId) -> Result<(), CoreError> {
        let mut state = self.state.lock().unwrap();
        for allocation in state.deal_allocations.values_mut() {
            if allocation.block_id == block_id && allocation.lifecycle == Lifecycle::Active {
                allocation.lifecycle = Lifecycle::Deleted;
            }
        }
        Ok(())
    }

    async fn create_deal(&self, deal: NewDeal) -> Result<DealCreationResult, CoreError> {
        let mut state = self.state.lock().unwrap();

        state.next.deal_block += 1;
        let block_id = DealBlockId(state.next.deal_block);
        let block = DealBlock {
            id: block_id,
            instrument_id: deal.instrument_id,
            trade_date: deal.trade_date,
            settle_date: deal.settle_date,
            trade_currency: deal.quote_currency.clone(),
            total_quantity: deal.total_quantity,
            price: deal.price,
            lifecycle: Lifecycle::Active,
        };
        state.deal_blocks.insert(block_id, block.clone());

        state.next.pending_trade += 1;
        let block_trade = PendingTrade {
            id: PendingTradeId(state.next.pending_trade),
            level: crate::model::Level::Block,
            deal_block_id: Some(block_id),
            deal_allocation_id: None,
            portfolio_id: None,
            instrument_id: deal.instrument_id,
            trade_date: deal.trade_date,
            settle_date: deal.settle_date,
            quantity: deal.total_quantity,
            price: deal.price,
            quote_currency: deal.quote_currency.clone(),
            report_currency: deal.report_currency,
            qc_gross_amount: deal.qc_gross_amount,
            rc_gross_amount: deal.rc_gross_amount,
            status: Status::Entry,
            lifecycle: Lifecycle::Active,
            entry_version: 0,
            source_system: None,
        };
        state
            .pending_trades
            .insert(block_trade.id, block_trade.clone());

        let mut allocations = Vec::with_capacity(deal.allocations.len());
        for leg in deal.allocations {
            state.next.deal_allocation += 1;
            let allocation = DealAllocation {
                id: DealAllocationId(state.next.deal_allocation),
                block_id,
                portfolio_id: leg.portfolio_id,
                quantity: leg.quantity,
                price: deal.price,
                is_rounding_adjustment: leg.is_rounding_adjustment,
                lifecycle: Lifecycle::Active,
            };
            state
                .deal_allocations
                .insert(allocation.id, allocation.clone());

            state.next.pending_trade += 1;
            let trade = PendingTrade {
                id: PendingTradeId(state.next.pending_trade),
                level: crate::model::Level::Allocation,
                deal_block_id: Some(block_id),
                deal_allocation_id: Some(allocation.id),
                portfolio_id: Some(leg.portfolio_id),
                instrument_id: deal.instrument_id,
                trade_date: deal.trade_date,
                settle_date: deal.settle_date,
                quantity: leg.quantity,
                price: deal.price,
                quote_currency: deal.quote_currency.clone(),
                report_currency: leg.report_currency,
                qc_gross_amount: leg.qc_gross_amount,
                rc_gross_amount: leg.rc_gross_amount,
                status: Status::Entry,
                lifecycle: Lifecycle::Active,
                entry_version: 0,
                source_system: None,
            };
            state.pending_trades.insert(trade.id, trade.clone());
            allocations.push((allocation, trade));
        }

        Ok(DealCreationResult {
            block,
            block_trade,
            allocations,
        })
    }

    async fn apply_deal_adjustment(
        &self,
        plan: DealAdjustmentPlan,
    ) -> Result<DealAdjustmentResult, CoreError> {
        let mut state = self.state.lock().unwrap();

        for allocation in state.deal_allocations.values_mut() {
            if allocation.block_id == plan.deal_block_id && allocation.lifecycle == Lifecycle::Active
            {
                allocation.lifecycle = Lifecycle::Deleted;
            }
        }

        state.next.pending_trade += 1;
        let block_trade = PendingTrade {
            id: PendingTradeId(state.next.pending_trade),
            level: crate::model::Level::Block,
            deal_block_id: Some(plan.deal_block_id),
            deal_allocation_id: None,
            portfolio_id: None,
            instrument_id: plan.instrument_id,
            trade_date: plan.trade_date,
            settle_date: plan.settle_date,
            quantity: plan.block_delta_quantity,
            price: plan.price,
            quote_currency: plan.quote_currency.clone(),
            report_currency: plan.quote_currency.clone(),
            qc_gross_amount: plan.block_amount_qc,
            rc_gross_amount: plan.block_amount_qc,
            status: Status::Entry,
            lifecycle: Lifecycle::Active,
            entry_version: 0,
            source_system: None,
        };
        state
            .pending_trades
            .insert(block_trade.id, block_trade.clone());

        let mut legs = Vec::with_capacity(plan.legs.len());
        for leg in plan.legs {
            state.next.deal_allocation += 1;
            let allocation = DealAllocation {
                id: DealAllocationId(state.next.deal_allocation),
                block_id: plan.deal_block_id,
                portfolio_id: leg.portfolio_id,
                quantity: leg.quantity,
                price: plan.price,
                is_rounding_adjustment: leg.is_rounding_adjustment,
                lifecycle: leg.allocation_lifecycle,
            };
            state
                .deal_allocations
                .insert(allocation.id, allocation.clone());

            state.next.pending_trade += 1;
            let trade = PendingTrade {
                id: PendingTradeId(state.next.pending_trade),
                level: crate::model::Level::Allocation,
                deal_block_id: Some(plan.deal_block_id),
                deal_allocation_id: Some(allocation.id),
                portfolio_id: Some(leg.portfolio_id),
                instrument_id: plan.instrument_id,
                trade_date: plan.trade_date,
                settle_date: plan.settle_date,
                quantity: leg.quantity,
                price: plan.price,
                quote_currency: plan.quote_currency.clone(),
                report_currency: leg.report_currency,
                qc_gross_amount: leg.qc_gross_amount,
                rc_gross_amount: leg.rc_gross_amount,
                status: Status::Entry,
                lifecycle: Lifecycle::Active,
                entry_version: 0,
                source_system: leg.source_system,
            };
            state.pending_trades.insert(trade.id, trade.clone());
            legs.push((allocation, trade));
        }

        if let Some(block) = state.deal_blocks.get_mut(&plan.deal_block_id) {
            block.total_quantity = plan.new_block_quantity;
            if plan.mark_block_deleted {
                block.lifecycle = Lifecycle::Deleted;
            }
        }

        Ok(DealAdjustmentResult { block_trade, legs })
    }

    async fn insert_journal_entry(
        &self,
        mut entry: JournalEntry,
        lines: Vec<JournalEntryLine>,
    ) -> Result<JournalEntryId, CoreError> {
        let mut state = self.state.lock().unwrap();
        state.next.journal_entry += 1;
        entry.id = JournalEntryId(state.next.journal_entry);
        let id = entry.id;
        let lines = lines
            .into_iter()
            .map(|mut l| {
                l.entry_id = id;
                l
            })
            .collect();
        state.journal_entries.insert(id, entry);
        state.journal_lines.insert(id, lines);
        Ok(id)
    }

    async fn find_latest_normal_entry_for_block(
        &self,
        deal_block_id: DealBlockId,
    ) -> Result<Option<JournalEntry>, CoreError> {
        let state = self.state.lock().unwrap();
        let entry = state
            .journal_entries
            .values()
            .filter(|e| {
                e.deal_block_id == Some(deal_block_id)
                    && e.entry_role == crate::model::EntryRole::Normal
            })
            .max_by_key(|e| e.posted_at)
            .cloned();
        Ok(entry)
    }

    async fn upsert_position_current(
        &self,
        portfolio_id: PortfolioId,
        instrument_id: InstrumentId,
        delta_quantity: Decimal,
        cost_basis_rc: Option<Decimal>,
        last_journal_entry_id: JournalEntryId,
    ) -> Result<PositionCurrent, CoreError> {
        let mut state = self.state.lock().unwrap();
        let key = (portfolio_id, instrument_id);
        let updated = match state.positions_current.get(&key) {
            Some(existing) => PositionCurrent {
                portfolio_id,
                instrument_id,
                quantity: existing.quantity + delta_quantity,
                cost_basis_rc: cost_basis_rc.or(existing.cost_basis_rc),
                last_journal_entry_id,
                version_uuid: new_uuid(),
                updated_at: now_utc(),
            },
            None => PositionCurrent {
                portfolio_id,
                instrument_id,
                quantity: delta_quantity,
                cost_basis_rc,
                last_journal_entry_id,
                version_uuid: new_uuid(),
                updated_at: now_utc(),
            },
        };
        state.positions_current.insert(key, updated.clone());
        Ok(updated)
    }

    async fn get_position_current(
        &self,
        portfolio_id: PortfolioId,
        instrument_id: InstrumentId,
    ) -> Result<Option<PositionCurrent>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .positions_current
            .get(&(portfolio_id, instrument_id))
            .cloned())
    }

    async fn list_positions_current(
        &self,
        portfolio_id: PortfolioId,
    ) -> Result<Vec<PositionCurrent>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .positions_current
            .values()
            .filter(|p| p.portfolio_id == portfolio_id && !p.quantity.is_zero())
            .cloned()
            .collect())
    }

    async fn list_holders_of_instrument(
        &self,
        instrument_id: InstrumentId,
    ) -> Result<Vec<PositionCurrent>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .positions_current
            .values()
            .filter(|p| p.instrument_id == instrument_id && !p.quantity.is_zero())
            .cloned()
            .collect())
    }

    async fn snapshot_eod(
        &self,
        portfolio_id: PortfolioId,
        asof_date: NaiveDate,
    ) -> Result<Vec<PositionSnapshotEod>, CoreError> {
        let mut state = self.state.lock().unwrap();
        let live: Vec<PositionCurrent> = state
            .positions_current
            .values()
            .filter(|p| p.portfolio_id == portfolio_id)
            .cloned()
            .collect();

        let mut snapshots = Vec::with_capacity(live.len());
        for position in live {
            let snapshot = PositionSnapshotEod {
                asof_date,
                portfolio_id: position.portfolio_id,
                instrument_id: position.instrument_id,
                quantity: position.quantity,
                cost_basis_rc: position.cost_basis_rc,
                through_entry_id: position.last_journal_entry_id,
            };
            state.positions_snapshot_eod.insert(
                (asof_date, position.portfolio_id, position.instrument_id),
                snapshot.clone(),
            );
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    async fn list_position_snapshot_eod(
        &self,
        portfolio_id: PortfolioId,
        asof_date: NaiveDate,
    ) -> Result<Vec<PositionSnapshotEod>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .positions_snapshot_eod
            .values()
            .filter(|s| {
                s.portfolio_id == portfolio_id && s.asof_date == asof_date && !s.quantity.is_zero()
            })
            .cloned()
            .collect())
    }

    async fn latest_market_price(
        &self,
        instrument_id: InstrumentId,
        asof_ts: DateTime<Utc>,
    ) -> Result<Option<MarketPrice>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .market_prices
            .iter()
            .filter(|p| p.instrument_id == instrument_id && p.asof_ts <= asof_ts)
            .max_by_key(|p| p.asof_ts)
            .cloned())
    }

    async fn eod_market_price(
        &self,
        instrument_id: InstrumentId,
        asof_date: NaiveDate,
    ) -> Result<Option<MarketPrice>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .market_prices
            .iter()
            .find(|p| p.instrument_id == instrument_id && p.asof_date == asof_date && p.is_eod)
            .cloned())
    }

    async fn latest_fx_rate(
        &self,
        base_ccy: &str,
        quote_ccy: &str,
        asof_ts: DateTime<Utc>,
    ) -> Result<Option<FxRate>, CoreError> {
        let state = self.state.lock().unwrap();
        if base_ccy == quote_ccy {
            return Ok(Some(identity_fx_rate(base_ccy, asof_ts)));
        }
        Ok(state
            .fx_rates
            .iter()
            .filter(|r| r.base_ccy == base_ccy && r.quote_ccy == quote_ccy && r.asof_ts <= asof_ts)
            .max_by_key(|r| r.asof_ts)
            .cloned())
    }

    async fn eod_fx_rate(
        &self,
        base_ccy: &str,
        quote_ccy: &str,
        asof_ts: DateTime<Utc>,
    ) -> Result<Option<FxRate>, CoreError> {
        let state = self.state.lock().unwrap();
        if base_ccy == quote_ccy {
            return Ok(Some(identity_fx_rate(base_ccy, asof_ts)));
        }
        Ok(state
            .fx_rates
            .iter()
            .filter(|r| {
                r.base_ccy == base_ccy
                    && r.quote_ccy == quote_ccy
                    && r.is_eod
                    && r.asof_ts <= asof_ts
            })
            .max_by_key(|r| r.asof_ts)
            .cloned())
    }

    async fn insert_or_get_nav_run(&self, key: NavRunKey) -> Result<(NavRunId, bool), CoreError> {
        let mut state = self.state.lock().unwrap();
        let existing = match &key {
            NavRunKey::Ibor {
                portfolio_id,
                run_type,
                asof_ts,
            } => state.nav_runs.values().find(|r| {
                r.portfolio_id == *portfolio_id && r.run_type == *run_type && r.asof_ts == Some(*asof_ts)
            }),
            NavRunKey::Abor {
                portfolio_id,
                asof_date,
            } => state.nav_runs.values().find(|r| {
                r.portfolio_id == *portfolio_id
                    && r.run_type == RunType::Eod
                    && r.asof_date == Some(*asof_date)
            }),
        };
        if let Some(existing) = existing {
            return Ok((existing.id, false));
        }

        state.next.nav_run += 1;
        let id = NavRunId(state.next.nav_run);
        let run = match key {
            NavRunKey::Ibor {
                portfolio_id,
                run_type,
                asof_ts,
            } => NavRun {
                id,
                portfolio_id,
                run_type,
                asof_ts: Some(asof_ts),
                asof_date: None,
                status: NavRunStatus::Running,
                idempotency_scope: None,
                idempotency_key: None,
            },
            NavRunKey::Abor {
                portfolio_id,
                asof_date,
            } => NavRun {
                id,
                portfolio_id,
                run_type: RunType::Eod,
                asof_ts: None,
                asof_date: Some(asof_date),
                status: NavRunStatus::Running,
                idempotency_scope: None,
                idempotency_key: None,
            },
        };
        state.nav_runs.insert(id, run);
        Ok((id, true))
    }

    async fn complete_nav_run(
        &self,
        run_id: NavRunId,
        result: NavResult,
        line_items: Vec<NavLineItem>,
    ) -> Result<(), CoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(run) = state.nav_runs.get_mut(&run_id) {
            run.status = NavRunStatus::Completed;
        }
        state.nav_results.insert(run_id, result);
        state.nav_line_items.insert(run_id, line_items);
        Ok(())
    }

    async fn get_nav_result(
        &self,
        run_id: NavRunId,
    ) -> Result<Option<(NavRun, NavResult, Vec<NavLineItem>)>, CoreError> {
        let state = self.state.lock().unwrap();
        let run = match state.nav_runs.get(&run_id) {
            Some(r) => r.clone(),
            None => return Ok(None),
        };
        let result = match state.nav_results.get(&run_id) {
            Some(r) => r.clone(),
            None => return Ok(None),
        };
        let lines = state.nav_line_items.get(&run_id).cloned().unwrap_or_default();
        Ok(Some((run, result, lines)))
    }

    async fn get_abor_run_by_date(
        &self,
        portfolio_id: PortfolioId,
        asof_date: NaiveDate,
    ) -> Result<Option<NavRun>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .nav_runs
            .values()
            .find(|r| {
                r.portfolio_id == portfolio_id
                    && r.run_type == RunType::Eod
                    && r.asof_date == Some(asof_date)
                    && r.status == NavRunStatus::Completed
            })
            .cloned())
    }

    async fn insert_ca_event(&self, mut event: CaEvent) -> Result<CaEvent, CoreError> {
        let mut state = self.state.lock().unwrap();
        state.next.ca_event += 1;
        event.id = CaEventId(state.next.ca_event);
        state.ca_events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn get_ca_event(&self, id: CaEventId) -> Result<Option<CaEvent>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.ca_events.get(&id).cloned())
    }

    async fn set_ca_event_status(
        &self,
        id: CaEventId,
        status: CaEventStatus,
    ) -> Result<(), CoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(event) = state.ca_events.get_mut(&id) {
            event.status = status;
        }
        Ok(())
    }

    async fn upsert_ca_election(&self, election: CaElection) -> Result<(), CoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .ca_elections
            .insert((election.ca_event_id, election.portfolio_id), election);
        Ok(())
    }

    async fn get_ca_election(
        &self,
        event_id: CaEventId,
        portfolio_id: PortfolioId,
    ) -> Result<Option<CaElection>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.ca_elections.get(&(event_id, portfolio_id)).cloned())
    }

    async fn get_ca_portfolio_rule(
        &self,
        portfolio_id: PortfolioId,
        ca_type: CaType,
    ) -> Result<Option<CaPortfolioRule>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .ca_portfolio_rules
            .get(&(portfolio_id, ca_type))
            .cloned())
    }

    async fn claim_ca_effect(
        &self,
        event_id: CaEventId,
        portfolio_id: PortfolioId,
    ) -> Result<bool, CoreError> {
        let mut state = self.state.lock().unwrap();
        let key = (event_id, portfolio_id);
        if state.ca_effects.contains_key(&key) {
            return Ok(false);
        }
        state.ca_effects.insert(
            key,
            CaEffect {
                ca_event_id: event_id,
                portfolio_id,
                journal_entry_id: None,
                cash_amount: None,
                share_delta: None,
            },
        );
        Ok(true)
    }

    async fn update_ca_effect(&self, effect: CaEffect) -> Result<(), CoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .ca_effects
            .insert((effect.ca_event_id, effect.portfolio_id), effect);
        Ok(())
    }

    async fn lifecycle_of(&self, id: PendingTradeId) -> Result<Option<Lifecycle>, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.pending_trades.get(&id).map(|t| t.lifecycle))
    }
}

fn identity_fx_rate(ccy: &str, asof_ts: DateTime<Utc>) -> FxRate {
    FxRate {
        base_ccy: ccy.to_string(),
        quote_ccy: ccy.to_string(),
        asof_ts,
        rate: Decimal::ONE,
        is_eod: true,
        source_id: "identity".to_string(),
    }
}

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Entry => "entry",
        Status::PreCheck => "pre_check",
        Status::Position => "position",
        Status::Allocated => "allocated",
        Status::Settled => "settled",
    }
}

fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

fn new_uuid() -> Uuid {
    Uuid::new_v4()
}
