//! `sqlx`/Postgres-backed `Store` implementation.
//!
//! Queries are built with the runtime `sqlx::query`/`query_as` API (not the
//! `query!` compile-time macros) since no database is available at build
//! time in this workspace. Every multi-statement write path runs inside a
//! single `sqlx::Transaction`, per §5's atomicity requirements.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{
    CaEffect, CaElection, CaEvent, CaEventId, CaEventStatus, CaPortfolioRule, CaType, DealAllocation,
    DealAllocationId, DealBlock, DealBlockId, FxRate, Instrument, InstrumentId, InstrumentType,
    JournalEntry, JournalEntryId, JournalEntryLine, Lifecycle, MarketPrice, NavLineItem, NavResult,
    NavRun, NavRunId, NavRunStatus, PendingTrade, PendingTradeId, Portfolio, PortfolioId,
    PositionCurrent, PositionSnapshotEod, RunType, Status,
};
use crate::store::{
    AdvanceOutcome, DealAdjustmentPlan, DealAdjustmentResult, DealCreationResult, NavRunKey, NewDeal,
    PendingTradePatch, Store,
};

/// Production store: a pooled Postgres connection.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using a `DATABASE_URL`-style connection string.
    pub async fn connect(database_url: &str) -> Result<Self, CoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| CoreError::Store(e.to_string()))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn idempotency_get_response(
        &self,
        scope: &str,
        key: &str,
    ) -> Result<Option<Value>, CoreError> {
        let row = sqlx::query(
            "SELECT response FROM idempotency_record WHERE scope = $1 AND key = $2",
        )
        .bind(scope)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|r| r.get::<Option<Value>, _>("response")))
    }

    async fn idempotency_claim(
        &self,
        scope: &str,
        key: &str,
        request_hash: &str,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "INSERT INTO idempotency_record (scope, key, request_hash) VALUES ($1, $2, $3)
             ON CONFLICT (scope, key) DO NOTHING",
        )
        .bind(scope)
        .bind(key)
        .bind(request_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn idempotency_store_response(
        &self,
        scope: &str,
        key: &str,
        response: Value,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO idempotency_record (scope, key, response) VALUES ($1, $2, $3)
             ON CONFLICT (scope, key) DO UPDATE SET response = EXCLUDED.response",
        )
        .bind(scope)
        .bind(key)
        .bind(response)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn advance_status(
        &self,
        id: PendingTradeId,
        from: Status,
        to: Status,
    ) -> Result<AdvanceOutcome, CoreError> {
        let result = sqlx::query(
            "UPDATE pending_trade
             SET status = $1, entry_version = entry_version + 1
             WHERE id = $2 AND status = $3 AND lifecycle = 'active'",
        )
        .bind(status_label(to))
        .bind(id.value())
        .bind(status_label(from))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(AdvanceOutcome::Advanced);
        }

        let row = sqlx::query("SELECT status, lifecycle FROM pending_trade WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::NotFound("staging_not_found"))?;

        let lifecycle: String = row.get("lifecycle");
        if lifecycle != "active" {
            return Err(CoreError::LifecycleNotActive);
        }

        let current_status: String = row.get("status");
        if current_status == status_label(to) {
            return Ok(AdvanceOutcome::AlreadyDone);
        }

        Err(CoreError::StatusMismatch {
            expected: status_label(from),
            found: current_status,
        })
    }

    async fn get_portfolio(&self, id: PortfolioId) -> Result<Option<Portfolio>, CoreError> {
        let row = sqlx::query("SELECT id, report_currency FROM portfolio WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Portfolio {
            id: PortfolioId(r.get("id")),
            report_currency: r.get("report_currency"),
        }))
    }

    async fn get_instrument(&self, id: InstrumentId) -> Result<Option<Instrument>, CoreError> {
        let row = sqlx::query(
            "SELECT id, instrument_type, quote_currency, security_id, subtype
             FROM instrument WHERE id = $1",
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_instrument))
    }

    async fn ensure_cash_instrument(&self, currency: &str) -> Result<Instrument, CoreError> {
        let security_id = Instrument::cash_security_id(currency);

        if let Some(row) = sqlx::query(
            "SELECT id, instrument_type, quote_currency, security_id, subtype
             FROM instrument WHERE security_id = $1",
        )
        .bind(&security_id)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(row_to_instrument(row));
        }

        let row = sqlx::query(
            "INSERT INTO instrument (instrument_type, quote_currency, security_id, subtype)
             VALUES ('cash', $1, $2, NULL)
             ON CONFLICT (security_id) DO UPDATE SET security_id = EXCLUDED.security_id
             RETURNING id, instrument_type, quote_currency, security_id, subtype",
        )
        .bind(currency)
        .bind(&security_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_instrument(row))
    }

    async fn insert_pending_trade(&self, trade: PendingTrade) -> Result<PendingTrade, CoreError> {
        let row = sqlx::query(
            "INSERT INTO pending_trade
                (level, deal_block_id, deal_allocation_id, portfolio_id, instrument_id,
                 trade_date, settle_date, quantity, price, quote_currency, report_currency,
                 qc_gross_amount, rc_gross_amount, status, lifecycle, entry_version, source_system)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17)
             RETURNING id",
        )
        .bind(level_label(trade.level))
        .bind(trade.deal_block_id.map(|v| v.value()))
        .bind(trade.deal_allocation_id.map(|v| v.value()))
        .bind(trade.portfolio_id.map(|v| v.value()))
        .bind(trade.instrument_id.value())
        .bind(trade.trade_date)
        .bind(trade.settle_date)
        .bind(trade.quantity)
        .bind(trade.price)
        .bind(&trade.quote_currency)
        .bind(&trade.report_currency)
        .bind(trade.qc_gross_amount)
        .bind(trade.rc_gross_amount)
        .bind(status_label(trade.status))
        .bind(lifecycle_label(trade.lifecycle))
        .bind(trade.entry_version)
        .bind(trade.source_system.map(source_system_label))
        .fetch_one(&self.pool)
        .await?;

        Ok(PendingTrade {
            id: PendingTradeId(row.get("id")),
            ..trade
        })
    }

    async fn get_pending_trade(
        &self,
        id: PendingTradeId,
    ) -> Result<Option<PendingTrade>, CoreError> {
        let row = sqlx::query("SELECT * FROM pending_trade WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_pending_trade).transpose()
    }

    async fn list_pending_trades_for_block(
        &self,
        deal_block_id: DealBlockId,
    ) -> Result<Vec<PendingTrade>, CoreError> {
        let rows = sqlx::query("SELECT * FROM pending_trade WHERE deal_block_id = $1 ORDER BY id")
            .bind(deal_block_id.value())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_pending_trade).collect()
    }

    async fn patch_pending_trade(
        &self,
        id: PendingTradeId,
        patch: PendingTradePatch,
        actor: Option<String>,
        reason: Option<String>,
    ) -> Result<PendingTrade, CoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT * FROM pending_trade WHERE id = $1 AND status = 'entry' AND lifecycle = 'active' FOR UPDATE",
        )
        .bind(id.value())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(CoreError::LifecycleNotActive)?;

        let before = row_to_pending_trade(row)?;
        let old_row = serde_json::json!({
            "trade_date": before.trade_date,
            "settle_date": before.settle_date,
            "quantity": before.quantity,
            "price": before.price,
            "entry_version": before.entry_version,
        });

        let trade_date = patch.trade_date.unwrap_or(before.trade_date);
        let settle_date = patch.settle_date.unwrap_or(before.settle_date);
        let quantity = patch.quantity.unwrap_or(before.quantity);
        let price = patch.price.unwrap_or(before.price);

        let updated_row = sqlx::query(
            "UPDATE pending_trade
             SET trade_date = $1, settle_date = $2, quantity = $3, price = $4,
                 entry_version = entry_version + 1
             WHERE id = $5
             RETURNING *",
        )
        .bind(trade_date)
        .bind(settle_date)
        .bind(quantity)
        .bind(price)
        .bind(id.value())
        .fetch_one(&mut *tx)
        .await?;

        let updated = row_to_pending_trade(updated_row)?;
        let new_row = serde_json::json!({
            "trade_date": updated.trade_date,
            "settle_date": updated.settle_date,
            "quantity": updated.quantity,
            "price": updated.price,
            "entry_version": updated.entry_version,
        });

        sqlx::query(
            "INSERT INTO pending_trade_change (pending_trade_id, changed_at, actor, reason, old_row, new_row)
             VALUES ($1, now(), $2, $3, $4, $5)",
        )
        .bind(id.value())
        .bind(actor)
        .bind(reason)
        .bind(old_row)
        .bind(new_row)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn insert_deal_block(&self, block: DealBlock) -> Result<DealBlock, CoreError> {
        let row = sqlx::query(
            "INSERT INTO deal_block
                (instrument_id, trade_date, settle_date, trade_currency, total_quantity, price, lifecycle)
             VALUES ($1,$2,$3,$4,$5,$6,$7)
             RETURNING id",
        )
        .bind(block.instrument_id.value())
        .bind(block.trade_date)
        .bind(block.settle_date)
        .bind(&block.trade_currency)
        .bind(block.total_quantity)
        .bind(block.price)
        .bind(lifecycle_label(block.lifecycle))
        .fetch_one(&self.pool)
        .await?;

        Ok(DealBlock {
            id: DealBlockId(row.get("id")),
            ..block
        })
    }

    async fn get_deal_block(&self, id: DealBlockId) -> Result<Option<DealBlock>, CoreError> {
        let row = sqlx::query("SELECT * FROM deal_block WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_deal_block).transpose()
    }

    async fn update_deal_block(&self, block: DealBlock) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE deal_block SET total_quantity = $1, lifecycle = $2 WHERE id = $3",
        )
        .bind(block.total_quantity)
        .bind(lifecycle_label(block.lifecycle))
        .bind(block.id.value())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_deal_allocation(
        &self,
        allocation: DealAllocation,
    ) -> Result<DealAllocation, CoreError> {
        let row = sqlx::query(
            "INSERT INTO deal_allocation
                (block_id, portfolio_id, quantity, price, is_rounding_adjustment, lifecycle)
             VALUES ($1,$2,$3,$4,$5,$6)
             RETURNING id",
        )
        .bind(allocation.block_id.value())
        .bind(allocation.portfolio_id.value())
        .bind(allocation.quantity)
        .bind(allocation.price)
        .bind(allocation.is_rounding_adjustment)
        .bind(lifecycle_label(allocation.lifecycle))
        .fetch_one(&self.pool)
        .await?;

        Ok(DealAllocation {
            id: DealAllocationId(row.get("id")),
            ..allocation
        })
    }

    async fn list_active_allocations(
        &self,
        block_id: DealBlockId,
    ) -> Result<Vec<DealAllocation>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM deal_allocation WHERE block_id = $1 AND lifecycle = 'active' ORDER BY portfolio_id",
        )
        .bind(block_id.value())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_deal_allocation).collect()
    }

    async fn mark_allocations_deleted(&self, block_id: DealBlockId) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE deal_allocation SET lifecycle = 'deleted' WHERE block_id = $1 AND lifecycle = 'active'",
        )
        .bind(block_id.value())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_deal(&self, deal: NewDeal) -> Result<DealCreationResult, CoreError> {
        let mut tx = self.pool.begin().await?;

        let block_row = sqlx::query(
            "INSERT INTO deal_block
                (instrument_id, trade_date, settle_date, trade_currency, total_quantity, price, lifecycle)
             VALUES ($1,$2,$3,$4,$5,$6,'active')
             RETURNING id",
        )
        .bind(deal.instrument_id.value())
        .bind(deal.trade_date)
        .bind(deal.settle_date)
        .bind(&deal.quote_currency)
        .bind(deal.total_quantity)
        .bind(deal.price)
        .fetch_one(&mut *tx)
        .await?;
        let block_id = DealBlockId(block_row.get("id"));
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

        let block_trade_row = sqlx::query(
            "INSERT INTO pending_trade
                (level, deal_block_id, deal_allocation_id, portfolio_id, instrument_id,
                 trade_date, settle_date, quantity, price, quote_currency, report_currency,
                 qc_gross_amount, rc_gross_amount, status, lifecycle, entry_version, source_system)
             VALUES ('block',$1,NULL,NULL,$2,$3,$4,$5,$6,$7,$8,$9,$10,'entry','active',0,NULL)
             RETURNING *",
        )
        .bind(block_id.value())
        .bind(deal.instrument_id.value())
        .bind(deal.trade_date)
        .bind(deal.settle_date)
        .bind(deal.total_quantity)
        .bind(deal.price)
        .bind(&deal.quote_currency)
        .bind(&deal.report_currency)
        .bind(deal.qc_gross_amount)
        .bind(deal.rc_gross_amount)
        .fetch_one(&mut *tx)
        .await?;
        let block_trade = row_to_pending_trade(block_trade_row)?;

        let mut allocations = Vec::with_capacity(deal.allocations.len());
        for leg in deal.allocations {
            let allocation_row = sqlx::query(
                "INSERT INTO deal_allocation
                    (block_id, portfolio_id, quantity, price, is_rounding_adjustment, lifecycle)
                 VALUES ($1,$2,$3,$4,$5,'active')
                 RETURNING id",
            )
            .bind(block_id.value())
            .bind(leg.portfolio_id.value())
            .bind(leg.quantity)
            .bind(deal.price)
            .bind(leg.is_rounding_adjustment)
            .fetch_one(&mut *tx)
            .await?;
            let allocation_id = DealAllocationId(allocation_row.get("id"));
            let allocation = DealAllocation {
                id: allocation_id,
                block_id,
                portfolio_id: leg.portfolio_id,
                quantity: leg.quantity,
                price: deal.price,
                is_rounding_adjustment: leg.is_rounding_adjustment,
                lifecycle: Lifecycle::Active,
            };

            let trade_row = sqlx::query(
                "INSERT INTO pending_trade
                    (level, deal_block_id, deal_allocation_id, portfolio_id, instrument_id,
                     trade_date, settle_date, quantity, price, quote_currency, report_currency,
                     qc_gross_amount, rc_gross_amount, status, lifecycle, entry_version, source_system)
                 VALUES ('allocation',$1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,'entry','active',0,NULL)
                 RETURNING *",
            )
            .bind(block_id.value())
            .bind(allocation_id.value())
            .bind(leg.portfolio_id.value())
            .bind(deal.instrument_id.value())
            .bind(deal.trade_date)
            .bind(deal.settle_date)
            .bind(leg.quantity)
            .bind(deal.price)
            .bind(&deal.quote_currency)
            .bind(&leg.report_currency)
            .bind(leg.qc_gross_amount)
            .bind(leg.rc_gross_amount)
            .fetch_one(&mut *tx)
            .await?;
            let trade = row_to_pending_trade(trade_row)?;
            allocations.push((allocation, trade));
        }

        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE deal_allocation SET lifecycle = 'deleted' WHERE block_id = $1 AND lifecycle = 'active'",
        )
        .bind(plan.deal_block_id.value())
        .execute(&mut *tx)
        .await?;

        let block_trade_row = sqlx::query(
            "INSERT INTO pending_trade
                (level, deal_block_id, deal_allocation_id, portfolio_id, instrument_id,
                 trade_date, settle_date, quantity, price, quote_currency, report_currency,
                 qc_gross_amount, rc_gross_amount, status, lifecycle, entry_version, source_system)
             VALUES ('block',$1,NULL,NULL,$2,$3,$4,$5,$6,$7,$7,$8,$8,'entry','active',0,NULL)
             RETURNING *",
        )
        .bind(plan.deal_block_id.value())
        .bind(plan.instrument_id.value())
        .bind(plan.trade_date)
        .bind(plan.settle_date)
        .bind(plan.block_delta_quantity)
        .bind(plan.price)
        .bind(&plan.quote_currency)
        .bind(plan.block_amount_qc)
        .fetch_one(&mut *tx)
        .await?;
        let block_trade = row_to_pending_trade(block_trade_row)?;

        let mut legs = Vec::with_capacity(plan.legs.len());
        for leg in plan.legs {
            let allocation_row = sqlx::query(
                "INSERT INTO deal_allocation
                    (block_id, portfolio_id, quantity, price, is_rounding_adjustment, lifecycle)
                 VALUES ($1,$2,$3,$4,$5,$6)
                 RETURNING id",
            )
            .bind(plan.deal_block_id.value())
            .bind(leg.portfolio_id.value())
            .bind(leg.quantity)
            .bind(plan.price)
            .bind(leg.is_rounding_adjustment)
            .bind(lifecycle_label(leg.allocation_lifecycle))
            .fetch_one(&mut *tx)
            .await?;
            let allocation_id = DealAllocationId(allocation_row.get("id"));
            let allocation = DealAllocation {
                id: allocation_id,
                block_id: plan.deal_block_id,
                portfolio_id: leg.portfolio_id,
                quantity: leg.quantity,
                price: plan.price,
                is_rounding_adjustment: leg.is_rounding_adjustment,
                lifecycle: leg.allocation_lifecycle,
            };

            let trade_row = sqlx::query(
                "INSERT INTO pending_trade
                    (level, deal_block_id, deal_allocation_id, portfolio_id, instrument_id,
                     trade_date, settle_date, quantity, price, quote_currency, report_currency,
                     qc_gross_amount, rc_gross_amount, status, lifecycle, entry_version, source_system)
                 VALUES ('allocation',$1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,'entry','active',0,$13)
                 RETURNING *",
            )
            .bind(plan.deal_block_id.value())
            .bind(allocation_id.value())
            .bind(leg.portfolio_id.value())
            .bind(plan.instrument_id.value())
            .bind(plan.trade_date)
            .bind(plan.settle_date)
            .bind(leg.quantity)
            .bind(plan.price)
            .bind(&plan.quote_currency)
            .bind(&leg.report_currency)
            .bind(leg.qc_gross_amount)
            .bind(leg.rc_gross_amount)
            .bind(leg.source_system.map(source_system_label))
            .fetch_one(&mut *tx)
            .await?;
            let trade = row_to_pending_trade(trade_row)?;
            legs.push((allocation, trade));
        }

        sqlx::query("UPDATE deal_block SET total_quantity = $1, lifecycle = $2 WHERE id = $3")
            .bind(plan.new_block_quantity)
            .bind(lifecycle_label(if plan.mark_block_deleted {
                Lifecycle::Deleted
            } else {
                Lifecycle::Active
            }))
            .bind(plan.deal_block_id.value())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(DealAdjustmentResult { block_trade, legs })
    }

    async fn insert_journal_entry(
        &self,
        entry: JournalEntry,
        lines: Vec<JournalEntryLine>,
    ) -> Result<JournalEntryId, CoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "INSERT INTO journal_entry
                (pending_trade_id, deal_block_id, deal_allocation_id, effective_date, posted_at,
                 trade_type, entry_role, reversal_of_entry_id, replacement_of_entry_id, description)
             VALUES ($1,$2,$3,$4,now(),$5,$6,$7,$8,$9)
             RETURNING id",
        )
        .bind(entry.pending_trade_id.map(|v| v.value()))
        .bind(entry.deal_block_id.map(|v| v.value()))
        .bind(entry.deal_allocation_id.map(|v| v.value()))
        .bind(entry.effective_date)
        .bind(trade_type_label(entry.trade_type))
        .bind(entry_role_label(entry.entry_role))
        .bind(entry.reversal_of_entry_id.map(|v| v.value()))
        .bind(entry.replacement_of_entry_id.map(|v| v.value()))
        .bind(&entry.description)
        .fetch_one(&mut *tx)
        .await?;

        let entry_id = JournalEntryId(row.get("id"));

        for line in lines {
            sqlx::query(
                "INSERT INTO journal_entry_line
                    (entry_id, portfolio_id, instrument_id, account_code, drcr, quantity, amount, currency)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
            )
            .bind(entry_id.value())
            .bind(line.portfolio_id.value())
            .bind(line.instrument_id.value())
            .bind(&line.account_code)
            .bind(drcr_label(line.drcr))
            .bind(line.quantity)
            .bind(line.amount)
            .bind(&line.currency)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(entry_id)
    }

    async fn find_latest_normal_entry_for_block(
        &self,
        deal_block_id: DealBlockId,
    ) -> Result<Option<JournalEntry>, CoreError> {
        let row = sqlx::query(
            "SELECT * FROM journal_entry
             WHERE deal_block_id = $1 AND entry_role = 'normal'
             ORDER BY posted_at DESC LIMIT 1",
        )
        .bind(deal_block_id.value())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_journal_entry).transpose()
    }

    async fn upsert_position_current(
        &self,
        portfolio_id: PortfolioId,
        instrument_id: InstrumentId,
        delta_quantity: Decimal,
        cost_basis_rc: Option<Decimal>,
        last_journal_entry_id: JournalEntryId,
    ) -> Result<PositionCurrent, CoreError> {
        let row = sqlx::query(
            "INSERT INTO position_current
                (portfolio_id, instrument_id, quantity, cost_basis_rc, last_journal_entry_id, version_uuid, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,now())
             ON CONFLICT (portfolio_id, instrument_id) DO UPDATE SET
                quantity = position_current.quantity + EXCLUDED.quantity,
                cost_basis_rc = COALESCE(EXCLUDED.cost_basis_rc, position_current.cost_basis_rc),
                last_journal_entry_id = EXCLUDED.last_journal_entry_id,
                version_uuid = EXCLUDED.version_uuid,
                updated_at = now()
             RETURNING portfolio_id, instrument_id, quantity, cost_basis_rc, last_journal_entry_id, version_uuid, updated_at",
        )
        .bind(portfolio_id.value())
        .bind(instrument_id.value())
        .bind(delta_quantity)
        .bind(cost_basis_rc)
        .bind(last_journal_entry_id.value())
        .bind(Uuid::new_v4())
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_position_current(row))
    }

    async fn get_position_current(
        &self,
        portfolio_id: PortfolioId,
        instrument_id: InstrumentId,
    ) -> Result<Option<PositionCurrent>, CoreError> {
        let row = sqlx::query(
            "SELECT * FROM position_current WHERE portfolio_id = $1 AND instrument_id = $2",
        )
        .bind(portfolio_id.value())
        .bind(instrument_id.value())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_position_current))
    }

    async fn list_positions_current(
        &self,
        portfolio_id: PortfolioId,
    ) -> Result<Vec<PositionCurrent>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM position_current WHERE portfolio_id = $1 AND quantity <> 0",
        )
        .bind(portfolio_id.value())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_position_current).collect())
    }

    async fn list_holders_of_instrument(
        &self,
        instrument_id: InstrumentId,
    ) -> Result<Vec<PositionCurrent>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM position_current WHERE instrument_id = $1 AND quantity <> 0",
        )
        .bind(instrument_id.value())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_position_current).collect())
    }

    async fn snapshot_eod(
        &self,
        portfolio_id: PortfolioId,
        asof_date: NaiveDate,
    ) -> Result<Vec<PositionSnapshotEod>, CoreError> {
        let rows = sqlx::query(
            "INSERT INTO position_snapshot_eod
                (asof_date, portfolio_id, instrument_id, quantity, cost_basis_rc, through_entry_id)
             SELECT $1, portfolio_id, instrument_id, quantity, cost_basis_rc, last_journal_entry_id
             FROM position_current WHERE portfolio_id = $2
             ON CONFLICT (asof_date, portfolio_id, instrument_id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                cost_basis_rc = EXCLUDED.cost_basis_rc,
                through_entry_id = EXCLUDED.through_entry_id
             RETURNING asof_date, portfolio_id, instrument_id, quantity, cost_basis_rc, through_entry_id",
        )
        .bind(asof_date)
        .bind(portfolio_id.value())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_position_snapshot).collect())
    }

    async fn list_position_snapshot_eod(
        &self,
        portfolio_id: PortfolioId,
        asof_date: NaiveDate,
    ) -> Result<Vec<PositionSnapshotEod>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM position_snapshot_eod
             WHERE portfolio_id = $1 AND asof_date = $2 AND quantity <> 0",
        )
        .bind(portfolio_id.value())
        .bind(asof_date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_position_snapshot).collect())
    }

    async fn latest_market_price(
        &self,
        instrument_id: InstrumentId,
        asof_ts: DateTime<Utc>,
    ) -> Result<Option<MarketPrice>, CoreError> {
        let row = sqlx::query(
            "SELECT * FROM market_price WHERE instrument_id = $1 AND asof_ts <= $2
             ORDER BY asof_ts DESC LIMIT 1",
        )
        .bind(instrument_id.value())
        .bind(asof_ts)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_market_price))
    }

    async fn eod_market_price(
        &self,
        instrument_id: InstrumentId,
        asof_date: NaiveDate,
    ) -> Result<Option<MarketPrice>, CoreError> {
        let row = sqlx::query(
            "SELECT * FROM market_price WHERE instrument_id = $1 AND asof_date = $2 AND is_eod = true
             LIMIT 1",
        )
        .bind(instrument_id.value())
        .bind(asof_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_market_price))
    }

    async fn latest_fx_rate(
        &self,
        base_ccy: &str,
        quote_ccy: &str,
        asof_ts: DateTime<Utc>,
    ) -> Result<Option<FxRate>, CoreError> {
        if base_ccy == quote_ccy {
            return Ok(Some(FxRate {
                base_ccy: base_ccy.to_string(),
                quote_ccy: quote_ccy.to_string(),
                asof_ts,
                rate: Decimal::ONE,
                is_eod: true,
                source_id: "identity".to_string(),
            }));
        }
        let row = sqlx::query(
            "SELECT * FROM fx_rate WHERE base_ccy = $1 AND quote_ccy = $2 AND asof_ts <= $3
             ORDER BY asof_ts DESC LIMIT 1",
        )
        .bind(base_ccy)
        .bind(quote_ccy)
        .bind(asof_ts)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_fx_rate))
    }

    async fn eod_fx_rate(
        &self,
        base_ccy: &str,
        quote_ccy: &str,
        asof_ts: DateTime<Utc>,
    ) -> Result<Option<FxRate>, CoreError> {
        if base_ccy == quote_ccy {
            return Ok(Some(FxRate {
                base_ccy: base_ccy.to_string(),
                quote_ccy: quote_ccy.to_string(),
                asof_ts,
                rate: Decimal::ONE,
                is_eod: true,
                source_id: "identity".to_string(),
            }));
        }
        let row = sqlx::query(
            "SELECT * FROM fx_rate WHERE base_ccy = $1 AND quote_ccy = $2 AND is_eod = true AND asof_ts <= $3
             ORDER BY asof_ts DESC LIMIT 1",
        )
        .bind(base_ccy)
        .bind(quote_ccy)
        .bind(asof_ts)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_fx_rate))
    }

    async fn insert_or_get_nav_run(&self, key: NavRunKey) -> Result<(NavRunId, bool), CoreError> {
        let (portfolio_id, run_type, asof_ts, asof_date) = match key {
            NavRunKey::Ibor {
                portfolio_id,
                run_type,
                asof_ts,
            } => (portfolio_id, run_type, Some(asof_ts), None),
            NavRunKey::Abor {
                portfolio_id,
                asof_date,
            } => (portfolio_id, RunType::Eod, None, Some(asof_date)),
        };

        let row = sqlx::query(
            "INSERT INTO nav_run (portfolio_id, run_type, asof_ts, asof_date, status)
             VALUES ($1,$2,$3,$4,'running')
             ON CONFLICT (portfolio_id, run_type, asof_ts, asof_date) DO NOTHING
             RETURNING id",
        )
        .bind(portfolio_id.value())
        .bind(run_type_label(run_type))
        .bind(asof_ts)
        .bind(asof_date)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok((NavRunId(row.get("id")), true));
        }

        let existing = sqlx::query(
            "SELECT id FROM nav_run WHERE portfolio_id = $1 AND run_type = $2
             AND asof_ts IS NOT DISTINCT FROM $3 AND asof_date IS NOT DISTINCT FROM $4",
        )
        .bind(portfolio_id.value())
        .bind(run_type_label(run_type))
        .bind(asof_ts)
        .bind(asof_date)
        .fetch_one(&self.pool)
        .await?;

        Ok((NavRunId(existing.get("id")), false))
    }

    async fn complete_nav_run(
        &self,
        run_id: NavRunId,
        result: NavResult,
        line_items: Vec<NavLineItem>,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO nav_result (nav_run_id, report_currency, nav_rc) VALUES ($1,$2,$3)",
        )
        .bind(run_id.value())
        .bind(&result.report_currency)
        .bind(result.nav_rc)
        .execute(&mut *tx)
        .await?;

        for item in line_items {
            sqlx::query(
                "INSERT INTO nav_line_item
                    (nav_run_id, instrument_id, quantity, price, fx_rate, market_value_rc,
                     price_asof_ts, price_source_id, fx_rate_asof_ts, fx_rate_source_id)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
            )
            .bind(run_id.value())
            .bind(item.instrument_id.value())
            .bind(item.quantity)
            .bind(item.price)
            .bind(item.fx_rate)
            .bind(item.market_value_rc)
            .bind(item.price_asof_ts)
            .bind(item.price_source_id)
            .bind(item.fx_rate_asof_ts)
            .bind(item.fx_rate_source_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE nav_run SET status = 'completed' WHERE id = $1")
            .bind(run_id.value())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_nav_result(
        &self,
        run_id: NavRunId,
    ) -> Result<Option<(NavRun, NavResult, Vec<NavLineItem>)>, CoreError> {
        let run_row = sqlx::query("SELECT * FROM nav_run WHERE id = $1")
            .bind(run_id.value())
            .fetch_optional(&self.pool)
            .await?;
        let run_row = match run_row {
            Some(r) => r,
            None => return Ok(None),
        };
        let run = row_to_nav_run(run_row)?;

        let result_row = sqlx::query("SELECT * FROM nav_result WHERE nav_run_id = $1")
            .bind(run_id.value())
            .fetch_optional(&self.pool)
            .await?;
        let result_row = match result_row {
            Some(r) => r,
            None => return Ok(None),
        };
        let result = NavResult {
            nav_run_id: run_id,
            report_currency: result_row.get("report_currency"),
            nav_rc: result_row.get("nav_rc"),
        };

        let line_rows = sqlx::query("SELECT * FROM nav_line_item WHERE nav_run_id = $1")
            .bind(run_id.value())
            .fetch_all(&self.pool)
            .await?;
        let line_items = line_rows.into_iter().map(row_to_nav_line_item).collect();

        Ok(Some((run, result, line_items)))
    }

    async fn get_abor_run_by_date(
        &self,
        portfolio_id: PortfolioId,
        asof_date: NaiveDate,
    ) -> Result<Option<NavRun>, CoreError> {
        let row = sqlx::query(
            "SELECT * FROM nav_run WHERE portfolio_id = $1 AND run_type = 'eod'
             AND asof_date = $2 AND status = 'completed'",
        )
        .bind(portfolio_id.value())
        .bind(asof_date)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_nav_run).transpose()
    }

    async fn insert_ca_event(&self, event: CaEvent) -> Result<CaEvent, CoreError> {
        let row = sqlx::query(
            "INSERT INTO ca_event
                (ca_type, instrument_id, ex_date, record_date, pay_date, currency,
                 cash_amount_per_share, split_numerator, split_denominator, require_election,
                 status, lifecycle)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,'pending',$11)
             RETURNING id",
        )
        .bind(ca_type_label(event.ca_type))
        .bind(event.instrument_id.value())
        .bind(event.ex_date)
        .bind(event.record_date)
        .bind(event.pay_date)
        .bind(&event.currency)
        .bind(event.cash_amount_per_share)
        .bind(event.split_numerator)
        .bind(event.split_denominator)
        .bind(event.require_election)
        .bind(lifecycle_label(event.lifecycle))
        .fetch_one(&self.pool)
        .await?;

        Ok(CaEvent {
            id: CaEventId(row.get("id")),
            ..event
        })
    }

    async fn get_ca_event(&self, id: CaEventId) -> Result<Option<CaEvent>, CoreError> {
        let row = sqlx::query("SELECT * FROM ca_event WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_ca_event).transpose()
    }

    async fn set_ca_event_status(
        &self,
        id: CaEventId,
        status: CaEventStatus,
    ) -> Result<(), CoreError> {
        sqlx::query("UPDATE ca_event SET status = $1 WHERE id = $2")
            .bind(ca_event_status_label(status))
            .bind(id.value())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_ca_election(&self, election: CaElection) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO ca_election (ca_event_id, portfolio_id, choice) VALUES ($1,$2,$3)
             ON CONFLICT (ca_event_id, portfolio_id) DO UPDATE SET choice = EXCLUDED.choice",
        )
        .bind(election.ca_event_id.value())
        .bind(election.portfolio_id.value())
        .bind(ca_choice_label(election.choice))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_ca_election(
        &self,
        event_id: CaEventId,
        portfolio_id: PortfolioId,
    ) -> Result<Option<CaElection>, CoreError> {
        let row = sqlx::query(
            "SELECT * FROM ca_election WHERE ca_event_id = $1 AND portfolio_id = $2",
        )
        .bind(event_id.value())
        .bind(portfolio_id.value())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_ca_election).transpose()
    }

    async fn get_ca_portfolio_rule(
        &self,
        portfolio_id: PortfolioId,
        ca_type: CaType,
    ) -> Result<Option<CaPortfolioRule>, CoreError> {
        let row = sqlx::query(
            "SELECT * FROM ca_portfolio_rule WHERE portfolio_id = $1 AND ca_type = $2",
        )
        .bind(portfolio_id.value())
        .bind(ca_type_label(ca_type))
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_ca_portfolio_rule).transpose()
    }

    async fn claim_ca_effect(
        &self,
        event_id: CaEventId,
        portfolio_id: PortfolioId,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "INSERT INTO ca_effect (ca_event_id, portfolio_id) VALUES ($1,$2)
             ON CONFLICT (ca_event_id, portfolio_id) DO NOTHING",
        )
        .bind(event_id.value())
        .bind(portfolio_id.value())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_ca_effect(&self, effect: CaEffect) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE ca_effect SET journal_entry_id = $1, cash_amount = $2, share_delta = $3
             WHERE ca_event_id = $4 AND portfolio_id = $5",
        )
        .bind(effect.journal_entry_id.map(|v| v.value()))
        .bind(effect.cash_amount)
        .bind(effect.share_delta)
        .bind(effect.ca_event_id.value())
        .bind(effect.portfolio_id.value())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn lifecycle_of(&self, id: PendingTradeId) -> Result<Option<Lifecycle>, CoreError> {
        let row = sqlx::query("SELECT lifecycle FROM pending_trade WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| lifecycle_from_label(r.get("lifecycle"))).transpose()
    }
}

// -- Label <-> enum mapping helpers --------------------------------------

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Entry => "entry",
        Status::PreCheck => "pre_check",
        Status::Position => "position",
        Status::Allocated => "allocated",
        Status::Settled => "settled",
    }
}

fn status_from_label(label: &str) -> Result<Status, CoreError> {
    Ok(match label {
        "entry" => Status::Entry,
        "pre_check" => Status::PreCheck,
        "position" => Status::Position,
        "allocated" => Status::Allocated,
        "settled" => Status::Settled,
        other => return Err(CoreError::Store(format!("unknown status '{other}'"))),
    })
}

fn lifecycle_label(lifecycle: Lifecycle) -> &'static str {
    match lifecycle {
        Lifecycle::Active => "active",
        Lifecycle::Cancelled => "cancelled",
        Lifecycle::Deleted => "deleted",
    }
}

fn lifecycle_from_label(label: &str) -> Result<Lifecycle, CoreError> {
    Ok(match label {
        "active" => Lifecycle::Active,
        "cancelled" => Lifecycle::Cancelled,
        "deleted" => Lifecycle::Deleted,
        other => return Err(CoreError::Store(format!("unknown lifecycle '{other}'"))),
    })
}

fn level_label(level: crate::model::Level) -> &'static str {
    match level {
        crate::model::Level::Block => "block",
        crate::model::Level::Allocation => "allocation",
    }
}

fn level_from_label(label: &str) -> Result<crate::model::Level, CoreError> {
    Ok(match label {
        "block" => crate::model::Level::Block,
        "allocation" => crate::model::Level::Allocation,
        other => return Err(CoreError::Store(format!("unknown level '{other}'"))),
    })
}

fn source_system_label(value: crate::model::SourceSystem) -> &'static str {
    match value {
        crate::model::SourceSystem::ModifyReversal => "modify_reversal",
        crate::model::SourceSystem::ModifyReplacement => "modify_replacement",
        crate::model::SourceSystem::DeleteReversal => "delete_reversal",
    }
}

fn source_system_from_label(label: &str) -> Result<Option<crate::model::SourceSystem>, CoreError> {
    Ok(match label {
        "modify_reversal" => Some(crate::model::SourceSystem::ModifyReversal),
        "modify_replacement" => Some(crate::model::SourceSystem::ModifyReplacement),
        "delete_reversal" => Some(crate::model::SourceSystem::DeleteReversal),
        "" => None,
        other => return Err(CoreError::Store(format!("unknown source_system '{other}'"))),
    })
}

fn trade_type_label(value: crate::model::TradeType) -> &'static str {
    match value {
        crate::model::TradeType::Buy => "BUY",
        crate::model::TradeType::Sell => "SELL",
    }
}

fn trade_type_from_label(label: &str) -> Result<crate::model::TradeType, CoreError> {
    Ok(match label {
        "BUY" => crate::model::TradeType::Buy,
        "SELL" => crate::model::TradeType::Sell,
        other => return Err(CoreError::Store(format!("unknown trade_type '{other}'"))),
    })
}

fn entry_role_label(value: crate::model::EntryRole) -> &'static str {
    match value {
        crate::model::EntryRole::Normal => "normal",
        crate::model::EntryRole::Reversal => "reversal",
        crate::model::EntryRole::Replacement => "replacement",
    }
}

fn entry_role_from_label(label: &str) -> Result<crate::model::EntryRole, CoreError> {
    Ok(match label {
        "normal" => crate::model::EntryRole::Normal,
        "reversal" => crate::model::EntryRole::Reversal,
        "replacement" => crate::model::EntryRole::Replacement,
        other => return Err(CoreError::Store(format!("unknown entry_role '{other}'"))),
    })
}

fn drcr_label(value: crate::model::DrCr) -> &'static str {
    match value {
        crate::model::DrCr::Dr => "DR",
        crate::model::DrCr::Cr => "CR",
    }
}

fn run_type_label(value: RunType) -> &'static str {
    match value {
        RunType::Realtime => "realtime",
        RunType::Snapshot => "snapshot",
        RunType::Eod => "eod",
    }
}

fn run_type_from_label(label: &str) -> Result<RunType, CoreError> {
    Ok(match label {
        "realtime" => RunType::Realtime,
        "snapshot" => RunType::Snapshot,
        "eod" => RunType::Eod,
        other => return Err(CoreError::Store(format!("unknown run_type '{other}'"))),
    })
}

fn nav_run_status_from_label(label: &str) -> Result<NavRunStatus, CoreError> {
    Ok(match label {
        "running" => NavRunStatus::Running,
        "completed" => NavRunStatus::Completed,
        "failed" => NavRunStatus::Failed,
        other => return Err(CoreError::Store(format!("unknown nav run status '{other}'"))),
    })
}

fn ca_type_label(value: CaType) -> &'static str {
    match value {
        CaType::CashDividend => "cash_dividend",
        CaType::StockSplit => "stock_split",
    }
}

fn ca_type_from_label(label: &str) -> Result<CaType, CoreError> {
    Ok(match label {
        "cash_dividend" => CaType::CashDividend,
        "stock_split" => CaType::StockSplit,
        other => return Err(CoreError::Store(format!("unknown ca_type '{other}'"))),
    })
}

fn ca_event_status_label(value: CaEventStatus) -> &'static str {
    match value {
        CaEventStatus::Pending => "pending",
        CaEventStatus::Processed => "processed",
        CaEventStatus::Cancelled => "cancelled",
    }
}

fn ca_event_status_from_label(label: &str) -> Result<CaEventStatus, CoreError> {
    Ok(match label {
        "pending" => CaEventStatus::Pending,
        "processed" => CaEventStatus::Processed,
        "cancelled" => CaEventStatus::Cancelled,
        other => return Err(CoreError::Store(format!("unknown ca_event status '{other}'"))),
    })
}

fn ca_choice_label(value: crate::model::CaChoice) -> &'static str {
    match value {
        crate::model::CaChoice::Accept => "accept",
        crate::model::CaChoice::Decline => "decline",
    }
}

fn ca_choice_from_label(label: &str) -> Result<crate::model::CaChoice, CoreError> {
    Ok(match label {
        "accept" => crate::model::CaChoice::Accept,
        "decline" => crate::model::CaChoice::Decline,
        other => return Err(CoreError::Store(format!("unknown ca choice '{other}'"))),
    })
}

fn instrument_type_label(value: InstrumentType) -> &'static str {
    match value {
        InstrumentType::Stock => "stock",
        InstrumentType::Cash => "cash",
        InstrumentType::Futures => "futures",
        InstrumentType::Fx => "fx",
        InstrumentType::Swap => "swap",
        InstrumentType::FixedIncome => "fixedincome",
    }
}

fn instrument_type_from_label(label: &str) -> Result<InstrumentType, CoreError> {
    Ok(match label {
        "stock" => InstrumentType::Stock,
        "cash" => InstrumentType::Cash,
        "futures" => InstrumentType::Futures,
        "fx" => InstrumentType::Fx,
        "swap" => InstrumentType::Swap,
        "fixedincome" => InstrumentType::FixedIncome,
        other => return Err(CoreError::Store(format!("unknown instrument_type '{other}'"))),
    })
}

// -- Row mapping helpers --------------------------------------------------

fn row_to_instrument(row: sqlx::postgres::PgRow) -> Instrument {
    Instrument {
        id: InstrumentId(row.get("id")),
        instrument_type: instrument_type_from_label(row.get::<String, _>("instrument_type").as_str())
            .unwrap_or(InstrumentType::Stock),
        quote_currency: row.get("quote_currency"),
        security_id: row.get("security_id"),
        subtype: row.get("subtype"),
    }
}

fn row_to_pending_trade(row: sqlx::postgres::PgRow) -> Result<PendingTrade, CoreError> {
    let source_system_raw: Option<String> = row.get("source_system");
    Ok(PendingTrade {
        id: PendingTradeId(row.get("id")),
        level: level_from_label(row.get::<String, _>("level").as_str())?,
        deal_block_id: row.get::<Option<i64>, _>("deal_block_id").map(DealBlockId),
        deal_allocation_id: row
            .get::<Option<i64>, _>("deal_allocation_id")
            .map(DealAllocationId),
        portfolio_id: row.get::<Option<i64>, _>("portfolio_id").map(PortfolioId),
        instrument_id: InstrumentId(row.get("instrument_id")),
        trade_date: row.get("trade_date"),
        settle_date: row.get("settle_date"),
        quantity: row.get("quantity"),
        price: row.get("price"),
        quote_currency: row.get("quote_currency"),
        report_currency: row.get("report_currency"),
        qc_gross_amount: row.get("qc_gross_amount"),
        rc_gross_amount: row.get("rc_gross_amount"),
        status: status_from_label(row.get::<String, _>("status").as_str())?,
        lifecycle: lifecycle_from_label(row.get::<String, _>("lifecycle").as_str())?,
        entry_version: row.get("entry_version"),
        source_system: source_system_raw
            .map(|s| source_system_from_label(&s))
            .transpose()?
            .flatten(),
    })
}

fn row_to_deal_block(row: sqlx::postgres::PgRow) -> Result<DealBlock, CoreError> {
    Ok(DealBlock {
        id: DealBlockId(row.get("id")),
        instrument_id: InstrumentId(row.get("instrument_id")),
        trade_date: row.get("trade_date"),
        settle_date: row.get("settle_date"),
        trade_currency: row.get("trade_currency"),
        total_quantity: row.get("total_quantity"),
        price: row.get("price"),
        lifecycle: lifecycle_from_label(row.get::<String, _>("lifecycle").as_str())?,
    })
}

fn row_to_deal_allocation(row: sqlx::postgres::PgRow) -> Result<DealAllocation, CoreError> {
    Ok(DealAllocation {
        id: DealAllocationId(row.get("id")),
        block_id: DealBlockId(row.get("block_id")),
        portfolio_id: PortfolioId(row.get("portfolio_id")),
        quantity: row.get("quantity"),
        price: row.get("price"),
        is_rounding_adjustment: row.get("is_rounding_adjustment"),
        lifecycle: lifecycle_from_label(row.get::<String, _>("lifecycle").as_str())?,
    })
}

fn row_to_journal_entry(row: sqlx::postgres::PgRow) -> Result<JournalEntry, CoreError> {
    Ok(JournalEntry {
        id: JournalEntryId(row.get("id")),
        pending_trade_id: row.get::<Option<i64>, _>("pending_trade_id").map(PendingTradeId),
        deal_block_id: row.get::<Option<i64>, _>("deal_block_id").map(DealBlockId),
        deal_allocation_id: row
            .get::<Option<i64>, _>("deal_allocation_id")
            .map(DealAllocationId),
        effective_date: row.get("effective_date"),
        posted_at: row.get("posted_at"),
        trade_type: trade_type_from_label(row.get::<String, _>("trade_type").as_str())?,
        entry_role: entry_role_from_label(row.get::<String, _>("entry_role").as_str())?,
        reversal_of_entry_id: row
            .get::<Option<i64>, _>("reversal_of_entry_id")
            .map(JournalEntryId),
        replacement_of_entry_id: row
            .get::<Option<i64>, _>("replacement_of_entry_id")
            .map(JournalEntryId),
        description: row.get("description"),
    })
}

fn row_to_position_current(row: sqlx::postgres::PgRow) -> PositionCurrent {
    PositionCurrent {
        portfolio_id: PortfolioId(row.get("portfolio_id")),
        instrument_id: InstrumentId(row.get("instrument_id")),
        quantity: row.get("quantity"),
        cost_basis_rc: row.get("cost_basis_rc"),
        last_journal_entry_id: JournalEntryId(row.get("last_journal_entry_id")),
        version_uuid: row.get("version_uuid"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_position_snapshot(row: sqlx::postgres::PgRow) -> PositionSnapshotEod {
    PositionSnapshotEod {
        asof_date: row.get("asof_date"),
        portfolio_id: PortfolioId(row.get("portfolio_id")),
        instrument_id: InstrumentId(row.get("instrument_id")),
        quantity: row.get("quantity"),
        cost_basis_rc: row.get("cost_basis_rc"),
        through_entry_id: JournalEntryId(row.get("through_entry_id")),
    }
}

fn row_to_market_price(row: sqlx::postgres::PgRow) -> MarketPrice {
    MarketPrice {
        instrument_id: InstrumentId(row.get("instrument_id")),
        asof_date: row.get("asof_date"),
        asof_ts: row.get("asof_ts"),
        price: row.get("price"),
        currency: row.get("currency"),
        is_eod: row.get("is_eod"),
        source_id: row.get("source_id"),
    }
}

fn row_to_fx_rate(row: sqlx::postgres::PgRow) -> FxRate {
    FxRate {
        base_ccy: row.get("base_ccy"),
        quote_ccy: row.get("quote_ccy"),
        asof_ts: row.get("asof_ts"),
        rate: row.get("rate"),
        is_eod: row.get("is_eod"),
        source_id: row.get("source_id"),
    }
}

fn row_to_nav_run(row: sqlx::postgres::PgRow) -> Result<NavRun, CoreError> {
    Ok(NavRun {
        id: NavRunId(row.get("id")),
        portfolio_id: PortfolioId(row.get("portfolio_id")),
        run_type: run_type_from_label(row.get::<String, _>("run_type").as_str())?,
        asof_ts: row.get("asof_ts"),
        asof_date: row.get("asof_date"),
        status: nav_run_status_from_label(row.get::<String, _>("status").as_str())?,
        idempotency_scope: row.get("idempotency_scope"),
        idempotency_key: row.get("idempotency_key"),
    })
}

fn row_to_nav_line_item(row: sqlx::postgres::PgRow) -> NavLineItem {
    NavLineItem {
        nav_run_id: NavRunId(row.get("nav_run_id")),
        instrument_id: InstrumentId(row.get("instrument_id")),
        quantity: row.get("quantity"),
        price: row.get("price"),
        fx_rate: row.get("fx_rate"),
        market_value_rc: row.get("market_value_rc"),
        price_asof_ts: row.get("price_asof_ts"),
        price_source_id: row.get("price_source_id"),
        fx_rate_asof_ts: row.get("fx_rate_asof_ts"),
        fx_rate_source_id: row.get("fx_rate_source_id"),
    }
}

fn row_to_ca_event(row: sqlx::postgres::PgRow) -> Result<CaEvent, CoreError> {
    Ok(CaEvent {
        id: CaEventId(row.get("id")),
        ca_type: ca_type_from_label(row.get::<String, _>("ca_type").as_str())?,
        instrument_id: InstrumentId(row.get("instrument_id")),
        ex_date: row.get("ex_date"),
        record_date: row.get("record_date"),
        pay_date: row.get("pay_date"),
        currency: row.get("currency"),
        cash_amount_per_share: row.get("cash_amount_per_share"),
        split_numerator: row.get("split_numerator"),
        split_denominator: row.get("split_denominator"),
        require_election: row.get("require_election"),
        status: ca_event_status_from_label(row.get::<String, _>("status").as_str())?,
        lifecycle: lifecycle_from_label(row.get::<String, _>("lifecycle").as_str())?,
    })
}

fn row_to_ca_election(row: sqlx::postgres::PgRow) -> Result<CaElection, CoreError> {
    Ok(CaElection {
        ca_event_id: CaEventId(row.get("ca_event_id")),
        portfolio_id: PortfolioId(row.get("portfolio_id")),
        choice: ca_choice_from_label(row.get::<String, _>("choice").as_str())?,
    })
}

fn row_to_ca_portfolio_rule(row: sqlx::postgres::PgRow) -> Result<CaPortfolioRule, CoreError> {
    Ok(CaPortfolioRule {
        portfolio_id: PortfolioId(row.get("portfolio_id")),
        ca_type: ca_type_from_label(row.get::<String, _>("ca_type").as_str())?,
        require_election: row.get("require_election"),
    })
}
