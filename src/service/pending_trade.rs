//! Pending-trade service (C4): the single-staging CRUD surface plus deal
//! creation. Grounded on `original_source/backend/app/api/staging.py`'s
//! `create_staging_transaction`, `get_staging_transaction`,
//! `update_staging_transaction`, and `create_deal_staging_transactions`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{allocate_with_residual, gross_amount};
use crate::error::CoreError;
use crate::idempotency::with_idempotency;
use crate::model::{
    DealBlockId, InstrumentId, Level, Lifecycle, PendingTrade, PendingTradeId, PortfolioId, Status,
    TransactionType,
};
use crate::service::deal_planner::{AdjustmentMode, DealAdjustmentContext, DealAdjustmentPlanner};
use crate::service::{convert_to_report_currency, parse_decimal, parse_positive_id, validate_currency};
use crate::store::{DealAdjustmentResult, NewDeal, NewDealAllocation, PendingTradePatch, Store};

/// `POST /staging-transactions` request body, with ids/decimals still as
/// wire strings — parsing happens inside the service so the `invalid_<field>`
/// machine codes are produced in one place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStagingRequest {
    /// Standalone vs. deal block/allocation.
    pub level: Level,
    /// Owning portfolio, required at `Level::Allocation`.
    pub portfolio_id: Option<String>,
    /// Traded instrument.
    pub instrument_id: String,
    /// Trade date.
    pub trade_date: NaiveDate,
    /// Optional contractual settle date.
    pub settle_date: Option<NaiveDate>,
    /// Signed quantity, as a decimal string.
    pub quantity: String,
    /// Price, as a decimal string.
    pub price: String,
    /// Quote currency of the traded instrument.
    pub quote_currency: String,
    /// Reporting currency of the owning portfolio.
    pub report_currency: String,
}

/// `PATCH /staging-transactions/{id}` request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStagingRequest {
    /// New trade date, if supplied.
    pub trade_date: Option<NaiveDate>,
    /// New settle date, if supplied.
    pub settle_date: Option<NaiveDate>,
    /// New quantity, as a decimal string, if supplied.
    pub quantity: Option<String>,
    /// New price, as a decimal string, if supplied.
    pub price: Option<String>,
}

/// `{id, status, lifecycle, entry_version}`: the response shape shared by
/// create/get/patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingView {
    /// The staging row's id.
    pub id: PendingTradeId,
    /// Current lifecycle-pipeline status.
    pub status: Status,
    /// Active / cancelled / deleted.
    pub lifecycle: Lifecycle,
    /// Monotonic per-row counter.
    pub entry_version: i64,
}

impl From<&PendingTrade> for StagingView {
    fn from(trade: &PendingTrade) -> Self {
        StagingView {
            id: trade.id,
            status: trade.status,
            lifecycle: trade.lifecycle,
            entry_version: trade.entry_version,
        }
    }
}

/// One allocation leg of a `POST /staging-transactions/deals` request.
#[derive(Debug, Clone, Deserialize)]
pub struct DealAllocationInput {
    /// Receiving portfolio.
    pub portfolio_id: String,
    /// Unsigned (or any-signed; only the magnitude is used) allocation
    /// quantity, as a decimal string.
    pub quantity: String,
}

/// `POST /staging-transactions/deals` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDealStagingRequest {
    /// BUY/SELL family; determines the sign applied to the absolute
    /// total/allocation quantities.
    pub transaction_type: TransactionType,
    /// Traded instrument.
    pub instrument_id: String,
    /// Trade date.
    pub trade_date: NaiveDate,
    /// Optional contractual settle date.
    pub settle_date: Option<NaiveDate>,
    /// Total quantity across all allocations, as a decimal string.
    pub quantity: String,
    /// Trade price, as a decimal string.
    pub price: String,
    /// Currency the block is traded in.
    pub quote_currency: String,
    /// Reporting currency carried onto the block-level pending trade.
    pub report_currency: String,
    /// Per-portfolio allotments; must be non-empty.
    pub allocations: Vec<DealAllocationInput>,
}

/// One allocation leg of a `CreateDealStagingResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealAllocationStagingView {
    /// Receiving portfolio.
    pub portfolio_id: PortfolioId,
    /// Signed allocation quantity.
    pub quantity: Decimal,
    /// This leg's gross amount in quote currency.
    pub amount_qc: Decimal,
    /// The allocation's pending-trade id.
    pub staging_id: PendingTradeId,
}

/// `POST /staging-transactions/deals` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDealStagingView {
    /// The block-level pending trade's id.
    pub block_staging_id: PendingTradeId,
    /// The newly created deal block's id.
    pub deal_block_id: DealBlockId,
    /// The block's gross amount in quote currency.
    pub block_amount_qc: Decimal,
    /// Each allocation leg.
    pub allocation_stagings: Vec<DealAllocationStagingView>,
}

/// One target allocation leg of a `PATCH /staging-transactions/deals/{id}`
/// request. Unlike [`DealAllocationInput`], `quantity` is the portfolio's
/// final signed quantity after the modify, not a magnitude to be signed by a
/// transaction type.
#[derive(Debug, Clone, Deserialize)]
pub struct ModifyDealAllocationInput {
    /// Receiving portfolio.
    pub portfolio_id: String,
    /// Target signed quantity, as a decimal string.
    pub quantity: String,
}

/// `PATCH /staging-transactions/deals/{deal_block_id}` request body. Every
/// portfolio the caller wants holding a nonzero position after the modify
/// must be listed, even if its quantity is unchanged — C5 always emits a
/// full reversal/replacement pair for every touched portfolio.
#[derive(Debug, Clone, Deserialize)]
pub struct ModifyDealRequest {
    /// Target per-portfolio allocations; duplicate portfolios are summed.
    pub allocations: Vec<ModifyDealAllocationInput>,
}

/// `PATCH`/`DELETE /staging-transactions/deals/{deal_block_id}` response
/// body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealAdjustmentView {
    /// The block-level pending trade created for this adjustment.
    pub block_staging_id: PendingTradeId,
    /// The adjusted deal block's id.
    pub deal_block_id: DealBlockId,
    /// Net quantity delta posted at the block level.
    pub block_delta_quantity: Decimal,
    /// Gross amount of the adjustment, in quote currency.
    pub block_amount_qc: Decimal,
    /// Each reversal/replacement leg.
    pub allocation_stagings: Vec<DealAllocationStagingView>,
}

impl DealAdjustmentView {
    fn from_result(deal_block_id: DealBlockId, result: DealAdjustmentResult) -> Self {
        DealAdjustmentView {
            block_staging_id: result.block_trade.id,
            deal_block_id,
            block_delta_quantity: result.block_trade.quantity,
            block_amount_qc: result.block_trade.qc_gross_amount,
            allocation_stagings: result
                .legs
                .into_iter()
                .map(|(allocation, trade)| DealAllocationStagingView {
                    portfolio_id: allocation.portfolio_id,
                    quantity: allocation.quantity,
                    amount_qc: trade.qc_gross_amount,
                    staging_id: trade.id,
                })
                .collect(),
        }
    }
}

/// Stateless service wrapping a borrowed `Store`.
#[derive(Clone, Copy)]
pub struct PendingTradeService<'a> {
    store: &'a dyn Store,
}

impl<'a> PendingTradeService<'a> {
    /// Construct a service bound to a store for the lifetime of one request.
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// `POST /staging-transactions`, idempotent on `Idempotency-Key`.
    pub async fn create_staging(
        &self,
        req: CreateStagingRequest,
        idempotency_key: Option<&str>,
    ) -> Result<StagingView, CoreError> {
        let store = self.store;
        let payload = req.clone();
        with_idempotency(store, "api:create_staging", idempotency_key, &payload, move || async move {
            Self::create_staging_once(store, req).await
        })
        .await
    }

    async fn create_staging_once(
        store: &dyn Store,
        req: CreateStagingRequest,
    ) -> Result<StagingView, CoreError> {
        let portfolio_id = match req.portfolio_id {
            Some(raw) => Some(PortfolioId(parse_positive_id(&raw, "portfolio_id")?)),
            None => None,
        };
        let instrument_id = InstrumentId(parse_positive_id(&req.instrument_id, "instrument_id")?);
        let quantity = parse_decimal(&req.quantity, "quantity")?;
        let price = parse_decimal(&req.price, "price")?;
        let quote_currency = validate_currency(&req.quote_currency, "quote_currency")?;
        let report_currency = validate_currency(&req.report_currency, "report_currency")?;

        if let Some(pid) = portfolio_id {
            store
                .get_portfolio(pid)
                .await?
                .ok_or(CoreError::NotFound("portfolio_not_found"))?;
        }
        store
            .get_instrument(instrument_id)
            .await?
            .ok_or(CoreError::NotFound("instrument_not_found"))?;

        let qc_gross_amount = gross_amount(quantity, price);
        let rc_gross_amount =
            convert_to_report_currency(store, qc_gross_amount, &quote_currency, &report_currency)
                .await?;

        let trade = PendingTrade {
            id: PendingTradeId(0),
            level: req.level,
            deal_block_id: None,
            deal_allocation_id: None,
            portfolio_id,
            instrument_id,
            trade_date: req.trade_date,
            settle_date: req.settle_date,
            quantity,
            price,
            quote_currency,
            report_currency,
            qc_gross_amount,
            rc_gross_amount,
            status: Status::Entry,
            lifecycle: Lifecycle::Active,
            entry_version: 1,
            source_system: None,
        };
        let inserted = store.insert_pending_trade(trade).await?;
        Ok(StagingView::from(&inserted))
    }

    /// `GET /staging-transactions/{id}`.
    pub async fn get_staging(&self, id: PendingTradeId) -> Result<StagingView, CoreError> {
        let trade = self
            .store
            .get_pending_trade(id)
            .await?
            .ok_or(CoreError::NotFound("not_found"))?;
        Ok(StagingView::from(&trade))
    }

    /// `PATCH /staging-transactions/{id}`. Requires `status = entry` and
    /// `lifecycle = active`; a patch with no fields set is a no-op read.
    pub async fn patch_staging(
        &self,
        id: PendingTradeId,
        req: UpdateStagingRequest,
        actor: Option<String>,
        reason: Option<String>,
    ) -> Result<StagingView, CoreError> {
        if req.trade_date.is_none()
            && req.settle_date.is_none()
            && req.quantity.is_none()
            && req.price.is_none()
        {
            return self.get_staging(id).await;
        }

        let patch = PendingTradePatch {
            trade_date: req.trade_date,
            settle_date: req.settle_date.map(Some),
            quantity: req
                .quantity
                .as_deref()
                .map(|raw| parse_decimal(raw, "quantity"))
                .transpose()?,
            price: req
                .price
                .as_deref()
                .map(|raw| parse_decimal(raw, "price"))
                .transpose()?,
        };

        let updated = self
            .store
            .patch_pending_trade(id, patch, actor, reason)
            .await?;
        Ok(StagingView::from(&updated))
    }

    /// `POST /staging-transactions/deals`: creates a new deal block, its
    /// block-level pending trade, and one allocation + pending trade per
    /// leg, applying the block/allocation residual rule (C1, invariant 2).
    pub async fn create_deal_staging(
        &self,
        req: CreateDealStagingRequest,
    ) -> Result<CreateDealStagingView, CoreError> {
        let store = self.store;

        let instrument_id = InstrumentId(parse_positive_id(&req.instrument_id, "instrument_id")?);
        store
            .get_instrument(instrument_id)
            .await?
            .ok_or(CoreError::NotFound("instrument_not_found"))?;

        if req.allocations.is_empty() {
            return Err(CoreError::Validation {
                field: "allocations",
                reason: "at least one allocation is required".to_string(),
            });
        }

        let total_qty_raw = parse_decimal(&req.quantity, "total_quantity")?;
        if total_qty_raw.is_zero() {
            return Err(CoreError::Validation {
                field: "total_quantity",
                reason: "must be nonzero".to_string(),
            });
        }
        let total_qty_abs = total_qty_raw.abs();

        let price = parse_decimal(&req.price, "price")?;
        if price <= Decimal::ZERO {
            return Err(CoreError::Validation {
                field: "price",
                reason: "must be positive".to_string(),
            });
        }

        let quote_currency = validate_currency(&req.quote_currency, "quote_currency")?;
        let report_currency = validate_currency(&req.report_currency, "report_currency")?;

        let mut portfolio_ids = Vec::with_capacity(req.allocations.len());
        let mut alloc_qty_abs = Vec::with_capacity(req.allocations.len());
        for item in &req.allocations {
            let portfolio_id = PortfolioId(parse_positive_id(&item.portfolio_id, "portfolio_id")?);
            let qty = parse_decimal(&item.quantity, "allocation_quantity")?.abs();
            if qty.is_zero() {
                return Err(CoreError::Validation {
                    field: "allocation_quantity",
                    reason: "must be nonzero".to_string(),
                });
            }
            portfolio_ids.push(portfolio_id);
            alloc_qty_abs.push(qty);
        }

        let alloc_total_abs: Decimal = alloc_qty_abs.iter().sum();
        if alloc_total_abs != total_qty_abs {
            return Err(CoreError::AllocationQuantityMismatch);
        }

        for &portfolio_id in &portfolio_ids {
            store
                .get_portfolio(portfolio_id)
                .await?
                .ok_or(CoreError::NotFound("portfolio_not_found"))?;
        }

        let sign = req.transaction_type.sign();
        let signed_total_qty = total_qty_abs * sign;

        let block_amount_qc = gross_amount(total_qty_abs, price);
        let raw_amounts: Vec<Decimal> = alloc_qty_abs.iter().map(|q| q * price).collect();
        let (allocation_amounts_qc, rounding_adjustment_index) =
            allocate_with_residual(total_qty_abs * price, &raw_amounts);

        let block_rc_gross_amount =
            convert_to_report_currency(store, block_amount_qc, &quote_currency, &report_currency)
                .await?;

        let mut allocations = Vec::with_capacity(portfolio_ids.len());
        for (idx, &portfolio_id) in portfolio_ids.iter().enumerate() {
            let portfolio = store
                .get_portfolio(portfolio_id)
                .await?
                .ok_or(CoreError::NotFound("portfolio_not_found"))?;
            let qc_gross_amount = allocation_amounts_qc[idx];
            let rc_gross_amount = convert_to_report_currency(
                store,
                qc_gross_amount,
                &quote_currency,
                &portfolio.report_currency,
            )
            .await?;
            allocations.push(NewDealAllocation {
                portfolio_id,
                quantity: alloc_qty_abs[idx] * sign,
                is_rounding_adjustment: rounding_adjustment_index == Some(idx),
                report_currency: portfolio.report_currency,
                qc_gross_amount,
                rc_gross_amount,
            });
        }

        let deal = NewDeal {
            instrument_id,
            trade_date: req.trade_date,
            settle_date: req.settle_date,
            quote_currency,
            report_currency,
            total_quantity: signed_total_qty,
            price,
            qc_gross_amount: block_amount_qc,
            rc_gross_amount: block_rc_gross_amount,
            allocations,
        };

        let result = store.create_deal(deal).await?;
        Ok(CreateDealStagingView {
            block_staging_id: result.block_trade.id,
            deal_block_id: result.block.id,
            block_amount_qc,
            allocation_stagings: result
                .allocations
                .into_iter()
                .map(|(allocation, trade)| DealAllocationStagingView {
                    portfolio_id: allocation.portfolio_id,
                    quantity: allocation.quantity,
                    amount_qc: trade.qc_gross_amount,
                    staging_id: trade.id,
                })
                .collect(),
        })
    }

    /// `PATCH /staging-transactions/deals/{deal_block_id}`: reverses every
    /// currently active allocation in full and replaces it with the
    /// caller's target allocations (C5, modify mode).
    pub async fn modify_deal_staging(
        &self,
        deal_block_id: DealBlockId,
        req: ModifyDealRequest,
    ) -> Result<DealAdjustmentView, CoreError> {
        let store = self.store;
        let block = store
            .get_deal_block(deal_block_id)
            .await?
            .ok_or(CoreError::NotFound("deal_block_not_found"))?;
        if block.lifecycle != Lifecycle::Active {
            return Err(CoreError::DealBlockNotActive);
        }
        if req.allocations.is_empty() {
            return Err(CoreError::Validation {
                field: "allocations",
                reason: "at least one allocation is required".to_string(),
            });
        }

        let mut target_qty_by_portfolio: BTreeMap<PortfolioId, Decimal> = BTreeMap::new();
        for item in &req.allocations {
            let portfolio_id = PortfolioId(parse_positive_id(&item.portfolio_id, "portfolio_id")?);
            let qty = parse_decimal(&item.quantity, "quantity")?;
            *target_qty_by_portfolio
                .entry(portfolio_id)
                .or_insert(Decimal::ZERO) += qty;
        }

        let current_active = store.list_active_allocations(deal_block_id).await?;

        let mut touched: BTreeSet<PortfolioId> = target_qty_by_portfolio.keys().copied().collect();
        touched.extend(current_active.iter().map(|a| a.portfolio_id));
        let mut report_currency_of: BTreeMap<PortfolioId, String> = BTreeMap::new();
        for portfolio_id in touched {
            let portfolio = store
                .get_portfolio(portfolio_id)
                .await?
                .ok_or(CoreError::NotFound("portfolio_not_found"))?;
            report_currency_of.insert(portfolio_id, portfolio.report_currency);
        }

        let ctx = DealAdjustmentContext {
            deal_block_id,
            instrument_id: block.instrument_id,
            trade_date: block.trade_date,
            settle_date: block.settle_date,
            quote_currency: block.trade_currency.clone(),
            price: block.price,
        };
        let plan = DealAdjustmentPlanner::plan(
            &ctx,
            AdjustmentMode::Modify,
            &current_active,
            &target_qty_by_portfolio,
            &report_currency_of,
        );

        let result = store.apply_deal_adjustment(plan).await?;
        Ok(DealAdjustmentView::from_result(deal_block_id, result))
    }

    /// `DELETE /staging-transactions/deals/{deal_block_id}`: reverses every
    /// currently active allocation and marks the block deleted (C5, delete
    /// mode).
    pub async fn delete_deal_staging(
        &self,
        deal_block_id: DealBlockId,
    ) -> Result<DealAdjustmentView, CoreError> {
        let store = self.store;
        let block = store
            .get_deal_block(deal_block_id)
            .await?
            .ok_or(CoreError::NotFound("deal_block_not_found"))?;
        if block.lifecycle != Lifecycle::Active {
            return Err(CoreError::DealBlockNotActive);
        }

        let current_active = store.list_active_allocations(deal_block_id).await?;

        let mut report_currency_of: BTreeMap<PortfolioId, String> = BTreeMap::new();
        for allocation in &current_active {
            if report_currency_of.contains_key(&allocation.portfolio_id) {
                continue;
            }
            let portfolio = store
                .get_portfolio(allocation.portfolio_id)
                .await?
                .ok_or(CoreError::NotFound("portfolio_not_found"))?;
            report_currency_of.insert(allocation.portfolio_id, portfolio.report_currency);
        }

        let ctx = DealAdjustmentContext {
            deal_block_id,
            instrument_id: block.instrument_id,
            trade_date: block.trade_date,
            settle_date: block.settle_date,
            quote_currency: block.trade_currency.clone(),
            price: block.price,
        };
        let plan = DealAdjustmentPlanner::plan(
            &ctx,
            AdjustmentMode::Delete,
            &current_active,
            &BTreeMap::new(),
            &report_currency_of,
        );

        let result = store.apply_deal_adjustment(plan).await?;
        Ok(DealAdjustmentView::from_result(deal_block_id, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Instrument, InstrumentType, Portfolio};
    use crate::store::memory::MemoryStore;
    use rust_decimal_macros::dec;

    fn store_with_fixtures() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed_portfolio(Portfolio {
            id: PortfolioId(1),
            report_currency: "USD".to_string(),
        });
        store.seed_portfolio(Portfolio {
            id: PortfolioId(2),
            report_currency: "USD".to_string(),
        });
        store.seed_instrument(Instrument {
            id: InstrumentId(1),
            instrument_type: InstrumentType::Stock,
            quote_currency: "USD".to_string(),
            security_id: "AAPL".to_string(),
            subtype: None,
        });
        store
    }

    fn staging_request() -> CreateStagingRequest {
        CreateStagingRequest {
            level: Level::Block,
            portfolio_id: Some("1".to_string()),
            instrument_id: "1".to_string(),
            trade_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            settle_date: None,
            quantity: "100".to_string(),
            price: "10.50".to_string(),
            quote_currency: "USD".to_string(),
            report_currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_staging_rejects_unknown_portfolio() {
        let store = store_with_fixtures();
        let service = PendingTradeService::new(&store);
        let mut req = staging_request();
        req.portfolio_id = Some("999".to_string());
        let err = service.create_staging(req, None).await.unwrap_err();
        assert_eq!(err.machine_code(), "portfolio_not_found");
    }

    #[tokio::test]
    async fn test_create_then_get_staging_round_trips() {
        let store = store_with_fixtures();
        let service = PendingTradeService::new(&store);
        let created = service.create_staging(staging_request(), None).await.unwrap();
        assert_eq!(created.status, Status::Entry);
        assert_eq!(created.entry_version, 1);

        let fetched = service.get_staging(created.id).await.unwrap();
        assert_eq!(fetched.id, created.id);
    }

    #[tokio::test]
    async fn test_create_staging_is_idempotent_on_key() {
        let store = store_with_fixtures();
        let service = PendingTradeService::new(&store);
        let key = Some("idem-key-1");
        let first = service
            .create_staging(staging_request(), key)
            .await
            .unwrap();
        let second = service
            .create_staging(staging_request(), key)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_patch_staging_with_no_fields_is_a_no_op() {
        let store = store_with_fixtures();
        let service = PendingTradeService::new(&store);
        let created = service.create_staging(staging_request(), None).await.unwrap();

        let patched = service
            .patch_staging(created.id, UpdateStagingRequest::default(), None, None)
            .await
            .unwrap();
        assert_eq!(patched.entry_version, created.entry_version);
    }

    #[tokio::test]
    async fn test_patch_staging_bumps_entry_version() {
        let store = store_with_fixtures();
        let service = PendingTradeService::new(&store);
        let created = service.create_staging(staging_request(), None).await.unwrap();

        let patched = service
            .patch_staging(
                created.id,
                UpdateStagingRequest {
                    quantity: Some("150".to_string()),
                    ..Default::default()
                },
                Some("trader1".to_string()),
                Some("fat finger fix".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(patched.entry_version, created.entry_version + 1);
    }

    #[tokio::test]
    async fn test_create_deal_staging_splits_amounts_with_residual() {
        let store = store_with_fixtures();
        let service = PendingTradeService::new(&store);
        let req = CreateDealStagingRequest {
            transaction_type: TransactionType::BuyEquity,
            instrument_id: "1".to_string(),
            trade_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            settle_date: None,
            quantity: "100".to_string(),
            price: "10".to_string(),
            quote_currency: "USD".to_string(),
            report_currency: "USD".to_string(),
            allocations: vec![
                DealAllocationInput {
                    portfolio_id: "1".to_string(),
                    quantity: "33.33".to_string(),
                },
                DealAllocationInput {
                    portfolio_id: "2".to_string(),
                    quantity: "66.67".to_string(),
                },
            ],
        };

        let result = service.create_deal_staging(req).await.unwrap();
        assert_eq!(result.block_amount_qc, dec!(1000.00));
        let sum: Decimal = result
            .allocation_stagings
            .iter()
            .map(|a| a.amount_qc)
            .sum();
        assert_eq!(sum, result.block_amount_qc);
    }

    #[tokio::test]
    async fn test_create_deal_staging_rejects_allocation_mismatch() {
        let store = store_with_fixtures();
        let service = PendingTradeService::new(&store);
        let req = CreateDealStagingRequest {
            transaction_type: TransactionType::BuyEquity,
            instrument_id: "1".to_string(),
            trade_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            settle_date: None,
            quantity: "100".to_string(),
            price: "10".to_string(),
            quote_currency: "USD".to_string(),
            report_currency: "USD".to_string(),
            allocations: vec![DealAllocationInput {
                portfolio_id: "1".to_string(),
                quantity: "50".to_string(),
            }],
        };

        let err = service.create_deal_staging(req).await.unwrap_err();
        assert_eq!(err.machine_code(), "allocation_quantity_mismatch");
    }

    #[tokio::test]
    async fn test_modify_deal_staging_emits_reversal_and_replacement() {
        let store = store_with_fixtures();
        let service = PendingTradeService::new(&store);
        let created = service
            .create_deal_staging(CreateDealStagingRequest {
                transaction_type: TransactionType::BuyEquity,
                instrument_id: "1".to_string(),
                trade_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                settle_date: None,
                quantity: "100".to_string(),
                price: "10".to_string(),
                quote_currency: "USD".to_string(),
                report_currency: "USD".to_string(),
                allocations: vec![DealAllocationInput {
                    portfolio_id: "1".to_string(),
                    quantity: "100".to_string(),
                }],
            })
            .await
            .unwrap();

        let adjusted = service
            .modify_deal_staging(
                created.deal_block_id,
                ModifyDealRequest {
                    allocations: vec![ModifyDealAllocationInput {
                        portfolio_id: "2".to_string(),
                        quantity: "100".to_string(),
                    }],
                },
            )
            .await
            .unwrap();

        assert_eq!(adjusted.allocation_stagings.len(), 2);
        assert_eq!(adjusted.allocation_stagings[0].portfolio_id, PortfolioId(1));
        assert_eq!(adjusted.allocation_stagings[0].quantity, dec!(-100));
        assert_eq!(adjusted.allocation_stagings[1].portfolio_id, PortfolioId(2));
        assert_eq!(adjusted.allocation_stagings[1].quantity, dec!(100));
    }

    #[tokio::test]
    async fn test_delete_deal_staging_reverses_every_active_allocation() {
        let store = store_with_fixtures();
        let service = PendingTradeService::new(&store);
        let created = service
            .create_deal_staging(CreateDealStagingRequest {
                transaction_type: TransactionType::BuyEquity,
                instrument_id: "1".to_string(),
                trade_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                settle_date: None,
                quantity: "100".to_string(),
                price: "10".to_string(),
                quote_currency: "USD".to_string(),
                report_currency: "USD".to_string(),
                allocations: vec![DealAllocationInput {
                    portfolio_id: "1".to_string(),
                    quantity: "100".to_string(),
                }],
            })
            .await
            .unwrap();

        let deleted = service
            .delete_deal_staging(created.deal_block_id)
            .await
            .unwrap();

        assert_eq!(deleted.allocation_stagings.len(), 1);
        assert_eq!(deleted.allocation_stagings[0].quantity, dec!(-100));
        assert_eq!(deleted.block_delta_quantity, dec!(-100));
    }

    #[tokio::test]
    async fn test_modify_deal_staging_rejects_inactive_block() {
        let store = store_with_fixtures();
        let service = PendingTradeService::new(&store);
        let created = service
            .create_deal_staging(CreateDealStagingRequest {
                transaction_type: TransactionType::BuyEquity,
                instrument_id: "1".to_string(),
                trade_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                settle_date: None,
                quantity: "100".to_string(),
                price: "10".to_string(),
                quote_currency: "USD".to_string(),
                report_currency: "USD".to_string(),
                allocations: vec![DealAllocationInput {
                    portfolio_id: "1".to_string(),
                    quantity: "100".to_string(),
                }],
            })
            .await
            .unwrap();
        service
            .delete_deal_staging(created.deal_block_id)
            .await
            .unwrap();

        let err = service
            .modify_deal_staging(
                created.deal_block_id,
                ModifyDealRequest {
                    allocations: vec![ModifyDealAllocationInput {
                        portfolio_id: "1".to_string(),
                        quantity: "50".to_string(),
                    }],
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.machine_code(), "deal_block_not_active");
    }
}
