//! Deal adjustment planner (C5): computes the reversal/replacement legs for
//! a deal-block modify or delete. Pure computation, no `Store` access — the
//! caller supplies the block's current active allocations and each touched
//! portfolio's reporting currency, and is responsible for FX-converting
//! `qc_gross_amount` into `rc_gross_amount` before persisting (see
//! [`crate::service::convert_to_report_currency`]).
//!
//! Grounded on `_create_deal_adjustment_stagings` in
//! `original_source/backend/app/api/staging.py`: modify reverses every
//! currently active allocation in full and replaces it with the caller's
//! target allocations (not a bare delta), so that every touched portfolio
//! gets a full reversal/replacement audit trail even when its quantity is
//! unchanged; delete reverses every currently active allocation and marks
//! the block deleted.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::decimal::{allocate_with_residual, gross_amount};
use crate::model::{DealAllocation, DealBlockId, InstrumentId, Lifecycle, PortfolioId, SourceSystem};
use crate::store::{DealAdjustmentPlan, DealPlanLeg};

/// Which deal-adjustment operation is being planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentMode {
    /// `PATCH /staging-transactions/deals/{id}`.
    Modify,
    /// `DELETE /staging-transactions/deals/{id}`.
    Delete,
}

/// The block-level facts an adjustment plan needs, read once from the
/// existing `DealBlock` row.
#[derive(Debug, Clone)]
pub struct DealAdjustmentContext {
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
}

struct PlannedLeg {
    portfolio_id: PortfolioId,
    quantity: Decimal,
    source_system: SourceSystem,
    allocation_lifecycle: Lifecycle,
}

/// Stateless planner for C5.
pub struct DealAdjustmentPlanner;

impl DealAdjustmentPlanner {
    /// Build the `Store::apply_deal_adjustment` input for a modify or
    /// delete. `target_qty_by_portfolio` is empty for `Delete`; for
    /// `Modify` it is the caller's signed per-portfolio target quantities
    /// (already validated to sum to the caller's total).
    pub fn plan(
        ctx: &DealAdjustmentContext,
        mode: AdjustmentMode,
        current_active: &[DealAllocation],
        target_qty_by_portfolio: &BTreeMap<PortfolioId, Decimal>,
        report_currency_of: &BTreeMap<PortfolioId, String>,
    ) -> DealAdjustmentPlan {
        let mut current_qty_by_portfolio: BTreeMap<PortfolioId, Decimal> = BTreeMap::new();
        for allocation in current_active {
            *current_qty_by_portfolio
                .entry(allocation.portfolio_id)
                .or_insert(Decimal::ZERO) += allocation.quantity;
        }

        let mut legs: Vec<PlannedLeg> = Vec::new();
        match mode {
            AdjustmentMode::Modify => {
                for (&portfolio_id, &qty) in current_qty_by_portfolio.iter() {
                    if qty != Decimal::ZERO {
                        legs.push(PlannedLeg {
                            portfolio_id,
                            quantity: -qty,
                            source_system: SourceSystem::ModifyReversal,
                            allocation_lifecycle: Lifecycle::Deleted,
                        });
                    }
                }
                for (&portfolio_id, &qty) in target_qty_by_portfolio.iter() {
                    if qty != Decimal::ZERO {
                        legs.push(PlannedLeg {
                            portfolio_id,
                            quantity: qty,
                            source_system: SourceSystem::ModifyReplacement,
                            allocation_lifecycle: Lifecycle::Active,
                        });
                    }
                }
            }
            AdjustmentMode::Delete => {
                for (&portfolio_id, &qty) in current_qty_by_portfolio.iter() {
                    if qty != Decimal::ZERO {
                        legs.push(PlannedLeg {
                            portfolio_id,
                            quantity: -qty,
                            source_system: SourceSystem::DeleteReversal,
                            allocation_lifecycle: Lifecycle::Deleted,
                        });
                    }
                }
            }
        }

        let abs_quantities: Vec<Decimal> = legs.iter().map(|l| l.quantity.abs()).collect();
        let total_abs_qty: Decimal = abs_quantities.iter().sum();
        let block_amount_qc = gross_amount(total_abs_qty, ctx.price);
        let raw_parts: Vec<Decimal> = abs_quantities.iter().map(|q| q * ctx.price).collect();
        let (allocation_amounts_qc, rounding_adjustment_index) =
            allocate_with_residual(total_abs_qty * ctx.price, &raw_parts);

        let block_delta_quantity: Decimal = legs.iter().map(|l| l.quantity).sum();

        let plan_legs: Vec<DealPlanLeg> = legs
            .into_iter()
            .enumerate()
            .map(|(idx, leg)| {
                let qc_gross_amount = allocation_amounts_qc
                    .get(idx)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                let report_currency = report_currency_of
                    .get(&leg.portfolio_id)
                    .cloned()
                    .unwrap_or_else(|| ctx.quote_currency.clone());
                DealPlanLeg {
                    portfolio_id: leg.portfolio_id,
                    quantity: leg.quantity,
                    source_system: Some(leg.source_system),
                    allocation_lifecycle: leg.allocation_lifecycle,
                    is_rounding_adjustment: rounding_adjustment_index == Some(idx),
                    qc_gross_amount,
                    rc_gross_amount: qc_gross_amount,
                    report_currency,
                }
            })
            .collect();

        let new_block_quantity = match mode {
            AdjustmentMode::Modify => target_qty_by_portfolio.values().copied().sum(),
            AdjustmentMode::Delete => Decimal::ZERO,
        };

        DealAdjustmentPlan {
            deal_block_id: ctx.deal_block_id,
            instrument_id: ctx.instrument_id,
            trade_date: ctx.trade_date,
            settle_date: ctx.settle_date,
            quote_currency: ctx.quote_currency.clone(),
            price: ctx.price,
            block_delta_quantity,
            block_amount_qc,
            new_block_quantity,
            mark_block_deleted: matches!(mode, AdjustmentMode::Delete),
            legs: plan_legs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ctx() -> DealAdjustmentContext {
        DealAdjustmentContext {
            deal_block_id: DealBlockId(1),
            instrument_id: InstrumentId(1),
            trade_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            settle_date: None,
            quote_currency: "USD".to_string(),
            price: dec!(10),
        }
    }

    fn allocation(portfolio_id: i64, quantity: Decimal) -> DealAllocation {
        DealAllocation {
            id: crate::model::DealAllocationId(portfolio_id),
            block_id: DealBlockId(1),
            portfolio_id: PortfolioId(portfolio_id),
            quantity,
            price: dec!(10),
            is_rounding_adjustment: false,
            lifecycle: Lifecycle::Active,
        }
    }

    #[test]
    fn test_modify_emits_full_reversal_and_replacement_even_when_unchanged() {
        let current = vec![allocation(1, dec!(100))];
        let mut target = BTreeMap::new();
        target.insert(PortfolioId(1), dec!(100));
        let mut currencies = BTreeMap::new();
        currencies.insert(PortfolioId(1), "USD".to_string());

        let plan = DealAdjustmentPlanner::plan(
            &ctx(),
            AdjustmentMode::Modify,
            &current,
            &target,
            &currencies,
        );

        assert_eq!(plan.legs.len(), 2);
        assert_eq!(plan.legs[0].quantity, dec!(-100));
        assert_eq!(plan.legs[0].source_system, Some(SourceSystem::ModifyReversal));
        assert_eq!(plan.legs[1].quantity, dec!(100));
        assert_eq!(plan.legs[1].source_system, Some(SourceSystem::ModifyReplacement));
        assert_eq!(plan.new_block_quantity, dec!(100));
        assert!(!plan.mark_block_deleted);
    }

    #[test]
    fn test_delete_reverses_every_active_allocation_and_zeroes_block() {
        let current = vec![allocation(1, dec!(60)), allocation(2, dec!(40))];
        let target = BTreeMap::new();
        let currencies = BTreeMap::new();

        let plan = DealAdjustmentPlanner::plan(
            &ctx(),
            AdjustmentMode::Delete,
            &current,
            &target,
            &currencies,
        );

        assert_eq!(plan.legs.len(), 2);
        assert!(plan.legs.iter().all(|l| l.allocation_lifecycle == Lifecycle::Deleted));
        assert_eq!(plan.block_delta_quantity, dec!(-100));
        assert_eq!(plan.new_block_quantity, Decimal::ZERO);
        assert!(plan.mark_block_deleted);
    }

    #[test]
    fn test_residual_absorbed_by_largest_leg() {
        let current = vec![allocation(1, dec!(33.34)), allocation(2, dec!(66.66))];
        let target = BTreeMap::new();
        let currencies = BTreeMap::new();

        let plan = DealAdjustmentPlanner::plan(
            &ctx(),
            AdjustmentMode::Delete,
            &current,
            &target,
            &currencies,
        );

        let sum: Decimal = plan.legs.iter().map(|l| l.qc_gross_amount).sum();
        assert_eq!(sum, plan.block_amount_qc);
    }
}
