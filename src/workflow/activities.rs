//! Trade-lifecycle activities (C6/C7): idempotent state-machine steps
//! invoked by [`crate::workflow::orchestrator::TradeLifecycleOrchestrator`].
//!
//! Every activity is wrapped in [`with_idempotency`], scoped per
//! `(pending_trade_id, target_status)`, so a retried call — whether retried
//! by the orchestrator after a timeout or replayed after a crash — returns
//! the cached result rather than re-posting a journal entry or re-applying a
//! position delta. The `trade.status == from` check inside each `_once`
//! helper is a second line of defense against the same hazard, in case two
//! calls for the same transition ever race the idempotency claim.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::decimal::{gross_amount, round_money};
use crate::error::CoreError;
use crate::idempotency::with_idempotency;
use crate::model::{
    DrCr, EntryRole, JournalEntry, JournalEntryLine, Level, Lifecycle, PendingTrade,
    PendingTradeId, PositionCacheEntry, SourceSystem, Status, TradeType,
};
use crate::service::position_cache::PositionCache;
use crate::store::Store;

/// Shared return shape for every lifecycle activity.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ActivityResult {
    /// Trade the activity acted on.
    pub pending_trade_id: PendingTradeId,
    /// Status after the call (may already have been there on a retry).
    pub status: Status,
    /// The trade's audit counter after the call.
    pub entry_version: i64,
}

/// The four C6 activities, bound to owned store/cache handles so they can
/// keep running inside a spawned orchestrator task after the HTTP request
/// that started it has returned.
pub struct TradeActivities {
    store: Arc<dyn Store>,
    cache: Arc<dyn PositionCache>,
}

impl TradeActivities {
    /// Bind activities to a store and cache for the lifetime of a workflow run.
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn PositionCache>) -> Self {
        Self { store, cache }
    }

    async fn load_active(store: &dyn Store, id: PendingTradeId) -> Result<PendingTrade, CoreError> {
        let trade = store
            .get_pending_trade(id)
            .await?
            .ok_or(CoreError::NotFound("not_found"))?;
        if trade.lifecycle != Lifecycle::Active {
            return Err(CoreError::LifecycleNotActive);
        }
        Ok(trade)
    }

    async fn result_for(store: &dyn Store, id: PendingTradeId) -> Result<ActivityResult, CoreError> {
        let trade = store
            .get_pending_trade(id)
            .await?
            .ok_or(CoreError::NotFound("not_found"))?;
        Ok(ActivityResult {
            pending_trade_id: id,
            status: trade.status,
            entry_version: trade.entry_version,
        })
    }

    /// `entry -> pre_check`: the only gate on whether a trade is postable.
    pub async fn precheck(&self, id: PendingTradeId) -> Result<ActivityResult, CoreError> {
        let store = self.store.clone();
        let key = format!("{id}:to:pre_check");
        with_idempotency(
            store.as_ref(),
            "activity:advance_status",
            Some(&key),
            &id.value(),
            move || async move { Self::precheck_once(store.as_ref(), id).await },
        )
        .await
    }

    async fn precheck_once(store: &dyn Store, id: PendingTradeId) -> Result<ActivityResult, CoreError> {
        let trade = Self::load_active(store, id).await?;
        if trade.status == Status::Entry {
            if trade.quantity.is_zero() {
                return Err(CoreError::Validation {
                    field: "quantity",
                    reason: "must be nonzero".to_string(),
                });
            }
            if trade.price <= Decimal::ZERO {
                return Err(CoreError::Validation {
                    field: "price",
                    reason: "must be positive".to_string(),
                });
            }
            store.advance_status(id, Status::Entry, Status::PreCheck).await?;
        } else {
            store.advance_status(id, Status::Entry, Status::PreCheck).await?;
        }
        Self::result_for(store, id).await
    }

    /// `pre_check -> position`: posts the journal entry and position delta
    /// the trade represents.
    pub async fn post_position(&self, id: PendingTradeId) -> Result<ActivityResult, CoreError> {
        let store = self.store.clone();
        let cache = self.cache.clone();
        let key = format!("{id}:to:position");
        with_idempotency(
            store.as_ref(),
            "activity:advance_status",
            Some(&key),
            &id.value(),
            move || async move { Self::post_position_once(store.as_ref(), cache.as_ref(), id).await },
        )
        .await
    }

    async fn post_position_once(
        store: &dyn Store,
        cache: &dyn PositionCache,
        id: PendingTradeId,
    ) -> Result<ActivityResult, CoreError> {
        let trade = Self::load_active(store, id).await?;

        if trade.status == Status::PreCheck {
            let portfolio_id = trade
                .portfolio_id
                .ok_or(CoreError::InvariantBreach("portfolio_id_missing"))?;

            let amount = if trade.qc_gross_amount.is_zero() {
                gross_amount(trade.quantity, trade.price)
            } else {
                trade.qc_gross_amount
            };
            let signed_amount = if trade.quantity >= Decimal::ZERO { amount } else { -amount };
            let signed_amount = round_money(signed_amount);

            let entry_role = match trade.source_system {
                Some(SourceSystem::ModifyReversal) | Some(SourceSystem::DeleteReversal) => {
                    EntryRole::Reversal
                }
                Some(SourceSystem::ModifyReplacement) => EntryRole::Replacement,
                None => EntryRole::Normal,
            };

            let mut reversal_of_entry_id = None;
            let mut replacement_of_entry_id = None;
            if entry_role != EntryRole::Normal {
                if let Some(deal_block_id) = trade.deal_block_id {
                    if let Some(prior) = store.find_latest_normal_entry_for_block(deal_block_id).await? {
                        match entry_role {
                            EntryRole::Reversal => reversal_of_entry_id = Some(prior.id),
                            EntryRole::Replacement => replacement_of_entry_id = Some(prior.id),
                            EntryRole::Normal => {}
                        }
                    }
                }
            }

            let entry = JournalEntry {
                id: crate::model::JournalEntryId(0),
                pending_trade_id: Some(id),
                deal_block_id: trade.deal_block_id,
                deal_allocation_id: trade.deal_allocation_id,
                effective_date: trade.trade_date,
                posted_at: chrono::Utc::now(),
                trade_type: TradeType::from_quantity(trade.quantity),
                entry_role,
                reversal_of_entry_id,
                replacement_of_entry_id,
                description: format!("pending_trade={id}"),
            };
            let line = JournalEntryLine {
                entry_id: crate::model::JournalEntryId(0),
                portfolio_id,
                instrument_id: trade.instrument_id,
                account_code: crate::constants::account_codes::POSITION.to_string(),
                drcr: DrCr::from_signed(trade.quantity),
                quantity: Some(trade.quantity),
                amount: signed_amount,
                currency: trade.quote_currency.clone(),
            };
            let entry_id = store.insert_journal_entry(entry, vec![line]).await?;

            let position = store
                .upsert_position_current(portfolio_id, trade.instrument_id, trade.quantity, None, entry_id)
                .await?;

            cache
                .set_position(
                    portfolio_id,
                    trade.instrument_id,
                    &PositionCacheEntry {
                        quantity: position.quantity,
                        version_uuid: position.version_uuid,
                        updated_at: position.updated_at,
                        source: "db".to_string(),
                    },
                )
                .await;
        }

        store.advance_status(id, Status::PreCheck, Status::Position).await?;
        Self::result_for(store, id).await
    }

    /// `position -> allocated`: validates the allocation carries an owning
    /// portfolio. No further side effects — allocation ownership is already
    /// fixed by the deal-block/allocation model.
    pub async fn allocate(&self, id: PendingTradeId) -> Result<ActivityResult, CoreError> {
        let store = self.store.clone();
        let key = format!("{id}:to:allocated");
        with_idempotency(
            store.as_ref(),
            "activity:advance_status",
            Some(&key),
            &id.value(),
            move || async move { Self::allocate_once(store.as_ref(), id).await },
        )
        .await
    }

    async fn allocate_once(store: &dyn Store, id: PendingTradeId) -> Result<ActivityResult, CoreError> {
        let trade = Self::load_active(store, id).await?;
        if trade.status == Status::Position && trade.level == Level::Allocation && trade.portfolio_id.is_none() {
            return Err(CoreError::InvariantBreach("allocation_portfolio_missing"));
        }
        store.advance_status(id, Status::Position, Status::Allocated).await?;
        Self::result_for(store, id).await
    }

    /// `allocated -> settled`: terminal transition, validation-only.
    pub async fn settle(&self, id: PendingTradeId) -> Result<ActivityResult, CoreError> {
        let store = self.store.clone();
        let key = format!("{id}:to:settled");
        with_idempotency(
            store.as_ref(),
            "activity:advance_status",
            Some(&key),
            &id.value(),
            move || async move { Self::settle_once(store.as_ref(), id).await },
        )
        .await
    }

    async fn settle_once(store: &dyn Store, id: PendingTradeId) -> Result<ActivityResult, CoreError> {
        Self::load_active(store, id).await?;
        store.advance_status(id, Status::Allocated, Status::Settled).await?;
        Self::result_for(store, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Instrument, InstrumentType, Portfolio, PortfolioId};
    use crate::service::position_cache::NoopPositionCache;
    use crate::store::memory::MemoryStore;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn activities() -> (Arc<MemoryStore>, TradeActivities) {
        let store = Arc::new(MemoryStore::new());
        store.seed_portfolio(Portfolio {
            id: PortfolioId(1),
            report_currency: "USD".to_string(),
        });
        store.seed_instrument(Instrument {
            id: crate::model::InstrumentId(1),
            instrument_type: InstrumentType::Stock,
            quote_currency: "USD".to_string(),
            security_id: "AAPL".to_string(),
            subtype: None,
        });
        let activities = TradeActivities::new(store.clone(), Arc::new(NoopPositionCache));
        (store, activities)
    }

    async fn seed_trade(store: &MemoryStore) -> PendingTradeId {
        let trade = PendingTrade {
            id: PendingTradeId(0),
            level: Level::Block,
            deal_block_id: None,
            deal_allocation_id: None,
            portfolio_id: Some(PortfolioId(1)),
            instrument_id: crate::model::InstrumentId(1),
            trade_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            settle_date: None,
            quantity: dec!(100),
            price: dec!(10),
            quote_currency: "USD".to_string(),
            report_currency: "USD".to_string(),
            qc_gross_amount: dec!(1000.00),
            rc_gross_amount: dec!(1000.00),
            status: Status::Entry,
            lifecycle: Lifecycle::Active,
            entry_version: 1,
            source_system: None,
        };
        store.insert_pending_trade(trade).await.unwrap().id
    }

    #[tokio::test]
    async fn test_precheck_rejects_zero_quantity() {
        let (store, activities) = activities();
        let id = seed_trade(&store).await;
        store
            .patch_pending_trade(
                id,
                crate::store::PendingTradePatch {
                    quantity: Some(Decimal::ZERO),
                    ..Default::default()
                },
                None,
                None,
            )
            .await
            .unwrap();

        let err = activities.precheck(id).await.unwrap_err();
        assert_eq!(err.machine_code(), "invalid_quantity");
    }

    #[tokio::test]
    async fn test_full_lifecycle_advances_through_every_status() {
        let (store, activities) = activities();
        let id = seed_trade(&store).await;

        let after_precheck = activities.precheck(id).await.unwrap();
        assert_eq!(after_precheck.status, Status::PreCheck);

        let after_position = activities.post_position(id).await.unwrap();
        assert_eq!(after_position.status, Status::Position);

        let position = store
            .get_position_current(PortfolioId(1), crate::model::InstrumentId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(position.quantity, dec!(100));

        let after_allocate = activities.allocate(id).await.unwrap();
        assert_eq!(after_allocate.status, Status::Allocated);

        let after_settle = activities.settle(id).await.unwrap();
        assert_eq!(after_settle.status, Status::Settled);
    }

    #[tokio::test]
    async fn test_post_position_is_idempotent_on_retry() {
        let (store, activities) = activities();
        let id = seed_trade(&store).await;
        activities.precheck(id).await.unwrap();

        activities.post_position(id).await.unwrap();
        activities.post_position(id).await.unwrap();

        let position = store
            .get_position_current(PortfolioId(1), crate::model::InstrumentId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(position.quantity, dec!(100));
    }
}
