//! Durable-workflow simulation (C6): an in-process orchestrator that drives
//! C7's activities to completion, with bounded retries and exponential
//! backoff on retryable failures.
//!
//! There is no external workflow runtime here — `WorkflowClient::start_*`
//! spawns a `tokio` task and returns a [`WorkflowHandle`] immediately, the
//! same "fire, hand back a handle, keep going in the background" shape the
//! teacher's `RateLimiter::wait_for_permission` retry loop models for a
//! single call. Each orchestrator method reuses that loop to retry an
//! activity across transient store/cache failures, classified via
//! [`CoreError::is_retryable`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::time::sleep;

use crate::constants::{MAX_ACTIVITY_ATTEMPTS, ACTIVITY_RETRY_BASE_DELAY_MS};
use crate::error::CoreError;
use crate::model::{CaEventId, PendingTradeId, PortfolioId};
use crate::service::corporate_action::CorporateActionService;
use crate::service::nav::NavService;
use crate::service::position_cache::PositionCache;
use crate::store::Store;
use crate::workflow::activities::TradeActivities;

/// Run `step` up to [`MAX_ACTIVITY_ATTEMPTS`] times, doubling the delay
/// after each retryable failure starting from [`ACTIVITY_RETRY_BASE_DELAY_MS`].
/// A non-retryable error (validation, not-found, invariant breach) returns
/// immediately without consuming further attempts.
async fn run_with_retries<T, F, Fut>(mut step: F) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0u32;
    let mut delay_ms = ACTIVITY_RETRY_BASE_DELAY_MS;
    loop {
        attempt += 1;
        match step().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < MAX_ACTIVITY_ATTEMPTS => {
                tracing::warn!(
                    attempt,
                    error = %err,
                    "workflow activity failed, retrying after backoff"
                );
                sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = delay_ms.saturating_mul(2);
            }
            Err(err) => return Err(err),
        }
    }
}

/// A handle to a workflow run that was started but whose completion is not
/// observed synchronously by the caller — the HTTP layer returns this handle
/// in a `202 Accepted` body and the caller polls the underlying entity's
/// status to see the outcome.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WorkflowHandle {
    /// Opaque identifier of the spawned run, for logging/correlation only.
    pub workflow_id: String,
}

/// Entry point the HTTP layer uses to kick off a durable workflow without
/// waiting for it to finish.
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    /// Start the C6 trade-lifecycle workflow for one pending trade.
    async fn start_trade_lifecycle(
        &self,
        pending_trade_id: PendingTradeId,
    ) -> Result<WorkflowHandle, CoreError>;

    /// Start the end-of-day ABOR NAV workflow for one portfolio/date.
    async fn start_abor_nav(
        &self,
        portfolio_id: PortfolioId,
        report_currency: String,
        asof_date: NaiveDate,
    ) -> Result<WorkflowHandle, CoreError>;

    /// Start per-holder corporate-action processing for one event.
    async fn start_corporate_action(
        &self,
        ca_event_id: CaEventId,
    ) -> Result<WorkflowHandle, CoreError>;
}

/// Drives a single pending trade through `precheck -> post_position ->
/// allocate -> settle`, stopping at the first non-retryable failure.
pub struct TradeLifecycleOrchestrator {
    activities: TradeActivities,
}

impl TradeLifecycleOrchestrator {
    /// Bind an orchestrator to a store/cache pair for the run's lifetime.
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn PositionCache>) -> Self {
        Self {
            activities: TradeActivities::new(store, cache),
        }
    }

    /// Run the full pipeline once. Each step retries independently; a step
    /// that exhausts its retries or fails validation aborts the run.
    pub async fn run(&self, pending_trade_id: PendingTradeId) -> Result<(), CoreError> {
        run_with_retries(|| self.activities.precheck(pending_trade_id)).await?;
        run_with_retries(|| self.activities.post_position(pending_trade_id)).await?;
        run_with_retries(|| self.activities.allocate(pending_trade_id)).await?;
        run_with_retries(|| self.activities.settle(pending_trade_id)).await?;
        Ok(())
    }
}

/// Drives the end-of-day ABOR NAV computation for one portfolio/date.
pub struct AborNavOrchestrator {
    store: Arc<dyn Store>,
}

impl AborNavOrchestrator {
    /// Bind an orchestrator to a store for the run's lifetime.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Snapshot positions, then compute and persist the ABOR NAV run,
    /// retrying on transient store failures.
    pub async fn run(
        &self,
        portfolio_id: PortfolioId,
        report_currency: String,
        asof_date: NaiveDate,
    ) -> Result<(), CoreError> {
        run_with_retries(|| async { self.store.snapshot_eod(portfolio_id, asof_date).await.map(|_| ()) })
            .await?;
        run_with_retries(|| async {
            let service = NavService::new(self.store.as_ref());
            service
                .compute_abor_nav(portfolio_id, &report_currency, asof_date)
                .await
                .map(|_| ())
        })
        .await
    }
}

/// Drives per-holder corporate-action processing for one event.
pub struct CorporateActionOrchestrator {
    store: Arc<dyn Store>,
}

impl CorporateActionOrchestrator {
    /// Bind an orchestrator to a store for the run's lifetime.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Process every eligible holder of the event's instrument, retrying on
    /// transient store failures.
    pub async fn run(&self, ca_event_id: CaEventId) -> Result<(), CoreError> {
        run_with_retries(|| async {
            let service = CorporateActionService::new(self.store.as_ref());
            service.process_event(ca_event_id).await.map(|_| ())
        })
        .await
    }
}

/// Spawns each orchestrator as a detached `tokio` task, returning a handle
/// immediately; failures surface only via logging and via the entity's own
/// status fields on subsequent reads, since there is no synchronous
/// round-trip back to the HTTP caller once the task is spawned.
pub struct InProcessWorkflowClient {
    store: Arc<dyn Store>,
    cache: Arc<dyn PositionCache>,
}

impl InProcessWorkflowClient {
    /// Build a client bound to the given store and cache.
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn PositionCache>) -> Self {
        Self { store, cache }
    }
}

#[async_trait]
impl WorkflowClient for InProcessWorkflowClient {
    async fn start_trade_lifecycle(
        &self,
        pending_trade_id: PendingTradeId,
    ) -> Result<WorkflowHandle, CoreError> {
        let orchestrator = TradeLifecycleOrchestrator::new(self.store.clone(), self.cache.clone());
        let workflow_id = format!("trade-lifecycle:{pending_trade_id}");
        let spawned_id = workflow_id.clone();
        tokio::spawn(async move {
            if let Err(err) = orchestrator.run(pending_trade_id).await {
                tracing::error!(workflow_id = %spawned_id, error = %err, "trade lifecycle workflow failed");
            }
        });
        Ok(WorkflowHandle { workflow_id })
    }

    async fn start_abor_nav(
        &self,
        portfolio_id: PortfolioId,
        report_currency: String,
        asof_date: NaiveDate,
    ) -> Result<WorkflowHandle, CoreError> {
        let orchestrator = AborNavOrchestrator::new(self.store.clone());
        let workflow_id = format!("abor-nav:{portfolio_id}:{asof_date}");
        let spawned_id = workflow_id.clone();
        tokio::spawn(async move {
            if let Err(err) = orchestrator.run(portfolio_id, report_currency, asof_date).await {
                tracing::error!(workflow_id = %spawned_id, error = %err, "abor nav workflow failed");
            }
        });
        Ok(WorkflowHandle { workflow_id })
    }

    async fn start_corporate_action(
        &self,
        ca_event_id: CaEventId,
    ) -> Result<WorkflowHandle, CoreError> {
        let orchestrator = CorporateActionOrchestrator::new(self.store.clone());
        let workflow_id = format!("corporate-action:{ca_event_id}");
        let spawned_id = workflow_id.clone();
        tokio::spawn(async move {
            if let Err(err) = orchestrator.run(ca_event_id).await {
                tracing::error!(workflow_id = %spawned_id, error = %err, "corporate action workflow failed");
            }
        });
        Ok(WorkflowHandle { workflow_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Instrument, InstrumentType, Lifecycle, Level, Portfolio, Status};
    use crate::service::position_cache::NoopPositionCache;
    use crate::store::memory::MemoryStore;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    async fn seed_store() -> (Arc<MemoryStore>, PendingTradeId) {
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
        let trade = crate::model::PendingTrade {
            id: PendingTradeId(0),
            level: Level::Block,
            deal_block_id: None,
            deal_allocation_id: None,
            portfolio_id: Some(PortfolioId(1)),
            instrument_id: crate::model::InstrumentId(1),
            trade_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            settle_date: None,
            quantity: dec!(50),
            price: dec!(20),
            quote_currency: "USD".to_string(),
            report_currency: "USD".to_string(),
            qc_gross_amount: dec!(1000.00),
            rc_gross_amount: dec!(1000.00),
            status: Status::Entry,
            lifecycle: Lifecycle::Active,
            entry_version: 1,
            source_system: None,
        };
        let id = store.insert_pending_trade(trade).await.unwrap().id;
        (store, id)
    }

    #[tokio::test]
    async fn test_trade_lifecycle_orchestrator_runs_to_settled() {
        let (store, id) = seed_store().await;
        let orchestrator = TradeLifecycleOrchestrator::new(store.clone(), Arc::new(NoopPositionCache));
        orchestrator.run(id).await.unwrap();

        let trade = store.get_pending_trade(id).await.unwrap().unwrap();
        assert_eq!(trade.status, Status::Settled);
    }

    #[tokio::test]
    async fn test_in_process_client_returns_handle_without_blocking_on_completion() {
        let (store, id) = seed_store().await;
        let client = InProcessWorkflowClient::new(store.clone(), Arc::new(NoopPositionCache));
        let handle = client.start_trade_lifecycle(id).await.unwrap();
        assert_eq!(handle.workflow_id, format!("trade-lifecycle:{id}"));
    }
}
