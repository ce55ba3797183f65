//! Back office constants

/// Scale (decimal places) used for persisted money amounts.
pub const MONEY_SCALE: u32 = 2;

/// Scale used for trade quantities.
pub const QUANTITY_SCALE: u32 = 10;

/// Scale used for prices and rates.
pub const PRICE_SCALE: u32 = 12;

/// Maximum number of retry attempts per workflow activity.
pub const MAX_ACTIVITY_ATTEMPTS: u32 = 10;

/// Base backoff delay between activity retry attempts; doubled on each attempt.
pub const ACTIVITY_RETRY_BASE_DELAY_MS: u64 = 200;

/// Start-to-close timeout budgets per activity, matching the lifecycle workflow's retry policy.
pub mod activity_timeouts {
    use std::time::Duration;

    /// `precheck` activity timeout.
    pub const PRECHECK: Duration = Duration::from_secs(30);
    /// `post_position` activity timeout.
    pub const POST_POSITION: Duration = Duration::from_secs(60);
    /// `allocate` activity timeout.
    pub const ALLOCATE: Duration = Duration::from_secs(60);
    /// `settle` activity timeout.
    pub const SETTLE: Duration = Duration::from_secs(60);
    /// ABOR snapshot/compute activity timeout.
    pub const ABOR_STEP: Duration = Duration::from_secs(120);
    /// Corporate-action processing activity timeout.
    pub const CORPORATE_ACTION: Duration = Duration::from_secs(300);
}

/// Journal account codes in use by the lifecycle and corporate-action engines.
pub mod account_codes {
    /// Position leg of a trade posting.
    pub const POSITION: &str = "POSITION";
    /// Cash leg of a dividend posting.
    pub const CASH: &str = "CASH";
    /// Dividend income leg of a dividend posting.
    pub const DIVIDEND_INCOME: &str = "DIVIDEND_INCOME";
    /// Share-count adjustment leg of a stock-split posting.
    pub const STOCK_SPLIT: &str = "STOCK_SPLIT";
}

/// Security id prefix used for auto-provisioned cash instruments (`CASH_{CCY}`).
pub const CASH_SECURITY_ID_PREFIX: &str = "CASH_";

/// HTTP surface route paths, grouped the way the teacher groups its endpoint
/// constants. Path parameters use axum 0.7's `:param` matchit syntax.
pub mod routes {
    /// Staging transactions collection.
    pub const STAGING_TRANSACTIONS: &str = "/staging-transactions";
    /// Single staging transaction by id.
    pub const STAGING_TRANSACTION_BY_ID: &str = "/staging-transactions/:id";
    /// Kick off the trade-lifecycle workflow for a staging transaction.
    pub const STAGING_TRANSACTION_PROCESS: &str = "/staging-transactions/:id/process";
    /// Deal-block staging collection.
    pub const DEALS: &str = "/staging-transactions/deals";
    /// Single deal block by id.
    pub const DEAL_BY_ID: &str = "/staging-transactions/deals/:deal_block_id";
    /// Kick off workflows for every allocation under a deal block.
    pub const DEAL_PROCESS: &str = "/staging-transactions/deals/:block_staging_id/process";
    /// Intra-day NAV for a portfolio.
    pub const NAV_IBOR: &str = "/nav/ibor/:portfolio_id";
    /// Intra-day NAV snapshot.
    pub const NAV_IBOR_SNAPSHOT: &str = "/nav/ibor/:portfolio_id/snapshot";
    /// Kick off the end-of-day NAV workflow for a portfolio.
    pub const NAV_ABOR_RUN: &str = "/nav/abor/:portfolio_id/run";
    /// Read back a completed end-of-day NAV result.
    pub const NAV_ABOR_RESULT: &str = "/nav/abor/:portfolio_id/result";
    /// Corporate-action event collection.
    pub const CORPORATE_ACTIONS: &str = "/corporate-actions";
    /// Single corporate-action event by id.
    pub const CORPORATE_ACTION_BY_ID: &str = "/corporate-actions/:id";
    /// Submit a portfolio election for a corporate-action event.
    pub const CORPORATE_ACTION_ELECTIONS: &str = "/corporate-actions/:id/elections";
    /// Kick off per-holder processing for a corporate-action event.
    pub const CORPORATE_ACTION_PROCESS: &str = "/corporate-actions/:id/process";
}

/// HTTP headers the staging API reads.
pub mod headers {
    /// Client-supplied idempotency token.
    pub const IDEMPOTENCY_KEY: &str = "Idempotency-Key";
    /// Actor performing a patch, recorded on the change audit row.
    pub const ACTOR: &str = "X-Actor";
    /// Free-text reason for a patch, recorded on the change audit row.
    pub const CHANGE_REASON: &str = "X-Change-Reason";
}
