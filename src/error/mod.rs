//! Error handling for the back-office core.
//!
//! `CoreError` is the single error type threaded through the store, service,
//! workflow and activity layers. Every variant carries (or derives) the
//! machine code surfaced verbatim in the HTTP layer's `{"detail": "<code>"}`
//! body.

/// Core error type shared by every layer below the HTTP boundary.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// Caller-supplied input failed validation.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable reason, not part of the machine code.
        reason: String,
    },

    /// State-machine transition attempted from the wrong status.
    #[error("status mismatch: expected {expected}, found {found}")]
    StatusMismatch {
        /// Status the transition required.
        expected: &'static str,
        /// Status actually observed on re-read.
        found: String,
    },

    /// Row's lifecycle is no longer `active`.
    #[error("lifecycle not active")]
    LifecycleNotActive,

    /// Optimistic-concurrency version check lost the race.
    #[error("concurrent update")]
    ConcurrentUpdate,

    /// Deal block exists but is not in an editable/active state.
    #[error("deal block not active")]
    DealBlockNotActive,

    /// Sum of allocation quantities did not match the block's total quantity.
    #[error("allocation quantity mismatch")]
    AllocationQuantityMismatch,

    /// A price or FX rate the NAV engine needed was not observed. The
    /// message is already the complete machine code, e.g.
    /// `price_missing:{instrument_id}` or `fx_rate_missing:{base}->{quote}`.
    #[error("market data missing: {0}")]
    MarketDataMissing(String),

    /// Attempt to start the durable workflow failed.
    #[error("workflow start failed: {0}")]
    WorkflowStartFailed(String),

    /// An invariant that an activity depends on did not hold.
    #[error("invariant breach: {0}")]
    InvariantBreach(&'static str),

    /// Underlying store (Postgres) failure.
    #[error("store error: {0}")]
    Store(String),

    /// Underlying cache (Redis) failure; callers generally treat this as non-fatal.
    #[error("cache error: {0}")]
    Cache(String),
}

impl CoreError {
    /// The stable machine code this error maps to in the `{"detail": "..."}`
    /// HTTP error body.
    pub fn machine_code(&self) -> String {
        match self {
            CoreError::NotFound(what) => what.to_string(),
            CoreError::Validation { field, .. } => format!("invalid_{field}"),
            CoreError::StatusMismatch { .. } => "not_active".to_string(),
            CoreError::LifecycleNotActive => "not_editable".to_string(),
            CoreError::ConcurrentUpdate => "concurrent_update".to_string(),
            CoreError::DealBlockNotActive => "deal_block_not_active".to_string(),
            CoreError::AllocationQuantityMismatch => "allocation_quantity_mismatch".to_string(),
            CoreError::MarketDataMissing(code) => code.clone(),
            CoreError::WorkflowStartFailed(kind) => format!("temporal_start_failed:{kind}"),
            CoreError::InvariantBreach(code) => code.to_string(),
            CoreError::Store(_) => "store_error".to_string(),
            CoreError::Cache(_) => "cache_error".to_string(),
        }
    }

    /// Whether a workflow activity retry loop should keep retrying this
    /// error, as opposed to treating it as a terminal validation failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Store(_) | CoreError::Cache(_) | CoreError::WorkflowStartFailed(_)
        )
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Store(err.to_string())
    }
}

impl From<redis::RedisError> for CoreError {
    fn from(err: redis::RedisError) -> Self {
        CoreError::Cache(err.to_string())
    }
}
