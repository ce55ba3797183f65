//! Write-through position/NAV cache (C8 hot-read path). Grounded on
//! `original_source/backend/app/redis_cache.py`'s `RedisCache`: a bare
//! `SET key value` per write, JSON-encoded with sorted keys, no TTL, no
//! read-back inside the core — the cache exists purely to serve an external
//! hot-read path, so a write failure is logged and swallowed rather than
//! failing the caller's transaction.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::json;

use crate::model::{InstrumentId, PortfolioId, PositionCacheEntry};

/// Redis key for a live position entry.
fn position_key(portfolio_id: PortfolioId, instrument_id: InstrumentId) -> String {
    format!("position:{portfolio_id}:{instrument_id}")
}

/// Redis key for the latest IBOR NAV snapshot of a portfolio.
fn ibor_nav_key(portfolio_id: PortfolioId) -> String {
    format!("nav:ibor:{portfolio_id}")
}

/// Write-through cache abstraction used by C7 (position writes) and C9
/// (IBOR NAV publication). A miss or a write failure is never fatal to the
/// caller — the database remains the source of truth.
#[async_trait]
pub trait PositionCache: Send + Sync {
    /// Publish a position's current state after a write.
    async fn set_position(
        &self,
        portfolio_id: PortfolioId,
        instrument_id: InstrumentId,
        entry: &PositionCacheEntry,
    );

    /// Publish a freshly computed IBOR NAV result, keyed by portfolio.
    async fn set_ibor_nav(&self, portfolio_id: PortfolioId, payload: &serde_json::Value);
}

/// Real `redis`-backed cache using a multiplexed async connection.
pub struct RedisPositionCache {
    manager: ConnectionManager,
}

impl RedisPositionCache {
    /// Connect to `redis_url` and build a multiplexed connection manager.
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl PositionCache for RedisPositionCache {
    async fn set_position(
        &self,
        portfolio_id: PortfolioId,
        instrument_id: InstrumentId,
        entry: &PositionCacheEntry,
    ) {
        let key = position_key(portfolio_id, instrument_id);
        let payload = match serde_json::to_string(entry) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, key, "failed to encode position cache entry");
                return;
            }
        };
        let mut conn = self.manager.clone();
        if let Err(e) = conn.set::<_, _, ()>(&key, payload).await {
            tracing::warn!(error = %e, key, "position cache write failed, continuing");
        }
    }

    async fn set_ibor_nav(&self, portfolio_id: PortfolioId, payload: &serde_json::Value) {
        let key = ibor_nav_key(portfolio_id);
        let encoded = payload.to_string();
        let mut conn = self.manager.clone();
        if let Err(e) = conn.set::<_, _, ()>(&key, encoded).await {
            tracing::warn!(error = %e, key, "ibor nav cache write failed, continuing");
        }
    }
}

/// No-op cache for tests and for running without a Redis dependency.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPositionCache;

#[async_trait]
impl PositionCache for NoopPositionCache {
    async fn set_position(
        &self,
        _portfolio_id: PortfolioId,
        _instrument_id: InstrumentId,
        _entry: &PositionCacheEntry,
    ) {
    }

    async fn set_ibor_nav(&self, _portfolio_id: PortfolioId, _payload: &serde_json::Value) {
        let _ = json!(null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_noop_cache_accepts_writes_without_panicking() {
        let cache = NoopPositionCache;
        let entry = PositionCacheEntry {
            quantity: dec!(10),
            version_uuid: Uuid::new_v4(),
            updated_at: Utc::now(),
            source: "db".to_string(),
        };
        cache
            .set_position(PortfolioId(1), InstrumentId(1), &entry)
            .await;
        cache.set_ibor_nav(PortfolioId(1), &json!({"nav_rc": "100.00"})).await;
    }

    #[test]
    fn test_position_key_format() {
        assert_eq!(
            position_key(PortfolioId(7), InstrumentId(3)),
            "position:7:3"
        );
    }

    #[test]
    fn test_ibor_nav_key_format() {
        assert_eq!(ibor_nav_key(PortfolioId(7)), "nav:ibor:7");
    }
}
