//! Idempotency record (C2).

use serde_json::Value;

/// A cached `(scope, key) -> response` mapping. `request_hash` is kept for
/// debugging only; it is never checked against the caller's payload.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    /// Logical namespace the key lives in, e.g. `"api:create_staging"`.
    pub scope: String,
    /// Caller-supplied or server-derived dedup token.
    pub key: String,
    /// SHA-256 hex digest of the canonicalized request payload, if captured.
    pub request_hash: Option<String>,
    /// The cached response body, once a winner has stored one.
    pub response: Option<Value>,
}
