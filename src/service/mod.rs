//! Service layer: business logic that sits between the HTTP surface and the
//! `Store` trait. Every service method takes `&dyn Store` (or a generic `S:
//! Store`) and parsed domain values; translating raw wire strings into those
//! values, and `CoreError` into an HTTP response, is the `http` module's job.

pub mod corporate_action;
pub mod deal_planner;
pub mod nav;
pub mod pending_trade;
pub mod position_cache;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::decimal::round_money;
use crate::error::CoreError;
use crate::store::Store;

/// Parse a caller-supplied decimal-string id, rejecting non-numeric and
/// non-positive values with the `invalid_<field>` machine code the original
/// API surface used (`original_source/backend/app/api/staging.py::_parse_numeric_id`).
pub fn parse_positive_id(raw: &str, field: &'static str) -> Result<i64, CoreError> {
    let value: i64 = raw.parse().map_err(|_| CoreError::Validation {
        field,
        reason: format!("{raw:?} is not a valid id"),
    })?;
    if value <= 0 {
        return Err(CoreError::Validation {
            field,
            reason: "id must be positive".to_string(),
        });
    }
    Ok(value)
}

/// Validate a 3-letter uppercase ISO currency code.
pub fn validate_currency(code: &str, field: &'static str) -> Result<String, CoreError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(code.to_string())
    } else {
        Err(CoreError::Validation {
            field,
            reason: format!("{code:?} is not a 3-letter uppercase currency code"),
        })
    }
}

/// Parse a caller-supplied decimal string (quantities/prices arrive as
/// strings on the wire, per spec.md §6).
pub fn parse_decimal(raw: &str, field: &'static str) -> Result<Decimal, CoreError> {
    raw.parse::<Decimal>().map_err(|_| CoreError::Validation {
        field,
        reason: format!("{raw:?} is not a valid decimal"),
    })
}

/// Convert a quote-currency gross amount into report currency: identity when
/// the two match, the latest observed FX rate otherwise. A missing FX rate
/// is not fatal (FX market data acquisition is out of scope per spec.md's
/// Non-goals) — the amount passes through unconverted and the gap is logged.
pub async fn convert_to_report_currency(
    store: &dyn Store,
    amount_qc: Decimal,
    quote_currency: &str,
    report_currency: &str,
) -> Result<Decimal, CoreError> {
    if quote_currency == report_currency {
        return Ok(amount_qc);
    }
    match store
        .latest_fx_rate(quote_currency, report_currency, Utc::now())
        .await?
    {
        Some(rate) => Ok(round_money(amount_qc * rate.rate)),
        None => {
            tracing::warn!(
                quote_currency,
                report_currency,
                "no fx rate observed, carrying quote-currency amount through unconverted"
            );
            Ok(amount_qc)
        }
    }
}
