//! NAV engine (C9): IBOR (live positions, intra-day) and ABOR (EOD snapshot)
//! valuation, each persisted via the insert-or-return-existing NAV run
//! pattern. Grounded on `original_source/backend/app/nav/service.py`'s
//! `compute_ibor_nav`/`compute_abor_nav`/`persist_ibor_nav_run`/
//! `persist_abor_nav_run`.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;

use crate::error::CoreError;
use crate::model::{
    InstrumentType, NavLineItem, NavResult, NavRun, NavRunId, PortfolioId, RunType,
};
use crate::store::{NavRunKey, Store};

/// Stateless NAV computation/persistence service.
pub struct NavService<'a> {
    store: &'a dyn Store,
}

impl<'a> NavService<'a> {
    /// Construct a service bound to a store for the lifetime of one request.
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// `GET /nav/ibor/{portfolio_id}` (and the on-demand snapshot variant).
    /// Computes against `position_current` as of `asof_ts` (default: now),
    /// persisting a `Realtime` or `Snapshot` run keyed by the exact instant.
    pub async fn compute_ibor_nav(
        &self,
        portfolio_id: PortfolioId,
        report_currency: &str,
        asof_ts: Option<DateTime<Utc>>,
        run_type: RunType,
    ) -> Result<(NavRunId, NavResult, Vec<NavLineItem>), CoreError> {
        let asof_ts = asof_ts.unwrap_or_else(Utc::now);
        let (run_id, freshly_inserted) = self
            .store
            .insert_or_get_nav_run(NavRunKey::Ibor {
                portfolio_id,
                run_type,
                asof_ts,
            })
            .await?;

        if !freshly_inserted {
            let (_, result, line_items) = self
                .store
                .get_nav_result(run_id)
                .await?
                .ok_or(CoreError::InvariantBreach("nav_run_missing_result"))?;
            return Ok((run_id, result, line_items));
        }

        let positions = self.store.list_positions_current(portfolio_id).await?;
        let mut line_items = Vec::with_capacity(positions.len());
        let mut nav_rc = Decimal::ZERO;

        for position in positions {
            let instrument = self
                .store
                .get_instrument(position.instrument_id)
                .await?
                .ok_or(CoreError::NotFound("instrument_not_found"))?;

            let (price, fx_rate) = if instrument.instrument_type == InstrumentType::Cash {
                (Decimal::ONE, Decimal::ONE)
            } else {
                let market_price = self
                    .store
                    .latest_market_price(position.instrument_id, asof_ts)
                    .await?
                    .ok_or_else(|| {
                        CoreError::MarketDataMissing(format!(
                            "price_missing:{}",
                            position.instrument_id
                        ))
                    })?;
                let fx = if market_price.currency == report_currency {
                    Decimal::ONE
                } else {
                    self.store
                        .latest_fx_rate(&market_price.currency, report_currency, asof_ts)
                        .await?
                        .ok_or_else(|| {
                            CoreError::MarketDataMissing(format!(
                                "fx_rate_missing:{}->{}",
                                market_price.currency, report_currency
                            ))
                        })?
                        .rate
                };
                (market_price.price, fx)
            };

            let market_value_rc = position.quantity * price * fx_rate;
            nav_rc += market_value_rc;
            line_items.push(NavLineItem {
                nav_run_id: run_id,
                instrument_id: position.instrument_id,
                quantity: position.quantity,
                price,
                fx_rate,
                market_value_rc,
                price_asof_ts: None,
                price_source_id: None,
                fx_rate_asof_ts: None,
                fx_rate_source_id: None,
            });
        }

        let result = NavResult {
            nav_run_id: run_id,
            report_currency: report_currency.to_string(),
            nav_rc,
        };
        self.store
            .complete_nav_run(run_id, result.clone(), line_items.clone())
            .await?;
        Ok((run_id, result, line_items))
    }

    /// `POST /nav/abor/{portfolio_id}/run`. Computes against
    /// `position_snapshot_eod` for `asof_date`, with `asof_ts` fixed to
    /// `23:59:59 UTC` of that date; price/FX lookups require the official
    /// EOD print and record the audit metadata the ABOR line items carry.
    pub async fn compute_abor_nav(
        &self,
        portfolio_id: PortfolioId,
        report_currency: &str,
        asof_date: NaiveDate,
    ) -> Result<(NavRunId, NavResult, Vec<NavLineItem>), CoreError> {
        let asof_ts = asof_date
            .and_time(NaiveTime::from_hms_opt(23, 59, 59).expect("valid constant time"))
            .and_utc();

        let (run_id, freshly_inserted) = self
            .store
            .insert_or_get_nav_run(NavRunKey::Abor {
                portfolio_id,
                asof_date,
            })
            .await?;

        if !freshly_inserted {
            let (_, result, line_items) = self
                .store
                .get_nav_result(run_id)
                .await?
                .ok_or(CoreError::InvariantBreach("nav_run_missing_result"))?;
            return Ok((run_id, result, line_items));
        }

        let positions = self
            .store
            .list_position_snapshot_eod(portfolio_id, asof_date)
            .await?;
        let mut line_items = Vec::with_capacity(positions.len());
        let mut nav_rc = Decimal::ZERO;

        for position in positions {
            let instrument = self
                .store
                .get_instrument(position.instrument_id)
                .await?
                .ok_or(CoreError::NotFound("instrument_not_found"))?;

            let (price, price_asof_ts, price_source_id, fx_rate, fx_rate_asof_ts, fx_rate_source_id) =
                if instrument.instrument_type == InstrumentType::Cash {
                    (
                        Decimal::ONE,
                        None,
                        None,
                        Decimal::ONE,
                        None,
                        None,
                    )
                } else {
                    let market_price = self
                        .store
                        .eod_market_price(position.instrument_id, asof_date)
                        .await?
                        .ok_or_else(|| {
                            CoreError::MarketDataMissing(format!(
                                "price_missing:{}",
                                position.instrument_id
                            ))
                        })?;
                    let (fx, fx_ts, fx_source) = if market_price.currency == report_currency {
                        (Decimal::ONE, None, None)
                    } else {
                        let rate = self
                            .store
                            .eod_fx_rate(&market_price.currency, report_currency, asof_ts)
                            .await?
                            .ok_or_else(|| {
                                CoreError::MarketDataMissing(format!(
                                    "fx_rate_missing:{}->{}",
                                    market_price.currency, report_currency
                                ))
                            })?;
                        (rate.rate, Some(rate.asof_ts), Some(rate.source_id))
                    };
                    (
                        market_price.price,
                        Some(market_price.asof_ts),
                        Some(market_price.source_id),
                        fx,
                        fx_ts,
                        fx_source,
                    )
                };

            let market_value_rc = position.quantity * price * fx_rate;
            nav_rc += market_value_rc;
            line_items.push(NavLineItem {
                nav_run_id: run_id,
                instrument_id: position.instrument_id,
                quantity: position.quantity,
                price,
                fx_rate,
                market_value_rc,
                price_asof_ts,
                price_source_id,
                fx_rate_asof_ts,
                fx_rate_source_id,
            });
        }

        let result = NavResult {
            nav_run_id: run_id,
            report_currency: report_currency.to_string(),
            nav_rc,
        };
        self.store
            .complete_nav_run(run_id, result.clone(), line_items.clone())
            .await?;
        Ok((run_id, result, line_items))
    }

    /// `GET /nav/abor/{portfolio_id}/result`: read back a previously
    /// completed ABOR run.
    pub async fn get_abor_result(
        &self,
        portfolio_id: PortfolioId,
        asof_date: NaiveDate,
    ) -> Result<(NavRun, NavResult, Vec<NavLineItem>), CoreError> {
        let run = self
            .store
            .get_abor_run_by_date(portfolio_id, asof_date)
            .await?
            .ok_or(CoreError::NotFound("abor_run_not_found"))?;
        self.store
            .get_nav_result(run.id)
            .await?
            .ok_or(CoreError::InvariantBreach("nav_run_missing_result"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FxRate, Instrument, MarketPrice, Portfolio};
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn seed_portfolio_and_positions(store: &MemoryStore) {
        store.seed_portfolio(Portfolio {
            id: PortfolioId(1),
            report_currency: "USD".to_string(),
        });
        store.seed_instrument(Instrument {
            id: crate::model::InstrumentId(1),
            instrument_type: InstrumentType::Stock,
            quote_currency: "EUR".to_string(),
            security_id: "SAP".to_string(),
            subtype: None,
        });
    }

    #[tokio::test]
    async fn test_ibor_nav_fails_without_price() {
        let store = MemoryStore::new();
        seed_portfolio_and_positions(&store);
        store
            .upsert_position_current(
                PortfolioId(1),
                crate::model::InstrumentId(1),
                dec!(10),
                None,
                crate::model::JournalEntryId(1),
            )
            .await
            .unwrap();

        let service = NavService::new(&store);
        let err = service
            .compute_ibor_nav(PortfolioId(1), "USD", None, RunType::Realtime)
            .await
            .unwrap_err();
        assert_eq!(err.machine_code(), "price_missing:1");
    }

    #[tokio::test]
    async fn test_ibor_nav_computes_and_is_dedup_on_rerun() {
        let store = MemoryStore::new();
        seed_portfolio_and_positions(&store);
        store
            .upsert_position_current(
                PortfolioId(1),
                crate::model::InstrumentId(1),
                dec!(10),
                None,
                crate::model::JournalEntryId(1),
            )
            .await
            .unwrap();
        let asof_ts = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        store.seed_market_price(MarketPrice {
            instrument_id: crate::model::InstrumentId(1),
            asof_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            asof_ts,
            price: dec!(100),
            currency: "EUR".to_string(),
            is_eod: false,
            source_id: "test".to_string(),
        });
        store.seed_fx_rate(FxRate {
            base_ccy: "EUR".to_string(),
            quote_ccy: "USD".to_string(),
            asof_ts,
            rate: dec!(1.1),
            is_eod: false,
            source_id: "test".to_string(),
        });

        let service = NavService::new(&store);
        let (run_id, result, _) = service
            .compute_ibor_nav(PortfolioId(1), "USD", Some(asof_ts), RunType::Realtime)
            .await
            .unwrap();
        assert_eq!(result.nav_rc, dec!(1100.0));

        let (run_id_again, result_again, _) = service
            .compute_ibor_nav(PortfolioId(1), "USD", Some(asof_ts), RunType::Realtime)
            .await
            .unwrap();
        assert_eq!(run_id, run_id_again);
        assert_eq!(result.nav_rc, result_again.nav_rc);
    }

    #[tokio::test]
    async fn test_abor_result_not_found_before_run() {
        let store = MemoryStore::new();
        seed_portfolio_and_positions(&store);
        let service = NavService::new(&store);
        let err = service
            .get_abor_result(PortfolioId(1), NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.machine_code(), "abor_run_not_found");
    }
}
