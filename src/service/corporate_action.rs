//! Corporate-action engine (C10): event declaration, elections, and
//! per-holder effect application. Grounded on
//! `original_source/backend/app/temporal/activities.py`'s
//! `ca_process_event_activity`: the election gate, the `ca_effect`
//! claim-as-lock pattern, and the cash-dividend/stock-split postings.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::account_codes;
use crate::decimal::round_money;
use crate::error::CoreError;
use crate::idempotency::with_idempotency;
use crate::model::{
    CaChoice, CaEffect, CaElection, CaEvent, CaEventId, CaEventStatus, CaType, DrCr, EntryRole,
    InstrumentId, JournalEntry, JournalEntryId, JournalEntryLine, Lifecycle, PortfolioId, TradeType,
};
use crate::service::{parse_decimal, parse_positive_id, validate_currency};
use crate::store::Store;

/// `POST /corporate-actions` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCaEventRequest {
    /// Cash dividend or stock split.
    pub ca_type: CaType,
    /// Affected instrument.
    pub instrument_id: String,
    /// Ex-dividend / ex-split date.
    pub ex_date: NaiveDate,
    /// Record date, if tracked.
    pub record_date: Option<NaiveDate>,
    /// Payment date, used as the journal effective date when present.
    pub pay_date: Option<NaiveDate>,
    /// Payment currency, for cash dividends.
    pub currency: Option<String>,
    /// Cash paid per share, as a decimal string, for cash dividends.
    pub cash_amount_per_share: Option<String>,
    /// Split ratio numerator, as a decimal string, for stock splits.
    pub split_numerator: Option<String>,
    /// Split ratio denominator, as a decimal string, for stock splits.
    pub split_denominator: Option<String>,
    /// Whether holders must explicitly accept before the effect applies.
    #[serde(default)]
    pub require_election: bool,
}

/// `{id, ca_type, instrument_id, ..., status, lifecycle}`: the response
/// shape shared by create/get.
#[derive(Debug, Clone, Serialize)]
pub struct CaEventView {
    /// Primary key.
    pub id: CaEventId,
    /// Cash dividend or stock split.
    pub ca_type: CaType,
    /// Affected instrument.
    pub instrument_id: InstrumentId,
    /// Ex-dividend / ex-split date.
    pub ex_date: NaiveDate,
    /// Payment date, if known.
    pub pay_date: Option<NaiveDate>,
    /// Whether holders must explicitly accept.
    pub require_election: bool,
    /// Pending / processed / cancelled.
    pub status: CaEventStatus,
    /// Active / cancelled / deleted.
    pub lifecycle: Lifecycle,
}

impl From<&CaEvent> for CaEventView {
    fn from(event: &CaEvent) -> Self {
        CaEventView {
            id: event.id,
            ca_type: event.ca_type,
            instrument_id: event.instrument_id,
            ex_date: event.ex_date,
            pay_date: event.pay_date,
            require_election: event.require_election,
            status: event.status,
            lifecycle: event.lifecycle,
        }
    }
}

/// `POST /corporate-actions/{id}/elections` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitElectionRequest {
    /// Electing portfolio.
    pub portfolio_id: String,
    /// Accept or decline.
    pub choice: CaChoice,
}

/// Outcome of processing a single holder under a CA event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderEffectView {
    /// Affected portfolio.
    pub portfolio_id: PortfolioId,
    /// Whether this holder's effect was newly applied by this call (as
    /// opposed to already claimed by a prior attempt).
    pub applied: bool,
}

/// `POST /corporate-actions/{id}/process` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessCaEventView {
    /// Event processed.
    pub ca_event_id: CaEventId,
    /// Pending / processed / cancelled after this call.
    pub status: CaEventStatus,
    /// Per-holder outcomes, in the order holders were read.
    pub holders: Vec<HolderEffectView>,
}

/// Stateless service wrapping a borrowed `Store`.
#[derive(Clone, Copy)]
pub struct CorporateActionService<'a> {
    store: &'a dyn Store,
}

impl<'a> CorporateActionService<'a> {
    /// Construct a service bound to a store for the lifetime of one request.
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// `POST /corporate-actions`.
    pub async fn create_event(
        &self,
        req: CreateCaEventRequest,
    ) -> Result<CaEventView, CoreError> {
        let store = self.store;
        let instrument_id = InstrumentId(parse_positive_id(&req.instrument_id, "instrument_id")?);
        store
            .get_instrument(instrument_id)
            .await?
            .ok_or(CoreError::NotFound("instrument_not_found"))?;

        let currency = req
            .currency
            .as_deref()
            .map(|c| validate_currency(c, "currency"))
            .transpose()?;
        let cash_amount_per_share = req
            .cash_amount_per_share
            .as_deref()
            .map(|raw| parse_decimal(raw, "cash_amount_per_share"))
            .transpose()?;
        let split_numerator = req
            .split_numerator
            .as_deref()
            .map(|raw| parse_decimal(raw, "split_numerator"))
            .transpose()?;
        let split_denominator = req
            .split_denominator
            .as_deref()
            .map(|raw| parse_decimal(raw, "split_denominator"))
            .transpose()?;

        if req.ca_type == CaType::CashDividend && cash_amount_per_share.is_none() {
            return Err(CoreError::Validation {
                field: "cash_amount_per_share",
                reason: "required for cash_dividend events".to_string(),
            });
        }
        if req.ca_type == CaType::StockSplit
            && (split_numerator.is_none() || split_denominator.is_none())
        {
            return Err(CoreError::Validation {
                field: "split_numerator",
                reason: "split_numerator and split_denominator are required for stock_split events"
                    .to_string(),
            });
        }

        let event = CaEvent {
            id: CaEventId(0),
            ca_type: req.ca_type,
            instrument_id,
            ex_date: req.ex_date,
            record_date: req.record_date,
            pay_date: req.pay_date,
            currency,
            cash_amount_per_share,
            split_numerator,
            split_denominator,
            require_election: req.require_election,
            status: CaEventStatus::Pending,
            lifecycle: Lifecycle::Active,
        };
        let inserted = store.insert_ca_event(event).await?;
        Ok(CaEventView::from(&inserted))
    }

    /// `GET /corporate-actions/{id}`.
    pub async fn get_event(&self, id: CaEventId) -> Result<CaEventView, CoreError> {
        let event = self
            .store
            .get_ca_event(id)
            .await?
            .ok_or(CoreError::NotFound("not_found"))?;
        Ok(CaEventView::from(&event))
    }

    /// `POST /corporate-actions/{id}/elections`.
    pub async fn submit_election(
        &self,
        ca_event_id: CaEventId,
        req: SubmitElectionRequest,
    ) -> Result<(), CoreError> {
        let store = self.store;
        store
            .get_ca_event(ca_event_id)
            .await?
            .ok_or(CoreError::NotFound("not_found"))?;
        let portfolio_id = PortfolioId(parse_positive_id(&req.portfolio_id, "portfolio_id")?);
        store
            .get_portfolio(portfolio_id)
            .await?
            .ok_or(CoreError::NotFound("portfolio_not_found"))?;

        store
            .upsert_ca_election(CaElection {
                ca_event_id,
                portfolio_id,
                choice: req.choice,
            })
            .await
    }

    /// `POST /corporate-actions/{id}/process`: applies the event's effect to
    /// every current nonzero holder, gated by election and claimed
    /// at-most-once per `(event, portfolio)` via `ca_effect`.
    ///
    /// Idempotent at the activity level: a prior `processed`/`cancelled`
    /// event returns its cached state without touching holders again.
    pub async fn process_event(
        &self,
        ca_event_id: CaEventId,
    ) -> Result<ProcessCaEventView, CoreError> {
        let store = self.store;
        let scope = "activity:ca_process_event";
        let key = ca_event_id.to_string();
        with_idempotency(store, scope, Some(&key), &ca_event_id.value(), move || async move {
            Self::process_event_once(store, ca_event_id).await
        })
        .await
    }

    async fn process_event_once(
        store: &dyn Store,
        ca_event_id: CaEventId,
    ) -> Result<ProcessCaEventView, CoreError> {
        let event = store
            .get_ca_event(ca_event_id)
            .await?
            .ok_or(CoreError::NotFound("ca_event_not_active"))?;

        if event.lifecycle != Lifecycle::Active {
            return Err(CoreError::InvariantBreach("ca_event_not_active"));
        }
        if matches!(
            event.status,
            CaEventStatus::Processed | CaEventStatus::Cancelled
        ) {
            return Ok(ProcessCaEventView {
                ca_event_id,
                status: event.status,
                holders: Vec::new(),
            });
        }

        let holders = store.list_holders_of_instrument(event.instrument_id).await?;
        let mut outcomes = Vec::with_capacity(holders.len());

        for holder in holders {
            let portfolio_id = holder.portfolio_id;
            let portfolio = store
                .get_portfolio(portfolio_id)
                .await?
                .ok_or(CoreError::NotFound("portfolio_not_found"))?;

            let rule_requires = store
                .get_ca_portfolio_rule(portfolio_id, event.ca_type)
                .await?
                .map(|r| r.require_election)
                .unwrap_or(false);
            let requires_election = event.require_election || rule_requires;

            if requires_election {
                let election = store.get_ca_election(ca_event_id, portfolio_id).await?;
                let accepted = matches!(
                    election,
                    Some(crate::model::CaElection {
                        choice: CaChoice::Accept,
                        ..
                    })
                );
                if !accepted {
                    continue;
                }
            }

            let claimed = store.claim_ca_effect(ca_event_id, portfolio_id).await?;
            if !claimed {
                outcomes.push(HolderEffectView {
                    portfolio_id,
                    applied: false,
                });
                continue;
            }

            let (cash_amount, share_delta) = match event.ca_type {
                CaType::CashDividend => {
                    Self::apply_cash_dividend(store, &event, portfolio_id, &portfolio.report_currency, holder.quantity)
                        .await?
                }
                CaType::StockSplit => {
                    Self::apply_stock_split(store, &event, portfolio_id, &portfolio.report_currency, holder.quantity)
                        .await?
                }
            };

            store
                .update_ca_effect(CaEffect {
                    ca_event_id,
                    portfolio_id,
                    journal_entry_id: cash_amount.1.or(share_delta.1),
                    cash_amount: cash_amount.0,
                    share_delta: share_delta.0,
                })
                .await?;

            outcomes.push(HolderEffectView {
                portfolio_id,
                applied: true,
            });
        }

        store
            .set_ca_event_status(ca_event_id, CaEventStatus::Processed)
            .await?;

        Ok(ProcessCaEventView {
            ca_event_id,
            status: CaEventStatus::Processed,
            holders: outcomes,
        })
    }

    /// `cash = shares * cash_amount_per_share`, credited to an
    /// auto-provisioned cash instrument in `event.currency` (falling back to
    /// the holder portfolio's report currency). Returns
    /// `(cash_amount, journal_entry_id)` pairs for the cash/split legs so
    /// the caller can merge whichever one applied into a single `CaEffect`.
    async fn apply_cash_dividend(
        store: &dyn Store,
        event: &CaEvent,
        portfolio_id: PortfolioId,
        report_currency: &str,
        shares: Decimal,
    ) -> Result<
        ((Option<Decimal>, Option<JournalEntryId>), (Option<Decimal>, Option<JournalEntryId>)),
        CoreError,
    > {
        let cash_per_share = event
            .cash_amount_per_share
            .ok_or(CoreError::InvariantBreach("ca_event_missing_cash_amount"))?;
        let currency = event
            .currency
            .clone()
            .unwrap_or_else(|| report_currency.to_string());
        let cash = round_money(shares * cash_per_share);

        let cash_instrument = store.ensure_cash_instrument(&currency).await?;

        let entry = JournalEntry {
            id: JournalEntryId(0),
            pending_trade_id: None,
            deal_block_id: None,
            deal_allocation_id: None,
            effective_date: event.effective_date(),
            posted_at: Utc::now(),
            trade_type: TradeType::Buy,
            entry_role: EntryRole::Normal,
            reversal_of_entry_id: None,
            replacement_of_entry_id: None,
            description: format!("cash_dividend ca_event={} instrument={}", event.id, event.instrument_id),
        };
        let lines = vec![
            JournalEntryLine {
                entry_id: JournalEntryId(0),
                portfolio_id,
                instrument_id: cash_instrument.id,
                account_code: account_codes::CASH.to_string(),
                drcr: DrCr::Dr,
                quantity: None,
                amount: cash,
                currency: currency.clone(),
            },
            JournalEntryLine {
                entry_id: JournalEntryId(0),
                portfolio_id,
                instrument_id: event.instrument_id,
                account_code: account_codes::DIVIDEND_INCOME.to_string(),
                drcr: DrCr::Cr,
                quantity: None,
                amount: cash,
                currency,
            },
        ];
        let entry_id = store.insert_journal_entry(entry, lines).await?;

        store
            .upsert_position_current(portfolio_id, cash_instrument.id, cash, None, entry_id)
            .await?;

        Ok(((Some(cash), Some(entry_id)), (None, None)))
    }

    /// `ratio = numerator/denominator`; `new_shares = shares * ratio`;
    /// `share_delta = new_shares - shares`.
    async fn apply_stock_split(
        store: &dyn Store,
        event: &CaEvent,
        portfolio_id: PortfolioId,
        report_currency: &str,
        shares: Decimal,
    ) -> Result<
        ((Option<Decimal>, Option<JournalEntryId>), (Option<Decimal>, Option<JournalEntryId>)),
        CoreError,
    > {
        let numerator = event
            .split_numerator
            .ok_or(CoreError::InvariantBreach("ca_event_missing_split_ratio"))?;
        let denominator = event
            .split_denominator
            .ok_or(CoreError::InvariantBreach("ca_event_missing_split_ratio"))?;
        if denominator.is_zero() {
            return Err(CoreError::InvariantBreach("ca_event_missing_split_ratio"));
        }
        let ratio = numerator / denominator;
        let new_shares = shares * ratio;
        let share_delta = new_shares - shares;

        let entry = JournalEntry {
            id: JournalEntryId(0),
            pending_trade_id: None,
            deal_block_id: None,
            deal_allocation_id: None,
            effective_date: event.effective_date(),
            posted_at: Utc::now(),
            trade_type: TradeType::Buy,
            entry_role: EntryRole::Normal,
            reversal_of_entry_id: None,
            replacement_of_entry_id: None,
            description: format!("stock_split ca_event={} instrument={}", event.id, event.instrument_id),
        };
        let lines = vec![JournalEntryLine {
            entry_id: JournalEntryId(0),
            portfolio_id,
            instrument_id: event.instrument_id,
            account_code: account_codes::STOCK_SPLIT.to_string(),
            drcr: DrCr::from_signed(share_delta),
            quantity: Some(share_delta),
            amount: Decimal::ZERO,
            currency: report_currency.to_string(),
        }];
        let entry_id = store.insert_journal_entry(entry, lines).await?;

        store
            .upsert_position_current(portfolio_id, event.instrument_id, share_delta, None, entry_id)
            .await?;

        Ok(((None, None), (Some(share_delta), Some(entry_id))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Instrument, InstrumentType, JournalEntryId as Jid, Portfolio};
    use crate::store::memory::MemoryStore;
    use rust_decimal_macros::dec;

    fn store_with_holder() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed_portfolio(Portfolio {
            id: PortfolioId(1),
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

    async fn give_position(store: &MemoryStore, qty: Decimal) {
        store
            .upsert_position_current(PortfolioId(1), InstrumentId(1), qty, None, Jid(0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cash_dividend_credits_exact_cash_amount() {
        let store = store_with_holder();
        give_position(&store, dec!(10)).await;
        let service = CorporateActionService::new(&store);
        let event = service
            .create_event(CreateCaEventRequest {
                ca_type: CaType::CashDividend,
                instrument_id: "1".to_string(),
                ex_date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
                record_date: None,
                pay_date: Some(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()),
                currency: Some("USD".to_string()),
                cash_amount_per_share: Some("1".to_string()),
                split_numerator: None,
                split_denominator: None,
                require_election: false,
            })
            .await
            .unwrap();

        let result = service.process_event(event.id).await.unwrap();
        assert_eq!(result.status, CaEventStatus::Processed);
        assert_eq!(result.holders.len(), 1);
        assert!(result.holders[0].applied);

        let cash_instrument_id = store.ensure_cash_instrument("USD").await.unwrap().id;
        let cash_position = store
            .get_position_current(PortfolioId(1), cash_instrument_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cash_position.quantity, dec!(10));
    }

    #[tokio::test]
    async fn test_reprocessing_does_not_duplicate_effect() {
        let store = store_with_holder();
        give_position(&store, dec!(10)).await;
        let service = CorporateActionService::new(&store);
        let event = service
            .create_event(CreateCaEventRequest {
                ca_type: CaType::CashDividend,
                instrument_id: "1".to_string(),
                ex_date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
                record_date: None,
                pay_date: Some(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()),
                currency: Some("USD".to_string()),
                cash_amount_per_share: Some("1".to_string()),
                split_numerator: None,
                split_denominator: None,
                require_election: false,
            })
            .await
            .unwrap();

        service.process_event(event.id).await.unwrap();
        service.process_event(event.id).await.unwrap();

        let cash_instrument_id = store.ensure_cash_instrument("USD").await.unwrap().id;
        let cash_position = store
            .get_position_current(PortfolioId(1), cash_instrument_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cash_position.quantity, dec!(10));
    }

    #[tokio::test]
    async fn test_stock_split_adjusts_quantity_by_ratio() {
        let store = store_with_holder();
        give_position(&store, dec!(100)).await;
        let service = CorporateActionService::new(&store);
        let event = service
            .create_event(CreateCaEventRequest {
                ca_type: CaType::StockSplit,
                instrument_id: "1".to_string(),
                ex_date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
                record_date: None,
                pay_date: None,
                currency: None,
                cash_amount_per_share: None,
                split_numerator: Some("2".to_string()),
                split_denominator: Some("1".to_string()),
                require_election: false,
            })
            .await
            .unwrap();

        service.process_event(event.id).await.unwrap();

        let position = store
            .get_position_current(PortfolioId(1), InstrumentId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(position.quantity, dec!(200));
    }

    #[tokio::test]
    async fn test_election_required_and_declined_skips_holder() {
        let store = store_with_holder();
        give_position(&store, dec!(10)).await;
        store.seed_ca_election(crate::model::CaElection {
            ca_event_id: CaEventId(1),
            portfolio_id: PortfolioId(1),
            choice: CaChoice::Decline,
        });
        let service = CorporateActionService::new(&store);
        let event = service
            .create_event(CreateCaEventRequest {
                ca_type: CaType::CashDividend,
                instrument_id: "1".to_string(),
                ex_date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
                record_date: None,
                pay_date: None,
                currency: Some("USD".to_string()),
                cash_amount_per_share: Some("1".to_string()),
                split_numerator: None,
                split_denominator: None,
                require_election: true,
            })
            .await
            .unwrap();
        assert_eq!(event.id, CaEventId(1));

        let result = service.process_event(event.id).await.unwrap();
        assert!(result.holders.is_empty());
    }
}
