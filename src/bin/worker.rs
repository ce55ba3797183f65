//! End-of-day ABOR batch entrypoint: `backoffice-worker <portfolio_id>
//! [asof_date=YYYY-MM-DD]`, the scheduled counterpart to the HTTP server's
//! `/nav/abor/{portfolio_id}/run`, which spawns the same orchestrator
//! in-process for ad hoc, on-demand runs.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use backoffice_core::config::ServiceConfig;
use backoffice_core::logger::setup_logger;
use backoffice_core::model::PortfolioId;
use backoffice_core::store::postgres::PostgresStore;
use backoffice_core::store::Store;
use backoffice_core::workflow::orchestrator::AborNavOrchestrator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logger();

    let mut args = std::env::args().skip(1);
    let portfolio_id: i64 = args
        .next()
        .expect("usage: backoffice-worker <portfolio_id> [asof_date=YYYY-MM-DD]")
        .parse()?;
    let asof_date = match args.next() {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")?,
        None => Utc::now().date_naive(),
    };

    let config = ServiceConfig::default();
    let store = Arc::new(PostgresStore::connect(&config.database_url).await?);
    let portfolio_id = PortfolioId(portfolio_id);
    let portfolio = store
        .get_portfolio(portfolio_id)
        .await?
        .ok_or("portfolio not found")?;
    let report_currency = portfolio.report_currency;

    let orchestrator = AborNavOrchestrator::new(store);
    orchestrator
        .run(portfolio_id, report_currency, asof_date)
        .await?;
    tracing::info!(%portfolio_id, %asof_date, "abor nav run complete");
    Ok(())
}
