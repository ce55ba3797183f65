//! # Backoffice Core
//!
//! Portfolio-accounting back office: the trade-lifecycle engine (pending
//! trades, deal blocks/allocations, double-entry journal, position
//! projection), the IBOR/ABOR NAV engine, and the corporate-action engine.
//!
//! This crate is the durable core: HTTP request shaping, the production
//! Postgres pool, and the durable workflow runtime all live at the edges
//! (`http`, `store::postgres`, `workflow`) and depend on this crate's traits
//! rather than the other way around.

pub mod config;
pub mod constants;
pub mod decimal;
pub mod error;
pub mod http;
pub mod idempotency;
pub mod logger;
pub mod model;
pub mod prelude;
pub mod service;
pub mod store;
pub mod workflow;

pub use error::CoreError;
pub use store::Store;
