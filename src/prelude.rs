//! Prelude: commonly used types and traits, for `use backoffice_core::prelude::*;`.

pub use crate::config::ServiceConfig;
pub use crate::decimal::{allocate_with_residual, gross_amount, round_money, to_canonical_string};
pub use crate::error::CoreError;
pub use crate::logger::setup_logger;
pub use crate::model::*;
pub use crate::service::corporate_action::CorporateActionService;
pub use crate::service::deal_planner::DealAdjustmentPlanner;
pub use crate::service::nav::NavService;
pub use crate::service::pending_trade::PendingTradeService;
pub use crate::service::position_cache::PositionCache;
pub use crate::store::{AdvanceOutcome, NavRunKey, PendingTradePatch, Store};
pub use crate::workflow::activities::TradeActivities;
pub use crate::workflow::orchestrator::{
    AborNavOrchestrator, CorporateActionOrchestrator, TradeLifecycleOrchestrator, WorkflowClient,
    WorkflowHandle,
};
