//! Durable-workflow simulation: activities (C7) and the orchestrators (C6)
//! that sequence them.

pub mod activities;
pub mod orchestrator;
