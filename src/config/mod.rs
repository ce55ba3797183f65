//! Configuration module for the back-office service

pub mod service;
pub mod utils;

pub use service::*;
