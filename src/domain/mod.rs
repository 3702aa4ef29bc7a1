//! Core domain types and logic.

pub mod error;
pub mod expr;
pub mod expr_parser;
pub mod expr_eval;
pub mod namespace;
pub mod script;
pub mod paths;
pub mod registry;
pub mod metrics;
pub mod blotter;
pub mod ledger;
pub mod extension;
pub mod calendar;
pub mod config_resolver;
pub mod data_portal;
pub mod pipeline;
pub mod backtest;
pub mod performance;
pub mod algorithm;
