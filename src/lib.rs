//! algorun: assembles and runs algorithm backtests.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. [`run_algo`] wires them into a run.

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod run_algo;
pub mod cli;
