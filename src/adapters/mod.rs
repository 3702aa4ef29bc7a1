//! Concrete adapter implementations for ports.

pub mod csv_bundle;
pub mod csv_benchmark;
pub mod file_config_adapter;
pub mod session_simulator;
pub mod stdout_display;
