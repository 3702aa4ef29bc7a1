//! Port traits for the collaborators a run depends on.

pub mod benchmark_port;
pub mod bundle_port;
pub mod calendar_port;
pub mod config_port;
pub mod display_port;
pub mod simulation_port;
