//! Simulation entity port traits.

use crate::domain::algorithm::StrategyProgram;
use crate::domain::backtest::RunConfiguration;
use crate::domain::error::RunError;
use crate::domain::performance::Performance;
use crate::domain::pipeline::LoaderDispatch;

/// Everything a simulation is constructed with.
pub struct SimulationInputs {
    pub program: StrategyProgram,
    pub config: RunConfiguration,
    pub loader_dispatch: LoaderDispatch,
}

pub trait TradingSimulation {
    /// Run every session to completion.
    fn run(self: Box<Self>) -> Result<Performance, RunError>;
}

pub trait SimulationFactory {
    fn build(&self, inputs: SimulationInputs) -> Result<Box<dyn TradingSimulation>, RunError>;
}
