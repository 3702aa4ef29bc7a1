//! Reference simulation: steps through daily sessions.
//!
//! Each session runs in phases:
//! 1. `before_trading_start`
//! 2. `handle_data` (or one pass of a source-text strategy)
//! 3. fill open orders at the daily close and apply the transactions
//! 4. end-of-session blotter housekeeping, mark to market, record metrics

use tracing::{debug, info};

use crate::domain::algorithm::{AlgoCallbacks, AlgoContext, StrategyBuiltins, StrategyProgram};
use crate::domain::backtest::{DataFrequency, RunConfiguration};
use crate::domain::error::RunError;
use crate::domain::expr::Statement;
use crate::domain::ledger::Ledger;
use crate::domain::metrics::SessionContext;
use crate::domain::namespace::Namespace;
use crate::domain::performance::{DailyPerformance, Performance};
use crate::domain::pipeline::LoaderDispatch;
use crate::domain::script;
use crate::ports::bundle_port::PriceField;
use crate::ports::simulation_port::{SimulationFactory, SimulationInputs, TradingSimulation};

#[derive(Debug, Default, Clone, Copy)]
pub struct SessionSimulatorFactory;

impl SimulationFactory for SessionSimulatorFactory {
    fn build(&self, inputs: SimulationInputs) -> Result<Box<dyn TradingSimulation>, RunError> {
        if inputs.config.params.data_frequency != DataFrequency::Daily {
            return Err(RunError::Simulation {
                reason: format!(
                    "{} data frequency is not supported, only daily",
                    inputs.config.params.data_frequency
                ),
            });
        }
        let program = match inputs.program {
            StrategyProgram::Callbacks(callbacks) => Program::Callbacks(callbacks),
            StrategyProgram::Script {
                filename,
                text,
                namespace,
            } => {
                let statements =
                    script::parse_script(&text).map_err(|e| RunError::Simulation {
                        reason: format!("{filename}: {e}"),
                    })?;
                Program::Script {
                    filename,
                    statements,
                    namespace,
                }
            }
        };
        Ok(Box::new(SessionSimulator {
            program,
            config: inputs.config,
            loader_dispatch: inputs.loader_dispatch,
        }))
    }
}

enum Program {
    Callbacks(AlgoCallbacks),
    Script {
        filename: String,
        statements: Vec<(usize, Statement)>,
        namespace: Namespace,
    },
}

impl Program {
    fn initialize(&mut self, ctx: &mut AlgoContext<'_>) -> Result<(), RunError> {
        match self {
            Program::Callbacks(AlgoCallbacks {
                initialize: Some(f),
                ..
            }) => f(ctx),
            _ => Ok(()),
        }
    }

    fn before_trading_start(&mut self, ctx: &mut AlgoContext<'_>) -> Result<(), RunError> {
        match self {
            Program::Callbacks(AlgoCallbacks {
                before_trading_start: Some(f),
                ..
            }) => f(ctx),
            _ => Ok(()),
        }
    }

    fn handle_data(&mut self, ctx: &mut AlgoContext<'_>) -> Result<(), RunError> {
        match self {
            Program::Callbacks(AlgoCallbacks {
                handle_data: Some(f),
                ..
            }) => f(ctx),
            Program::Callbacks(_) => Ok(()),
            Program::Script {
                filename,
                statements,
                namespace,
            } => {
                let mut builtins = StrategyBuiltins { ctx, pending: None };
                script::run(statements, namespace, &mut builtins).map_err(|e| {
                    builtins.pending.take().unwrap_or_else(|| RunError::Simulation {
                        reason: format!("{filename}: {e}"),
                    })
                })
            }
        }
    }

    fn analyze(&mut self, perf: &Performance) -> Result<(), RunError> {
        match self {
            Program::Callbacks(AlgoCallbacks {
                analyze: Some(f), ..
            }) => f(perf),
            _ => Ok(()),
        }
    }
}

pub struct SessionSimulator {
    program: Program,
    config: RunConfiguration,
    loader_dispatch: LoaderDispatch,
}

impl TradingSimulation for SessionSimulator {
    fn run(self: Box<Self>) -> Result<Performance, RunError> {
        let SessionSimulator {
            mut program,
            config,
            loader_dispatch,
        } = *self;
        let RunConfiguration {
            params,
            calendar,
            mut metrics_set,
            mut blotter,
            data_portal,
            benchmark_returns,
        } = config;
        let sessions = params.sessions;
        if sessions.is_empty() {
            return Err(RunError::Simulation {
                reason: format!(
                    "no {} sessions between {} and {}",
                    calendar.name(),
                    params.start_session,
                    params.end_session
                ),
            });
        }
        info!(
            sessions = sessions.len(),
            capital_base = params.capital_base,
            "starting simulation"
        );

        let mut ledger = Ledger::new(params.capital_base);
        metrics_set.start(params.capital_base);

        let mut carried_orders = {
            let mut ctx = AlgoContext::new(
                &sessions,
                0,
                &data_portal,
                blotter.as_mut(),
                &ledger,
                &loader_dispatch,
            );
            program.initialize(&mut ctx)?;
            ctx.orders_placed()
        };

        let mut rows = Vec::with_capacity(sessions.len());
        for (index, &session) in sessions.iter().enumerate() {
            let orders_placed = {
                let mut ctx = AlgoContext::new(
                    &sessions,
                    index,
                    &data_portal,
                    blotter.as_mut(),
                    &ledger,
                    &loader_dispatch,
                );
                program.before_trading_start(&mut ctx)?;
                program.handle_data(&mut ctx)?;
                ctx.orders_placed() + std::mem::take(&mut carried_orders)
            };

            let price_of = |symbol: &str| data_portal.current(symbol, PriceField::Close, session);
            let transactions = blotter.process_fills(session, &price_of);
            for txn in &transactions {
                ledger.apply(txn);
            }
            blotter.end_of_session(session);
            ledger.mark_to_market(&price_of);
            debug!(%session, fills = transactions.len(), "session closed");

            let columns = metrics_set.record(&SessionContext {
                session,
                ledger: &ledger,
                benchmark_return: benchmark_returns.get(session),
                orders_placed,
            });
            rows.push(DailyPerformance { session, columns });
        }

        let perf = Performance {
            rows,
            summary: metrics_set.finalize(),
        };
        program.analyze(&perf)?;
        info!(
            sessions = perf.session_count(),
            portfolio_value = ledger.portfolio_value(),
            "simulation finished"
        );
        Ok(perf)
    }
}
