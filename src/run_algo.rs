//! Run orchestration.
//!
//! Assembles one run from a [`RunRequest`]: definitions namespace, resolved
//! components, benchmark, bundle readers, data portal and pipeline dispatch.
//! It then builds and runs the simulation and routes the result. Name and
//! date validation happens before any bundle or benchmark data is opened.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::adapters::csv_benchmark::CsvBenchmarkSource;
use crate::adapters::csv_bundle::CsvBundleStore;
use crate::adapters::session_simulator::SessionSimulatorFactory;
use crate::adapters::stdout_display::StdoutDisplay;
use crate::domain::algorithm::{StrategyProgram, StrategySpec};
use crate::domain::backtest::{DataFrequency, RunConfiguration, SimulationParameters};
use crate::domain::blotter::Blotter;
use crate::domain::config_resolver::{resolve_configuration, ResolvedComponents};
use crate::domain::data_portal::{BenchmarkReturns, DataPortal};
use crate::domain::error::RunError;
use crate::domain::extension::ExtensionHost;
use crate::domain::metrics::MetricsSet;
use crate::domain::namespace::{build_namespace, Namespace};
use crate::domain::paths::{self, Environ};
use crate::domain::performance::Performance;
use crate::domain::pipeline::{choose_loader, PricingLoader};
use crate::domain::registry::ComponentSpec;
use crate::ports::benchmark_port::BenchmarkPort;
use crate::ports::bundle_port::BundlePort;
use crate::ports::calendar_port::TradingCalendar;
use crate::ports::display_port::DisplaySink;
use crate::ports::simulation_port::{SimulationFactory, SimulationInputs};

pub const DEFAULT_BUNDLE: &str = "quantopian-quandl";
pub const DEFAULT_CAPITAL_BASE: f64 = 10_000_000.0;
pub const PRINT_SENTINEL: &str = "-";

#[cfg(windows)]
pub const NULL_DEVICE: &str = "nul";
#[cfg(not(windows))]
pub const NULL_DEVICE: &str = "/dev/null";

/// Where the performance record goes once the run finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputRoute {
    Print,
    Discard,
    Persist(PathBuf),
}

impl OutputRoute {
    pub fn parse(destination: &str) -> Self {
        if destination == PRINT_SENTINEL {
            OutputRoute::Print
        } else if destination == NULL_DEVICE {
            OutputRoute::Discard
        } else {
            OutputRoute::Persist(PathBuf::from(destination))
        }
    }
}

impl fmt::Display for OutputRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputRoute::Print => f.write_str(PRINT_SENTINEL),
            OutputRoute::Discard => f.write_str(NULL_DEVICE),
            OutputRoute::Persist(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Everything the caller decides about one run.
pub struct RunRequest {
    pub strategy: StrategySpec,
    pub defines: Vec<String>,
    pub local_namespace: Option<Namespace>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub capital_base: f64,
    pub data_frequency: DataFrequency,
    pub bundle: String,
    pub bundle_timestamp: Option<DateTime<Utc>>,
    pub calendar: Option<Arc<dyn TradingCalendar>>,
    pub metrics_set: ComponentSpec<MetricsSet>,
    pub blotter: ComponentSpec<Box<dyn Blotter>>,
    pub benchmark_returns: Option<BenchmarkReturns>,
    pub data_portal: Option<DataPortal>,
    pub output: OutputRoute,
    pub print_algo: bool,
    pub environ: Environ,
}

impl RunRequest {
    pub fn new(strategy: StrategySpec, start: NaiveDate, end: NaiveDate) -> Self {
        RunRequest {
            strategy,
            defines: Vec::new(),
            local_namespace: None,
            start,
            end,
            capital_base: DEFAULT_CAPITAL_BASE,
            data_frequency: DataFrequency::Daily,
            bundle: DEFAULT_BUNDLE.to_string(),
            bundle_timestamp: None,
            calendar: None,
            metrics_set: "default".into(),
            blotter: "default".into(),
            benchmark_returns: None,
            data_portal: None,
            output: OutputRoute::Discard,
            print_algo: false,
            environ: paths::process_environ(),
        }
    }
}

impl fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunRequest")
            .field("strategy", &self.strategy)
            .field("defines", &self.defines)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("capital_base", &self.capital_base)
            .field("data_frequency", &self.data_frequency)
            .field("bundle", &self.bundle)
            .field("bundle_timestamp", &self.bundle_timestamp)
            .field("metrics_set", &self.metrics_set)
            .field("blotter", &self.blotter)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// Extension loading options for [`run_algorithm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionOptions {
    pub load_default: bool,
    pub extensions: Vec<String>,
    pub strict: bool,
    pub reload: bool,
}

impl Default for ExtensionOptions {
    fn default() -> Self {
        ExtensionOptions {
            load_default: true,
            extensions: Vec::new(),
            strict: true,
            reload: false,
        }
    }
}

pub struct Orchestrator<'h> {
    host: &'h ExtensionHost,
    bundles: Box<dyn BundlePort + 'h>,
    benchmarks: Box<dyn BenchmarkPort + 'h>,
    simulations: Box<dyn SimulationFactory + 'h>,
    display: Box<dyn DisplaySink + 'h>,
}

impl<'h> Orchestrator<'h> {
    /// Orchestrator over the CSV adapters, the session simulator and stdout.
    pub fn new(host: &'h ExtensionHost) -> Self {
        Orchestrator {
            host,
            bundles: Box::new(CsvBundleStore::new()),
            benchmarks: Box::new(CsvBenchmarkSource::new()),
            simulations: Box::new(SessionSimulatorFactory),
            display: Box::new(StdoutDisplay),
        }
    }

    pub fn with_bundles(mut self, bundles: impl BundlePort + 'h) -> Self {
        self.bundles = Box::new(bundles);
        self
    }

    pub fn with_benchmarks(mut self, benchmarks: impl BenchmarkPort + 'h) -> Self {
        self.benchmarks = Box::new(benchmarks);
        self
    }

    pub fn with_simulations(mut self, simulations: impl SimulationFactory + 'h) -> Self {
        self.simulations = Box::new(simulations);
        self
    }

    pub fn with_display(mut self, display: impl DisplaySink + 'h) -> Self {
        self.display = Box::new(display);
        self
    }

    pub fn run(&self, request: RunRequest) -> Result<Performance, RunError> {
        let RunRequest {
            strategy,
            defines,
            local_namespace,
            start,
            end,
            capital_base,
            data_frequency,
            bundle,
            bundle_timestamp,
            calendar,
            metrics_set,
            blotter,
            benchmark_returns,
            data_portal,
            output,
            print_algo,
            environ,
        } = request;

        // Stage 1: strategy and definitions
        let program = match strategy {
            StrategySpec::Source { filename, text } => {
                let namespace = build_namespace(&defines, local_namespace)?;
                if print_algo {
                    self.display.echo_source(&filename, &text);
                }
                StrategyProgram::Script {
                    filename,
                    text,
                    namespace,
                }
            }
            StrategySpec::Callbacks(_) if !defines.is_empty() => {
                return Err(RunError::ConfigurationConflict {
                    message: "cannot pass defines without source text".to_string(),
                });
            }
            StrategySpec::Callbacks(callbacks) => StrategyProgram::Callbacks(callbacks),
        };

        // Stage 2: calendar range and component names
        let ResolvedComponents {
            metrics_set,
            blotter,
            calendar,
        } = {
            let registry = self.host.registry();
            resolve_configuration(&registry, metrics_set, blotter, calendar, start, end)?
        };

        // Stage 3: benchmark and bundle data
        let benchmark_returns = match benchmark_returns {
            Some(returns) => returns,
            None => self.benchmarks.load(&environ)?,
        };
        let bundle_data = self.bundles.load(&bundle, &environ, bundle_timestamp)?;
        info!(bundle = %bundle, %start, %end, "assembling run");
        let data_portal = data_portal.unwrap_or_else(|| DataPortal::from_bundle(&bundle_data));
        let loader_dispatch = choose_loader(Arc::new(PricingLoader::new(
            Arc::clone(&bundle_data.equity_daily_bar_reader),
            Arc::clone(&bundle_data.adjustment_reader),
        )));
        drop(bundle_data);

        // Stage 4: simulate
        let params = SimulationParameters::new(start, end, calendar.as_ref(), capital_base, data_frequency);
        let simulation = self.simulations.build(SimulationInputs {
            program,
            config: RunConfiguration {
                params,
                calendar,
                metrics_set,
                blotter,
                data_portal,
                benchmark_returns,
            },
            loader_dispatch,
        })?;
        let perf = simulation.run()?;

        // Stage 5: route output
        self.route(&perf, &output)?;
        Ok(perf)
    }

    fn route(&self, perf: &Performance, output: &OutputRoute) -> Result<(), RunError> {
        match output {
            OutputRoute::Print => {
                self.display.echo(&perf.to_string());
                Ok(())
            }
            OutputRoute::Discard => Ok(()),
            OutputRoute::Persist(path) => {
                persist(perf, path)?;
                info!(path = %path.display(), "results written");
                Ok(())
            }
        }
    }
}

/// Write `perf` as JSON to `path`.
pub fn persist(perf: &Performance, path: &Path) -> Result<(), RunError> {
    let persist_error = |reason: String| RunError::Persist {
        path: path.display().to_string(),
        reason,
    };
    let file = File::create(path).map_err(|e| persist_error(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, perf).map_err(|e| persist_error(e.to_string()))?;
    writer.flush().map_err(|e| persist_error(e.to_string()))
}

/// Read a performance record written by [`persist`].
pub fn load_persisted(path: &Path) -> Result<Performance, RunError> {
    let file = File::open(path)?;
    serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| RunError::Persist {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Load extensions into the process-wide host, then run with the default
/// adapters.
pub fn run_algorithm(request: RunRequest, extensions: &ExtensionOptions) -> Result<Performance, RunError> {
    let host = ExtensionHost::global();
    host.load_extensions(
        extensions.load_default,
        &extensions.extensions,
        extensions.strict,
        &request.environ,
        extensions.reload,
    )?;
    Orchestrator::new(host).run(request)
}
