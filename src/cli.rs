//! CLI definition and dispatch.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::algorithm::StrategySpec;
use crate::domain::backtest::DataFrequency;
use crate::domain::calendar::get_calendar;
use crate::domain::config_resolver::resolve_configuration;
use crate::domain::error::RunError;
use crate::domain::extension::{ExtensionHost, LoadReport};
use crate::domain::namespace::build_namespace;
use crate::domain::paths::{self, Environ};
use crate::domain::script;
use crate::ports::config_port::ConfigPort;
use crate::run_algo::{run_algorithm, ExtensionOptions, OutputRoute, RunRequest, PRINT_SENTINEL};

#[derive(Parser, Debug)]
#[command(name = "algorun", about = "Assemble and run algorithm backtests")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Run(RunArgs),
    /// Check a run file and strategy without loading market data
    Validate(RunArgs),
    /// List registered metrics sets and blotters
    ListComponents(ExtensionArgs),
}

#[derive(Args, Debug, Default)]
pub struct ExtensionArgs {
    /// Extension to load: a `.algo` script path or a module name
    #[arg(short = 'x', long = "extension")]
    pub extensions: Vec<String>,
    /// Skip the default extension file
    #[arg(long)]
    pub no_default_extension: bool,
    /// Warn about failing extensions instead of aborting
    #[arg(long)]
    pub non_strict: bool,
    /// INI run file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub ext: ExtensionArgs,
    /// Strategy source file
    #[arg(short = 'f', long)]
    pub algofile: Option<PathBuf>,
    /// Strategy source text
    #[arg(short = 't', long)]
    pub algotext: Option<String>,
    /// Definition of the form name=expression, evaluated before the strategy
    #[arg(short = 'D', long = "define")]
    pub defines: Vec<String>,
    #[arg(short, long)]
    pub start: Option<NaiveDate>,
    #[arg(short, long)]
    pub end: Option<NaiveDate>,
    #[arg(long)]
    pub capital_base: Option<f64>,
    #[arg(long)]
    pub data_frequency: Option<DataFrequency>,
    #[arg(short, long)]
    pub bundle: Option<String>,
    /// Use the latest bundle ingestion not after this time
    #[arg(long)]
    pub bundle_timestamp: Option<DateTime<Utc>>,
    #[arg(long)]
    pub calendar: Option<String>,
    #[arg(long)]
    pub metrics_set: Option<String>,
    #[arg(long)]
    pub blotter: Option<String>,
    /// `-` prints the results, a path writes them as JSON
    #[arg(short, long)]
    pub output: Option<String>,
    #[arg(long)]
    pub print_algo: bool,
}

pub fn run(cli: Cli) -> ExitCode {
    let environ = paths::process_environ();
    let result = match cli.command {
        Command::Run(args) => run_backtest(&args, environ),
        Command::Validate(args) => run_validate(&args, environ),
        Command::ListComponents(args) => run_list_components(&args, &environ),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: Option<&PathBuf>) -> Result<Option<FileConfigAdapter>, RunError> {
    path.map(FileConfigAdapter::from_file).transpose()
}

/// Extension options from `[extensions]`, with command-line identifiers
/// appended after the configured ones.
pub fn build_extension_options(args: &ExtensionArgs, config: Option<&dyn ConfigPort>) -> ExtensionOptions {
    let mut options = ExtensionOptions::default();
    if let Some(config) = config {
        options.load_default = config.get_bool("extensions", "default", options.load_default);
        options.strict = config.get_bool("extensions", "strict", options.strict);
        options.extensions = config.get_list("extensions", "load");
    }
    if args.no_default_extension {
        options.load_default = false;
    }
    if args.non_strict {
        options.strict = false;
    }
    options.extensions.extend(args.extensions.iter().cloned());
    options
}

fn config_date(config: Option<&dyn ConfigPort>, key: &str) -> Result<Option<NaiveDate>, RunError> {
    let Some(raw) = config.and_then(|c| c.get_string("run", key)) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| RunError::ConfigInvalid {
            section: "run".into(),
            key: key.into(),
            reason: "invalid date format (expected YYYY-MM-DD)".into(),
        })
}

fn required_date(
    flag: Option<NaiveDate>,
    config: Option<&dyn ConfigPort>,
    key: &str,
) -> Result<NaiveDate, RunError> {
    match flag {
        Some(date) => Ok(date),
        None => config_date(config, key)?.ok_or_else(|| RunError::ConfigMissing {
            section: "run".into(),
            key: key.into(),
        }),
    }
}

fn config_parsed<T>(config: Option<&dyn ConfigPort>, key: &str) -> Result<Option<T>, RunError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = config.and_then(|c| c.get_string("run", key)) else {
        return Ok(None);
    };
    raw.parse().map(Some).map_err(|e: T::Err| RunError::ConfigInvalid {
        section: "run".into(),
        key: key.into(),
        reason: e.to_string(),
    })
}

fn resolve_strategy(args: &RunArgs, config: Option<&dyn ConfigPort>) -> Result<StrategySpec, RunError> {
    let algofile = args
        .algofile
        .clone()
        .or_else(|| config.and_then(|c| c.get_string("run", "algofile")).map(PathBuf::from));
    match (&args.algotext, algofile) {
        (Some(text), None) => Ok(StrategySpec::source(text.clone())),
        (None, Some(path)) => StrategySpec::from_file(&path),
        (Some(_), Some(_)) => Err(RunError::ConfigurationConflict {
            message: "must specify exactly one of algofile or algotext".into(),
        }),
        (None, None) => Err(RunError::ConfigurationConflict {
            message: "must specify one of algofile or algotext".into(),
        }),
    }
}

/// Merge command-line flags over the `[run]` section of the run file.
pub fn build_run_request(
    args: &RunArgs,
    config: Option<&dyn ConfigPort>,
    environ: Environ,
) -> Result<RunRequest, RunError> {
    let strategy = resolve_strategy(args, config)?;
    let start = required_date(args.start, config, "start")?;
    let end = required_date(args.end, config, "end")?;
    let setting = |key: &str| config.and_then(|c| c.get_string("run", key));

    let mut request = RunRequest::new(strategy, start, end);
    request.defines = args.defines.clone();
    if let Some(capital_base) = args.capital_base.or(config_parsed(config, "capital_base")?) {
        request.capital_base = capital_base;
    }
    if let Some(freq) = args.data_frequency.or(config_parsed(config, "data_frequency")?) {
        request.data_frequency = freq;
    }
    if let Some(bundle) = args.bundle.clone().or_else(|| setting("bundle")) {
        request.bundle = bundle;
    }
    request.bundle_timestamp = match args.bundle_timestamp {
        Some(ts) => Some(ts),
        None => config_parsed(config, "bundle_timestamp")?,
    };
    if let Some(name) = args.calendar.clone().or_else(|| setting("calendar")) {
        request.calendar = Some(get_calendar(&name)?);
    }
    if let Some(name) = args.metrics_set.clone().or_else(|| setting("metrics_set")) {
        request.metrics_set = name.into();
    }
    if let Some(name) = args.blotter.clone().or_else(|| setting("blotter")) {
        request.blotter = name.into();
    }
    let output = args
        .output
        .clone()
        .or_else(|| setting("output"))
        .unwrap_or_else(|| PRINT_SENTINEL.to_string());
    request.output = OutputRoute::parse(&output);
    request.print_algo = args.print_algo || config.is_some_and(|c| c.get_bool("run", "print_algo", false));
    request.environ = environ;
    Ok(request)
}

fn log_report(report: &LoadReport) {
    for (extension, error) in &report.failed {
        eprintln!("warning: extension {extension} not loaded: {error}");
    }
}

fn run_backtest(args: &RunArgs, environ: Environ) -> Result<(), RunError> {
    let adapter = load_config(args.ext.config.as_ref())?;
    let config = adapter.as_ref().map(|a| a as &dyn ConfigPort);
    let extensions = build_extension_options(&args.ext, config);
    let request = build_run_request(args, config, environ)?;
    info!(start = %request.start, end = %request.end, bundle = %request.bundle, "starting run");
    let perf = run_algorithm(request, &extensions)?;
    info!(sessions = perf.session_count(), "run complete");
    Ok(())
}

fn run_validate(args: &RunArgs, environ: Environ) -> Result<(), RunError> {
    let adapter = load_config(args.ext.config.as_ref())?;
    let config = adapter.as_ref().map(|a| a as &dyn ConfigPort);
    let extensions = build_extension_options(&args.ext, config);
    let host = ExtensionHost::global();
    let report = host.load_extensions(
        extensions.load_default,
        &extensions.extensions,
        extensions.strict,
        &environ,
        extensions.reload,
    )?;
    log_report(&report);

    let request = build_run_request(args, config, environ)?;
    if let StrategySpec::Source { filename, text } = &request.strategy {
        let namespace = build_namespace(&request.defines, None)?;
        let statements = script::parse_script(text).map_err(|e| RunError::Simulation {
            reason: format!("{filename}: {e}"),
        })?;
        eprintln!("Strategy {filename}: {} statements", statements.len());
        for (name, value) in namespace.iter() {
            eprintln!("  {name} = {value}");
        }
    }

    let resolved = {
        let registry = host.registry();
        resolve_configuration(
            &registry,
            request.metrics_set,
            request.blotter,
            request.calendar,
            request.start,
            request.end,
        )?
    };
    let sessions = resolved.calendar.sessions_in_range(request.start, request.end);
    eprintln!(
        "Calendar {}: {} sessions from {} to {}",
        resolved.calendar.name(),
        sessions.len(),
        request.start,
        request.end
    );
    eprintln!("Metrics: {}", resolved.metrics_set.names().join(", "));
    eprintln!("Output: {}", request.output);
    eprintln!("\nRun configuration is valid.");
    Ok(())
}

fn run_list_components(args: &ExtensionArgs, environ: &Environ) -> Result<(), RunError> {
    let adapter = load_config(args.config.as_ref())?;
    let config = adapter.as_ref().map(|a| a as &dyn ConfigPort);
    let extensions = build_extension_options(args, config);
    let host = ExtensionHost::global();
    let report = host.load_extensions(
        extensions.load_default,
        &extensions.extensions,
        extensions.strict,
        environ,
        extensions.reload,
    )?;
    log_report(&report);

    let registry = host.registry();
    println!("metrics sets:");
    for name in registry.metrics_sets.names() {
        println!("  {name}");
    }
    println!("blotters:");
    for name in registry.blotters.names() {
        println!("  {name}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn args_with_text() -> RunArgs {
        RunArgs {
            algotext: Some("x = 1".into()),
            ..RunArgs::default()
        }
    }

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "algorun", "run", "-t", "order(\"AAA\", 1)", "-D", "n=3", "-s", "2024-01-02", "-e",
            "2024-01-31", "-x", "risk.algo", "--metrics-set", "none", "-o", "-",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.defines, vec!["n=3".to_string()]);
        assert_eq!(args.start, Some(date("2024-01-02")));
        assert_eq!(args.ext.extensions, vec!["risk.algo".to_string()]);
        assert_eq!(args.metrics_set.as_deref(), Some("none"));
    }

    #[test]
    fn flags_override_run_file() {
        let config = FileConfigAdapter::from_string(
            "[run]\nstart = 2024-01-02\nend = 2024-02-01\nbundle = csvdir\ncapital_base = 5000\n",
        )
        .unwrap();
        let mut args = args_with_text();
        args.bundle = Some("other".into());
        args.end = Some(date("2024-01-10"));
        let request = build_run_request(&args, Some(&config as &dyn ConfigPort), Environ::new()).unwrap();
        assert_eq!(request.start, date("2024-01-02"));
        assert_eq!(request.end, date("2024-01-10"));
        assert_eq!(request.bundle, "other");
        assert_eq!(request.capital_base, 5000.0);
        assert_eq!(request.output, OutputRoute::Print);
    }

    #[test]
    fn missing_start_is_config_missing() {
        let mut args = args_with_text();
        args.end = Some(date("2024-01-10"));
        let err = build_run_request(&args, None, Environ::new()).unwrap_err();
        assert!(matches!(err, RunError::ConfigMissing { ref key, .. } if key == "start"));
    }

    #[test]
    fn invalid_config_values_are_reported() {
        let config =
            FileConfigAdapter::from_string("[run]\nstart = 2024-01-02\nend = 01/10/2024\n").unwrap();
        let err = build_run_request(&args_with_text(), Some(&config as &dyn ConfigPort), Environ::new()).unwrap_err();
        assert!(matches!(err, RunError::ConfigInvalid { ref key, .. } if key == "end"));

        let config = FileConfigAdapter::from_string(
            "[run]\nstart = 2024-01-02\nend = 2024-01-10\ndata_frequency = hourly\n",
        )
        .unwrap();
        let err = build_run_request(&args_with_text(), Some(&config as &dyn ConfigPort), Environ::new()).unwrap_err();
        assert!(matches!(err, RunError::ConfigInvalid { ref key, .. } if key == "data_frequency"));
    }

    #[test]
    fn strategy_needs_exactly_one_source() {
        let mut args = args_with_text();
        args.algofile = Some(PathBuf::from("algo.algo"));
        assert!(matches!(
            resolve_strategy(&args, None),
            Err(RunError::ConfigurationConflict { .. })
        ));
        assert!(matches!(
            resolve_strategy(&RunArgs::default(), None),
            Err(RunError::ConfigurationConflict { .. })
        ));
    }

    #[test]
    fn unknown_calendar_fails_request() {
        let mut args = args_with_text();
        args.start = Some(date("2024-01-02"));
        args.end = Some(date("2024-01-10"));
        args.calendar = Some("XMARS".into());
        assert!(build_run_request(&args, None, Environ::new()).is_err());
    }

    #[test]
    fn extension_options_merge_file_and_flags() {
        let config = FileConfigAdapter::from_string(
            "[extensions]\ndefault = false\nload = a.algo, pkg.mod\n",
        )
        .unwrap();
        let args = ExtensionArgs {
            extensions: vec!["b.algo".into()],
            non_strict: true,
            ..ExtensionArgs::default()
        };
        let options = build_extension_options(&args, Some(&config as &dyn ConfigPort));
        assert!(!options.load_default);
        assert!(!options.strict);
        assert_eq!(options.extensions, vec!["a.algo", "pkg.mod", "b.algo"]);
    }
}
