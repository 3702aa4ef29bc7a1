//! Integration tests for run orchestration.
//!
//! Tests cover:
//! - End-to-end runs with mock bundle and benchmark ports
//! - Validation failures raised before any data is opened
//! - Output routing: print, discard and JSON persistence
//! - Definitions and strategy echo
//! - The library entry point and its default extension file

mod common;

use algorun::domain::algorithm::{AlgoCallbacks, StrategySpec};
use algorun::domain::error::RunError;
use algorun::domain::extension::ExtensionHost;
use algorun::domain::namespace::Namespace;
use algorun::domain::registry::ComponentKind;
use algorun::domain::paths::{self, Environ};
use algorun::run_algo::{load_persisted, run_algorithm, ExtensionOptions, Orchestrator, OutputRoute, RunRequest};
use common::*;
use std::cell::Cell;
use std::rc::Rc;

fn request(strategy: StrategySpec) -> RunRequest {
    let mut request = RunRequest::new(strategy, date(2024, 1, 8), date(2024, 1, 12));
    request.calendar = Some(weekdays());
    request.capital_base = 100_000.0;
    request
}

mod full_run {
    use super::*;

    #[test]
    fn runs_every_session_with_no_metrics() {
        let host = ExtensionHost::new();
        let bundles = MockBundlePort::new(rising_bars("AAA"));
        let calls = bundles.calls.clone();
        let orchestrator = Orchestrator::new(&host)
            .with_bundles(bundles)
            .with_benchmarks(MockBenchmark::flat());

        let mut req = request(StrategySpec::source("order('AAA', 1)\n"));
        req.metrics_set = "none".into();
        let perf = orchestrator.run(req).unwrap();

        assert_eq!(perf.session_count(), 5);
        assert!(perf.summary.is_empty());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn default_metrics_track_fills() {
        let host = ExtensionHost::new();
        let orchestrator = Orchestrator::new(&host)
            .with_bundles(MockBundlePort::new(rising_bars("AAA")))
            .with_benchmarks(MockBenchmark::flat());

        let callbacks = AlgoCallbacks::new().initialize(|ctx| {
            ctx.order("AAA", 100);
            Ok(())
        });
        let perf = orchestrator.run(request(StrategySpec::Callbacks(callbacks))).unwrap();

        // Bought at 108, marked at 112 on the last session.
        assert_eq!(perf.summary["ending_portfolio_value"], 100_000.0 + 400.0);
        assert_eq!(perf.summary["total_orders"], 1.0);
        assert_eq!(perf.summary["trading_days"], 5.0);
    }

    #[test]
    fn bundle_name_and_timestamp_reach_the_port() {
        let host = ExtensionHost::new();
        let bundles = MockBundlePort::new(rising_bars("AAA"));
        let requested = bundles.requested.clone();
        let orchestrator = Orchestrator::new(&host)
            .with_bundles(bundles)
            .with_benchmarks(MockBenchmark::flat());

        let mut req = request(StrategySpec::source(""));
        req.bundle = "csvdir".into();
        let ts = "2024-02-01T00:00:00Z".parse().unwrap();
        req.bundle_timestamp = Some(ts);
        orchestrator.run(req).unwrap();

        assert_eq!(requested.borrow().as_slice(), &[("csvdir".to_string(), Some(ts))]);
    }

    #[test]
    fn supplied_benchmark_skips_the_port() {
        let host = ExtensionHost::new();
        let benchmark = MockBenchmark::flat();
        let calls = benchmark.calls.clone();
        let orchestrator = Orchestrator::new(&host)
            .with_bundles(MockBundlePort::new(rising_bars("AAA")))
            .with_benchmarks(benchmark);

        let mut req = request(StrategySpec::source(""));
        req.benchmark_returns = Some(Default::default());
        orchestrator.run(req).unwrap();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn unregistered_pipeline_column_fails_the_run() {
        let host = ExtensionHost::new();
        let orchestrator = Orchestrator::new(&host)
            .with_bundles(MockBundlePort::new(rising_bars("AAA")))
            .with_benchmarks(MockBenchmark::flat());

        let err = orchestrator
            .run(request(StrategySpec::source("pe = pipeline('Fundamentals.pe', 'AAA')\n")))
            .unwrap_err();
        assert!(matches!(err, RunError::UnregisteredColumn { ref column } if column == "Fundamentals.pe"));
    }

    #[test]
    fn pricing_columns_resolve() {
        let host = ExtensionHost::new();
        let orchestrator = Orchestrator::new(&host)
            .with_bundles(MockBundlePort::new(rising_bars("AAA")))
            .with_benchmarks(MockBenchmark::flat());
        let perf = orchestrator
            .run(request(StrategySpec::source("c = pipeline('EquityPricing.close', 'AAA')\n")))
            .unwrap();
        assert_eq!(perf.session_count(), 5);
    }
}

mod validation_before_data {
    use super::*;

    fn counting_orchestrator(host: &ExtensionHost) -> (Orchestrator<'_>, Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let bundles = MockBundlePort::new(rising_bars("AAA"));
        let benchmark = MockBenchmark::flat();
        let (bundle_calls, benchmark_calls) = (bundles.calls.clone(), benchmark.calls.clone());
        let orchestrator = Orchestrator::new(host)
            .with_bundles(bundles)
            .with_benchmarks(benchmark);
        (orchestrator, bundle_calls, benchmark_calls)
    }

    #[test]
    fn unknown_metrics_set_fails_before_loading() {
        let host = ExtensionHost::new();
        let (orchestrator, bundle_calls, benchmark_calls) = counting_orchestrator(&host);
        let mut req = request(StrategySpec::source(""));
        req.metrics_set = "does-not-exist".into();

        let err = orchestrator.run(req).unwrap_err();
        assert!(matches!(
            err,
            RunError::UnknownComponent { kind: ComponentKind::MetricsSet, ref name } if name == "does-not-exist"
        ));
        assert_eq!(bundle_calls.get(), 0);
        assert_eq!(benchmark_calls.get(), 0);
    }

    #[test]
    fn unknown_blotter_fails_before_loading() {
        let host = ExtensionHost::new();
        let (orchestrator, bundle_calls, _) = counting_orchestrator(&host);
        let mut req = request(StrategySpec::source(""));
        req.blotter = "fancy".into();

        let err = orchestrator.run(req).unwrap_err();
        assert!(matches!(err, RunError::UnknownComponent { kind: ComponentKind::Blotter, .. }));
        assert_eq!(bundle_calls.get(), 0);
    }

    #[test]
    fn weekend_only_range_is_empty() {
        let host = ExtensionHost::new();
        let (orchestrator, bundle_calls, _) = counting_orchestrator(&host);
        let mut req = request(StrategySpec::source(""));
        req.start = date(2024, 1, 6);
        req.end = date(2024, 1, 7);

        let err = orchestrator.run(req).unwrap_err();
        assert!(matches!(err, RunError::EmptyDateRange { .. }));
        assert_eq!(bundle_calls.get(), 0);
    }

    #[test]
    fn defines_with_callbacks_conflict() {
        let host = ExtensionHost::new();
        let (orchestrator, bundle_calls, _) = counting_orchestrator(&host);
        let mut req = request(StrategySpec::Callbacks(AlgoCallbacks::new()));
        req.defines = vec!["x=1".into()];

        let err = orchestrator.run(req).unwrap_err();
        assert!(matches!(err, RunError::ConfigurationConflict { .. }));
        assert_eq!(bundle_calls.get(), 0);
    }

    #[test]
    fn bad_define_fails_before_loading() {
        let host = ExtensionHost::new();
        let (orchestrator, bundle_calls, _) = counting_orchestrator(&host);
        let mut req = request(StrategySpec::source(""));
        req.defines = vec!["x=1".into(), "novalue".into()];

        let err = orchestrator.run(req).unwrap_err();
        assert!(matches!(err, RunError::DefinitionSyntax { ref define } if define == "novalue"));
        assert_eq!(bundle_calls.get(), 0);
    }

    #[test]
    fn extension_registered_component_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let ext = write_script(dir.path(), "lean.algo", "register_metrics_set('lean', ['returns'])\n");
        let host = ExtensionHost::new();
        host.load_extensions(false, &[ext], true, &Default::default(), false)
            .unwrap();

        let (orchestrator, _, _) = counting_orchestrator(&host);
        let mut req = request(StrategySpec::source(""));
        req.metrics_set = "lean".into();
        let perf = orchestrator.run(req).unwrap();
        assert_eq!(perf.column("returns").len(), 5);
        assert!(perf.summary.contains_key("algorithm_period_return"));
        assert!(!perf.summary.contains_key("ending_portfolio_value"));
    }
}

mod definitions {
    use super::*;

    #[test]
    fn defines_reach_the_strategy() {
        let host = ExtensionHost::new();
        let orchestrator = Orchestrator::new(&host)
            .with_bundles(MockBundlePort::new(rising_bars("AAA")))
            .with_benchmarks(MockBenchmark::flat());

        let mut req = request(StrategySpec::source("order('AAA', size)\n"));
        req.defines = vec!["base=5".into(), "size=base * 2".into()];
        let perf = orchestrator.run(req).unwrap();
        // Ten shares a session, marked at 112 after five sessions.
        assert_eq!(perf.rows[4].columns["positions_value"], 50.0 * 112.0);
    }

    #[test]
    fn local_namespace_seeds_definitions() {
        let host = ExtensionHost::new();
        let orchestrator = Orchestrator::new(&host)
            .with_bundles(MockBundlePort::new(rising_bars("AAA")))
            .with_benchmarks(MockBenchmark::flat());

        let mut seed = Namespace::new();
        seed.insert("lot", algorun::domain::expr::Value::Int(3));
        let mut req = request(StrategySpec::source("order('AAA', size)\n"));
        req.local_namespace = Some(seed);
        req.defines = vec!["size=lot + 1".into()];
        let perf = orchestrator.run(req).unwrap();
        assert_eq!(perf.rows[0].columns["positions_value"], 4.0 * 108.0);
    }
}

mod output {
    use super::*;

    #[test]
    fn print_algo_echoes_source_before_running() {
        let host = ExtensionHost::new();
        let sink = RecordingSink::default();
        let lines = sink.lines.clone();
        let orchestrator = Orchestrator::new(&host)
            .with_bundles(MockBundlePort::new(rising_bars("AAA")))
            .with_benchmarks(MockBenchmark::flat())
            .with_display(sink);

        let mut req = request(StrategySpec::source("x = 1\n"));
        req.print_algo = true;
        orchestrator.run(req).unwrap();

        let lines = lines.borrow();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "source <algorithm>");
        assert_eq!(lines[1], "x = 1\n");
    }

    #[test]
    fn print_route_renders_table() {
        let host = ExtensionHost::new();
        let sink = RecordingSink::default();
        let lines = sink.lines.clone();
        let orchestrator = Orchestrator::new(&host)
            .with_bundles(MockBundlePort::new(rising_bars("AAA")))
            .with_benchmarks(MockBenchmark::flat())
            .with_display(sink);

        let mut req = request(StrategySpec::source(""));
        req.output = OutputRoute::Print;
        orchestrator.run(req).unwrap();

        let lines = lines.borrow();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("[5 rows x"));
    }

    #[test]
    fn discard_route_prints_nothing() {
        let host = ExtensionHost::new();
        let sink = RecordingSink::default();
        let lines = sink.lines.clone();
        let orchestrator = Orchestrator::new(&host)
            .with_bundles(MockBundlePort::new(rising_bars("AAA")))
            .with_benchmarks(MockBenchmark::flat())
            .with_display(sink);

        orchestrator.run(request(StrategySpec::source(""))).unwrap();
        assert!(lines.borrow().is_empty());
    }

    #[test]
    fn persist_route_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perf.json");
        let host = ExtensionHost::new();
        let orchestrator = Orchestrator::new(&host)
            .with_bundles(MockBundlePort::new(rising_bars("AAA")))
            .with_benchmarks(MockBenchmark::flat());

        let mut req = request(StrategySpec::source("order('AAA', 1)\n"));
        req.output = OutputRoute::Persist(path.clone());
        let perf = orchestrator.run(req).unwrap();

        let restored = load_persisted(&path).unwrap();
        assert_eq!(restored.session_count(), 5);
        assert_eq!(restored.sessions(), perf.sessions());
        assert_eq!(restored.summary.keys().collect::<Vec<_>>(), perf.summary.keys().collect::<Vec<_>>());
    }
}

mod library_entry {
    use super::*;

    #[test]
    fn run_algorithm_creates_default_extension_under_root() {
        let root = tempfile::tempdir().unwrap();
        let mut req = request(StrategySpec::source(""));
        req.environ = Environ::from([(
            paths::ROOT_VAR.to_string(),
            root.path().to_string_lossy().into_owned(),
        )]);
        req.blotter = "no-such-blotter".into();

        let err = run_algorithm(req, &ExtensionOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            RunError::UnknownComponent { kind: ComponentKind::Blotter, .. }
        ));
        assert!(root.path().join(paths::DEFAULT_EXTENSION).is_file());
    }
}
