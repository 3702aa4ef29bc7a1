//! Run metrics: per-session packets and end-of-run summary.
//!
//! A `MetricsSet` is an ordered collection of `Metric`s. The simulator calls
//! `start` once, `record` after every session close and `finalize` once the
//! last session has been recorded.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::ledger::Ledger;

/// What a metric may observe at a session close.
#[derive(Debug, Clone, Copy)]
pub struct SessionContext<'a> {
    pub session: NaiveDate,
    pub ledger: &'a Ledger,
    pub benchmark_return: Option<f64>,
    pub orders_placed: usize,
}

pub type Packet = BTreeMap<String, f64>;

pub trait Metric {
    fn name(&self) -> &'static str;

    fn start(&mut self, _capital_base: f64) {}

    fn record(&mut self, ctx: &SessionContext<'_>, packet: &mut Packet);

    fn finalize(&mut self, _summary: &mut Packet) {}
}

#[derive(Default)]
pub struct MetricsSet {
    metrics: Vec<Box<dyn Metric>>,
}

impl MetricsSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(metrics: Vec<Box<dyn Metric>>) -> Self {
        MetricsSet { metrics }
    }

    pub fn push(&mut self, metric: Box<dyn Metric>) {
        self.metrics.push(metric);
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.metrics.iter().map(|m| m.name()).collect()
    }

    pub fn start(&mut self, capital_base: f64) {
        for metric in &mut self.metrics {
            metric.start(capital_base);
        }
    }

    pub fn record(&mut self, ctx: &SessionContext<'_>) -> Packet {
        let mut packet = Packet::new();
        for metric in &mut self.metrics {
            metric.record(ctx, &mut packet);
        }
        packet
    }

    pub fn finalize(&mut self) -> Packet {
        let mut summary = Packet::new();
        for metric in &mut self.metrics {
            metric.finalize(&mut summary);
        }
        summary
    }
}

impl std::fmt::Debug for MetricsSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsSet")
            .field("metrics", &self.names())
            .finish()
    }
}

pub const BUILTIN_METRICS: [&str; 7] = [
    "returns",
    "portfolio_value",
    "cash",
    "benchmark",
    "positions_value",
    "session_count",
    "orders",
];

/// Constructor for a builtin metric kind.
pub fn builtin_metric(kind: &str) -> Option<fn() -> Box<dyn Metric>> {
    let ctor: fn() -> Box<dyn Metric> = match kind {
        "returns" => || Box::new(Returns::default()),
        "portfolio_value" => || Box::new(PortfolioValue::default()),
        "cash" => || Box::new(Cash),
        "benchmark" => || Box::new(Benchmark::default()),
        "positions_value" => || Box::new(PositionsValue),
        "session_count" => || Box::new(SessionCount::default()),
        "orders" => || Box::new(Orders::default()),
        _ => return None,
    };
    Some(ctor)
}

/// Every builtin metric, in `BUILTIN_METRICS` order.
pub fn default_metrics() -> MetricsSet {
    MetricsSet::new(
        BUILTIN_METRICS
            .iter()
            .filter_map(|kind| builtin_metric(kind))
            .map(|ctor| ctor())
            .collect(),
    )
}

#[derive(Debug, Default)]
struct Returns {
    capital_base: f64,
    previous: f64,
    peak: f64,
    max_drawdown: f64,
    last: f64,
}

impl Metric for Returns {
    fn name(&self) -> &'static str {
        "returns"
    }

    fn start(&mut self, capital_base: f64) {
        self.capital_base = capital_base;
        self.previous = capital_base;
        self.peak = capital_base;
        self.last = capital_base;
    }

    fn record(&mut self, ctx: &SessionContext<'_>, packet: &mut Packet) {
        let value = ctx.ledger.portfolio_value();
        let daily = if self.previous != 0.0 {
            value / self.previous - 1.0
        } else {
            0.0
        };
        if value > self.peak {
            self.peak = value;
        } else if self.peak > 0.0 {
            self.max_drawdown = self.max_drawdown.max((self.peak - value) / self.peak);
        }
        self.previous = value;
        self.last = value;
        packet.insert("returns".into(), daily);
    }

    fn finalize(&mut self, summary: &mut Packet) {
        let total = if self.capital_base != 0.0 {
            self.last / self.capital_base - 1.0
        } else {
            0.0
        };
        summary.insert("algorithm_period_return".into(), total);
        summary.insert("max_drawdown".into(), self.max_drawdown);
    }
}

#[derive(Debug, Default)]
struct PortfolioValue {
    last: Option<f64>,
}

impl Metric for PortfolioValue {
    fn name(&self) -> &'static str {
        "portfolio_value"
    }

    fn record(&mut self, ctx: &SessionContext<'_>, packet: &mut Packet) {
        let value = ctx.ledger.portfolio_value();
        self.last = Some(value);
        packet.insert("portfolio_value".into(), value);
    }

    fn finalize(&mut self, summary: &mut Packet) {
        if let Some(value) = self.last {
            summary.insert("ending_portfolio_value".into(), value);
        }
    }
}

#[derive(Debug)]
struct Cash;

impl Metric for Cash {
    fn name(&self) -> &'static str {
        "cash"
    }

    fn record(&mut self, ctx: &SessionContext<'_>, packet: &mut Packet) {
        packet.insert("ending_cash".into(), ctx.ledger.cash);
    }
}

#[derive(Debug, Default)]
struct Benchmark {
    cumulative: f64,
    seen: bool,
}

impl Metric for Benchmark {
    fn name(&self) -> &'static str {
        "benchmark"
    }

    fn start(&mut self, _capital_base: f64) {
        self.cumulative = 1.0;
        self.seen = false;
    }

    fn record(&mut self, ctx: &SessionContext<'_>, packet: &mut Packet) {
        let daily = ctx.benchmark_return.unwrap_or(0.0);
        self.seen |= ctx.benchmark_return.is_some();
        self.cumulative *= 1.0 + daily;
        packet.insert("benchmark_return".into(), daily);
    }

    fn finalize(&mut self, summary: &mut Packet) {
        if self.seen {
            summary.insert("benchmark_period_return".into(), self.cumulative - 1.0);
        }
    }
}

#[derive(Debug)]
struct PositionsValue;

impl Metric for PositionsValue {
    fn name(&self) -> &'static str {
        "positions_value"
    }

    fn record(&mut self, ctx: &SessionContext<'_>, packet: &mut Packet) {
        packet.insert("positions_value".into(), ctx.ledger.positions_value());
    }
}

#[derive(Debug, Default)]
struct SessionCount {
    sessions: usize,
}

impl Metric for SessionCount {
    fn name(&self) -> &'static str {
        "session_count"
    }

    fn start(&mut self, _capital_base: f64) {
        self.sessions = 0;
    }

    fn record(&mut self, _ctx: &SessionContext<'_>, _packet: &mut Packet) {
        self.sessions += 1;
    }

    fn finalize(&mut self, summary: &mut Packet) {
        summary.insert("trading_days".into(), self.sessions as f64);
    }
}

#[derive(Debug, Default)]
struct Orders {
    total: usize,
}

impl Metric for Orders {
    fn name(&self) -> &'static str {
        "orders"
    }

    fn record(&mut self, ctx: &SessionContext<'_>, packet: &mut Packet) {
        self.total += ctx.orders_placed;
        packet.insert("orders".into(), ctx.orders_placed as f64);
    }

    fn finalize(&mut self, summary: &mut Packet) {
        summary.insert("total_orders".into(), self.total as f64);
    }
}
