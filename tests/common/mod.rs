#![allow(dead_code)]

use algorun::domain::calendar::WeekdayCalendar;
use algorun::domain::data_portal::BenchmarkReturns;
use algorun::domain::error::RunError;
use algorun::domain::paths::Environ;
use algorun::ports::benchmark_port::BenchmarkPort;
use algorun::ports::bundle_port::{
    Adjustment, AdjustmentReader, Asset, AssetFinder, BarReader, BundleData, BundlePort, PriceField,
};
use algorun::ports::calendar_port::TradingCalendar;
use algorun::ports::display_port::DisplaySink;
use chrono::{DateTime, NaiveDate, Utc};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn weekdays() -> Arc<dyn TradingCalendar> {
    Arc::new(WeekdayCalendar::weekdays())
}

/// Daily closes keyed by symbol; every price field reads the close.
#[derive(Default)]
pub struct MapBars {
    pub closes: HashMap<String, BTreeMap<NaiveDate, f64>>,
}

impl MapBars {
    pub fn with_closes(mut self, symbol: &str, closes: &[(NaiveDate, f64)]) -> Self {
        self.closes
            .entry(symbol.to_string())
            .or_default()
            .extend(closes.iter().copied());
        self
    }
}

impl BarReader for MapBars {
    fn get_value(&self, symbol: &str, session: NaiveDate, field: PriceField) -> Option<f64> {
        let close = self.closes.get(symbol)?.get(&session).copied()?;
        Some(match field {
            PriceField::Volume => 1_000.0,
            _ => close,
        })
    }

    fn first_trading_day(&self) -> Option<NaiveDate> {
        self.closes.values().filter_map(|c| c.keys().next().copied()).min()
    }
}

impl AssetFinder for MapBars {
    fn lookup_symbol(&self, symbol: &str) -> Option<Asset> {
        self.assets().into_iter().find(|a| a.symbol == symbol)
    }

    fn assets(&self) -> Vec<Asset> {
        let mut symbols: Vec<&String> = self.closes.keys().collect();
        symbols.sort();
        symbols
            .into_iter()
            .enumerate()
            .filter_map(|(sid, symbol)| {
                let closes = &self.closes[symbol];
                Some(Asset {
                    sid: sid as u64,
                    symbol: symbol.clone(),
                    start_date: *closes.keys().next()?,
                    end_date: *closes.keys().next_back()?,
                })
            })
            .collect()
    }
}

pub struct NoAdjustments;

impl AdjustmentReader for NoAdjustments {
    fn adjustments(&self, _symbol: &str) -> Vec<Adjustment> {
        Vec::new()
    }
}

/// Bundle port that counts loads and records the names asked for.
pub struct MockBundlePort {
    pub bars: Arc<MapBars>,
    pub calls: Rc<Cell<usize>>,
    pub requested: Rc<RefCell<Vec<(String, Option<DateTime<Utc>>)>>>,
}

impl MockBundlePort {
    pub fn new(bars: MapBars) -> Self {
        Self {
            bars: Arc::new(bars),
            calls: Rc::new(Cell::new(0)),
            requested: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl BundlePort for MockBundlePort {
    fn load(
        &self,
        name: &str,
        _environ: &Environ,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<BundleData, RunError> {
        self.calls.set(self.calls.get() + 1);
        self.requested.borrow_mut().push((name.to_string(), timestamp));
        Ok(BundleData {
            asset_finder: self.bars.clone(),
            equity_minute_bar_reader: None,
            equity_daily_bar_reader: self.bars.clone(),
            adjustment_reader: Arc::new(NoAdjustments),
        })
    }
}

pub struct MockBenchmark {
    pub returns: BenchmarkReturns,
    pub calls: Rc<Cell<usize>>,
}

impl MockBenchmark {
    pub fn flat() -> Self {
        Self {
            returns: BenchmarkReturns::default(),
            calls: Rc::new(Cell::new(0)),
        }
    }
}

impl BenchmarkPort for MockBenchmark {
    fn load(&self, _environ: &Environ) -> Result<BenchmarkReturns, RunError> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.returns.clone())
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    pub lines: Rc<RefCell<Vec<String>>>,
}

impl DisplaySink for RecordingSink {
    fn echo(&self, text: &str) {
        self.lines.borrow_mut().push(text.to_string());
    }

    fn echo_source(&self, filename: &str, text: &str) {
        self.lines.borrow_mut().push(format!("source {filename}"));
        self.echo(text);
    }
}

/// Closes of 100 + day-of-month for Jan 8-12 2024.
pub fn rising_bars(symbol: &str) -> MapBars {
    let closes: Vec<(NaiveDate, f64)> = (8..=12).map(|d| (date(2024, 1, d), 100.0 + d as f64)).collect();
    MapBars::default().with_closes(symbol, &closes)
}

pub fn write_script(dir: &Path, name: &str, text: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path.to_string_lossy().into_owned()
}
