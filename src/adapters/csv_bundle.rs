//! CSV bundle store.
//!
//! Layout under the data root:
//!
//! ```text
//! <bundle>/<ingestion>/daily/<SYMBOL>.csv     date,open,high,low,close,volume
//! <bundle>/<ingestion>/minute/<SYMBOL>.csv    optional, same columns
//! <bundle>/<ingestion>/adjustments.csv        optional, symbol,effective,ratio
//! ```
//!
//! Ingestion directories are named `%Y-%m-%dT%H-%M-%S` (UTC). The newest
//! ingestion not after the requested timestamp is loaded.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::error::RunError;
use crate::domain::paths::{self, Environ};
use crate::ports::bundle_port::{
    Adjustment, AdjustmentReader, Asset, AssetFinder, BarReader, BundleData, BundlePort,
    PriceField,
};

pub const INGESTION_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

#[derive(Debug, Deserialize)]
struct BarRow {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct AdjustmentRow {
    symbol: String,
    effective: NaiveDate,
    ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bar {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl Bar {
    fn get(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Open => self.open,
            PriceField::High => self.high,
            PriceField::Low => self.low,
            PriceField::Close => self.close,
            PriceField::Volume => self.volume,
        }
    }
}

/// Bars keyed by symbol then session.
#[derive(Debug, Default)]
pub struct CsvBars {
    bars: HashMap<String, BTreeMap<NaiveDate, Bar>>,
}

impl CsvBars {
    /// Read every `<SYMBOL>.csv` in `dir`. Rows sharing a date keep the last
    /// one, so minute files collapse to their closing bar.
    pub fn from_dir(dir: &Path) -> Result<Self, RunError> {
        let entries = fs::read_dir(dir).map_err(|e| RunError::BundleData {
            reason: format!("failed to read directory {}: {}", dir.display(), e),
        })?;
        let mut bars = HashMap::new();
        for entry in entries {
            let path = entry
                .map_err(|e| RunError::BundleData {
                    reason: format!("directory entry error: {}", e),
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(symbol) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            bars.insert(symbol.to_uppercase(), read_bars(&path)?);
        }
        Ok(CsvBars { bars })
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.bars.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    fn range(&self, symbol: &str) -> Option<(NaiveDate, NaiveDate)> {
        let bars = self.bars.get(symbol)?;
        Some((*bars.keys().next()?, *bars.keys().next_back()?))
    }
}

impl BarReader for CsvBars {
    fn get_value(&self, symbol: &str, session: NaiveDate, field: PriceField) -> Option<f64> {
        self.bars
            .get(symbol)
            .and_then(|bars| bars.get(&session))
            .map(|bar| bar.get(field))
    }

    fn first_trading_day(&self) -> Option<NaiveDate> {
        self.bars
            .values()
            .filter_map(|bars| bars.keys().next().copied())
            .min()
    }
}

fn parse_session(raw: &str) -> Option<NaiveDate> {
    let date = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn read_bars(path: &Path) -> Result<BTreeMap<NaiveDate, Bar>, RunError> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| RunError::BundleData {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;
    let mut bars = BTreeMap::new();
    for result in rdr.deserialize::<BarRow>() {
        let row = result.map_err(|e| RunError::BundleData {
            reason: format!("CSV parse error in {}: {}", path.display(), e),
        })?;
        let session = parse_session(&row.date).ok_or_else(|| RunError::BundleData {
            reason: format!("invalid date {:?} in {}", row.date, path.display()),
        })?;
        bars.insert(
            session,
            Bar {
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            },
        );
    }
    Ok(bars)
}

/// Assets derived from the daily files, sids assigned in symbol order.
#[derive(Debug, Default)]
pub struct CsvAssets {
    assets: Vec<Asset>,
}

impl CsvAssets {
    pub fn from_bars(bars: &CsvBars) -> Self {
        let assets = bars
            .symbols()
            .into_iter()
            .enumerate()
            .filter_map(|(sid, symbol)| {
                let (start_date, end_date) = bars.range(&symbol)?;
                Some(Asset {
                    sid: sid as u64,
                    symbol,
                    start_date,
                    end_date,
                })
            })
            .collect();
        CsvAssets { assets }
    }
}

impl AssetFinder for CsvAssets {
    fn lookup_symbol(&self, symbol: &str) -> Option<Asset> {
        self.assets
            .iter()
            .find(|a| a.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
    }

    fn assets(&self) -> Vec<Asset> {
        self.assets.clone()
    }
}

#[derive(Debug, Default)]
pub struct CsvAdjustments {
    by_symbol: HashMap<String, Vec<Adjustment>>,
}

impl CsvAdjustments {
    pub fn from_file(path: &Path) -> Result<Self, RunError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let mut rdr = csv::Reader::from_path(path).map_err(|e| RunError::BundleData {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        let mut by_symbol: HashMap<String, Vec<Adjustment>> = HashMap::new();
        for result in rdr.deserialize::<AdjustmentRow>() {
            let row = result.map_err(|e| RunError::BundleData {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;
            let symbol = row.symbol.to_uppercase();
            by_symbol.entry(symbol.clone()).or_default().push(Adjustment {
                symbol,
                effective: row.effective,
                ratio: row.ratio,
            });
        }
        Ok(CsvAdjustments { by_symbol })
    }
}

impl AdjustmentReader for CsvAdjustments {
    fn adjustments(&self, symbol: &str) -> Vec<Adjustment> {
        self.by_symbol.get(symbol).cloned().unwrap_or_default()
    }
}

pub struct CsvBundleStore {
    root: Option<PathBuf>,
}

impl CsvBundleStore {
    /// Store rooted at the environment's data directory.
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }

    fn bundle_dir(&self, name: &str, environ: &Environ) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| paths::data_root(environ))
            .join(name)
    }

    /// Ingestion timestamps available for `name`, oldest first.
    pub fn ingestions(&self, name: &str, environ: &Environ) -> Result<Vec<DateTime<Utc>>, RunError> {
        let dir = self.bundle_dir(name, environ);
        let entries = fs::read_dir(&dir).map_err(|e| RunError::BundleNotFound {
            bundle: name.to_string(),
            reason: format!("{}: {}", dir.display(), e),
        })?;
        let mut found: Vec<DateTime<Utc>> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let file_name = entry.file_name();
                let stamp = NaiveDateTime::parse_from_str(file_name.to_str()?, INGESTION_FORMAT).ok()?;
                Some(stamp.and_utc())
            })
            .collect();
        found.sort();
        Ok(found)
    }
}

impl Default for CsvBundleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BundlePort for CsvBundleStore {
    fn load(
        &self,
        name: &str,
        environ: &Environ,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<BundleData, RunError> {
        let as_of = timestamp.unwrap_or_else(Utc::now);
        let ingestion = self
            .ingestions(name, environ)?
            .into_iter()
            .filter(|stamp| *stamp <= as_of)
            .next_back()
            .ok_or_else(|| RunError::BundleNotFound {
                bundle: name.to_string(),
                reason: format!("no ingestion at or before {as_of}"),
            })?;
        let dir = self
            .bundle_dir(name, environ)
            .join(ingestion.format(INGESTION_FORMAT).to_string());
        debug!(bundle = name, dir = %dir.display(), "loading bundle ingestion");

        let daily = CsvBars::from_dir(&dir.join("daily"))?;
        let minute_dir = dir.join("minute");
        let minute: Option<Arc<dyn BarReader>> = if minute_dir.is_dir() {
            Some(Arc::new(CsvBars::from_dir(&minute_dir)?))
        } else {
            None
        };
        let assets = CsvAssets::from_bars(&daily);
        let adjustments = CsvAdjustments::from_file(&dir.join("adjustments.csv"))?;
        info!(
            bundle = name,
            ingestion = %ingestion,
            assets = assets.assets.len(),
            "loaded bundle"
        );

        Ok(BundleData {
            asset_finder: Arc::new(assets),
            equity_minute_bar_reader: minute,
            equity_daily_bar_reader: Arc::new(daily),
            adjustment_reader: Arc::new(adjustments),
        })
    }
}
