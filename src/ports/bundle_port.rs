//! Market data bundle port traits.
//!
//! A bundle is a named, versioned set of readers. `BundlePort::load` picks
//! the ingestion for a name and optional point-in-time timestamp.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::RunError;
use crate::domain::paths::Environ;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceField {
    pub const ALL: [PriceField; 5] = [
        PriceField::Open,
        PriceField::High,
        PriceField::Low,
        PriceField::Close,
        PriceField::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
            PriceField::Volume => "volume",
        }
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PriceField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("unknown price field {s:?}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub sid: u64,
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// A corporate action effective on `effective`. Prices before that date are
/// multiplied by `ratio`; volumes are divided by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub symbol: String,
    pub effective: NaiveDate,
    pub ratio: f64,
}

pub trait AssetFinder {
    fn lookup_symbol(&self, symbol: &str) -> Option<Asset>;

    fn assets(&self) -> Vec<Asset>;
}

pub trait BarReader {
    fn get_value(&self, symbol: &str, session: NaiveDate, field: PriceField) -> Option<f64>;

    fn first_trading_day(&self) -> Option<NaiveDate>;
}

pub trait AdjustmentReader {
    fn adjustments(&self, symbol: &str) -> Vec<Adjustment>;
}

/// The readers of one bundle ingestion.
#[derive(Clone)]
pub struct BundleData {
    pub asset_finder: Arc<dyn AssetFinder>,
    pub equity_minute_bar_reader: Option<Arc<dyn BarReader>>,
    pub equity_daily_bar_reader: Arc<dyn BarReader>,
    pub adjustment_reader: Arc<dyn AdjustmentReader>,
}

impl BundleData {
    /// First day with bar data. The minute reader wins when the bundle has one.
    pub fn first_trading_day(&self) -> Option<NaiveDate> {
        self.equity_minute_bar_reader
            .as_ref()
            .and_then(|reader| reader.first_trading_day())
            .or_else(|| self.equity_daily_bar_reader.first_trading_day())
    }
}

impl fmt::Debug for BundleData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleData")
            .field("assets", &self.asset_finder.assets().len())
            .field("has_minute_bars", &self.equity_minute_bar_reader.is_some())
            .field("first_trading_day", &self.first_trading_day())
            .finish()
    }
}

pub trait BundlePort {
    fn load(
        &self,
        name: &str,
        environ: &Environ,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<BundleData, RunError>;
}
