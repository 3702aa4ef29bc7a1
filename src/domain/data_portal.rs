//! Data access for a run: bar lookups and benchmark returns.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ports::bundle_port::{
    AdjustmentReader, Asset, AssetFinder, BarReader, BundleData, PriceField,
};

/// Daily benchmark returns keyed by session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReturns {
    returns: BTreeMap<NaiveDate, f64>,
}

impl BenchmarkReturns {
    pub fn new(returns: BTreeMap<NaiveDate, f64>) -> Self {
        BenchmarkReturns { returns }
    }

    /// Returns derived from consecutive closes. The first close has no return.
    pub fn from_closes(closes: &[(NaiveDate, f64)]) -> Self {
        let returns = closes
            .windows(2)
            .filter(|pair| pair[0].1 != 0.0)
            .map(|pair| (pair[1].0, pair[1].1 / pair[0].1 - 1.0))
            .collect();
        BenchmarkReturns { returns }
    }

    pub fn get(&self, session: NaiveDate) -> Option<f64> {
        self.returns.get(&session).copied()
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }
}

/// Read access to one bundle's readers for the duration of a run.
#[derive(Clone)]
pub struct DataPortal {
    asset_finder: Arc<dyn AssetFinder>,
    daily: Arc<dyn BarReader>,
    minute: Option<Arc<dyn BarReader>>,
    adjustments: Arc<dyn AdjustmentReader>,
    first_trading_day: Option<NaiveDate>,
}

impl DataPortal {
    pub fn from_bundle(bundle: &BundleData) -> Self {
        DataPortal {
            asset_finder: Arc::clone(&bundle.asset_finder),
            daily: Arc::clone(&bundle.equity_daily_bar_reader),
            minute: bundle.equity_minute_bar_reader.clone(),
            adjustments: Arc::clone(&bundle.adjustment_reader),
            first_trading_day: bundle.first_trading_day(),
        }
    }

    pub fn first_trading_day(&self) -> Option<NaiveDate> {
        self.first_trading_day
    }

    pub fn has_minute_data(&self) -> bool {
        self.minute.is_some()
    }

    pub fn lookup_symbol(&self, symbol: &str) -> Option<Asset> {
        self.asset_finder.lookup_symbol(symbol)
    }

    pub fn assets(&self) -> Vec<Asset> {
        self.asset_finder.assets()
    }

    /// Unadjusted daily value of `field` for `symbol` on `session`.
    pub fn current(&self, symbol: &str, field: PriceField, session: NaiveDate) -> Option<f64> {
        self.daily.get_value(symbol, session, field)
    }

    /// Daily values over `sessions`, adjusted as of the last session.
    pub fn history(&self, symbol: &str, field: PriceField, sessions: &[NaiveDate]) -> Vec<Option<f64>> {
        let adjustments = self.adjustments.adjustments(symbol);
        let as_of = sessions.last().copied();
        sessions
            .iter()
            .map(|&session| {
                let raw = self.daily.get_value(symbol, session, field)?;
                Some(match as_of {
                    Some(as_of) => adjust(raw, field, session, as_of, &adjustments),
                    None => raw,
                })
            })
            .collect()
    }

    pub fn daily_reader(&self) -> Arc<dyn BarReader> {
        Arc::clone(&self.daily)
    }

    pub fn adjustment_reader(&self) -> Arc<dyn AdjustmentReader> {
        Arc::clone(&self.adjustments)
    }
}

impl std::fmt::Debug for DataPortal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataPortal")
            .field("has_minute_data", &self.has_minute_data())
            .field("first_trading_day", &self.first_trading_day)
            .finish()
    }
}

/// Apply every adjustment effective after `session` and no later than `as_of`.
pub fn adjust(
    raw: f64,
    field: PriceField,
    session: NaiveDate,
    as_of: NaiveDate,
    adjustments: &[crate::ports::bundle_port::Adjustment],
) -> f64 {
    adjustments
        .iter()
        .filter(|a| a.effective > session && a.effective <= as_of && a.ratio != 0.0)
        .fold(raw, |value, a| match field {
            PriceField::Volume => value / a.ratio,
            _ => value * a.ratio,
        })
}
