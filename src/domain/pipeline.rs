//! Pipeline loader dispatch.
//!
//! Pipeline computations ask for loaders one column at a time. Only the
//! `EquityPricing` columns have a loader; any other column is rejected with
//! `RunError::UnregisteredColumn`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::data_portal::adjust;
use crate::domain::error::RunError;
use crate::ports::bundle_port::{AdjustmentReader, BarReader, PriceField};

pub const EQUITY_PRICING: &str = "EquityPricing";

/// A `Dataset.column` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    pub dataset: String,
    pub name: String,
}

impl Column {
    pub fn new(dataset: impl Into<String>, name: impl Into<String>) -> Self {
        Column {
            dataset: dataset.into(),
            name: name.into(),
        }
    }

    pub fn equity_pricing(field: PriceField) -> Self {
        Column::new(EQUITY_PRICING, field.as_str())
    }

    /// The pricing field this column reads, when it is an `EquityPricing` column.
    pub fn price_field(&self) -> Option<PriceField> {
        if self.dataset != EQUITY_PRICING {
            return None;
        }
        self.name.parse().ok()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.name)
    }
}

impl FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((dataset, name)) if !dataset.is_empty() && !name.is_empty() => {
                Ok(Column::new(dataset, name))
            }
            _ => Err(format!("invalid column {s:?}, expected Dataset.column")),
        }
    }
}

/// The registered columns.
pub fn equity_pricing_columns() -> Vec<Column> {
    PriceField::ALL
        .into_iter()
        .map(Column::equity_pricing)
        .collect()
}

/// Rows are sessions, columns are symbols.
pub type ColumnData = Vec<Vec<Option<f64>>>;

pub trait PipelineLoader {
    fn load(
        &self,
        column: &Column,
        sessions: &[NaiveDate],
        symbols: &[String],
    ) -> Result<ColumnData, RunError>;
}

/// Daily pricing with adjustments applied as of the last requested session.
pub struct PricingLoader {
    daily: Arc<dyn BarReader>,
    adjustments: Arc<dyn AdjustmentReader>,
}

impl PricingLoader {
    pub fn new(daily: Arc<dyn BarReader>, adjustments: Arc<dyn AdjustmentReader>) -> Self {
        PricingLoader { daily, adjustments }
    }
}

impl PipelineLoader for PricingLoader {
    fn load(
        &self,
        column: &Column,
        sessions: &[NaiveDate],
        symbols: &[String],
    ) -> Result<ColumnData, RunError> {
        let field = column
            .price_field()
            .ok_or_else(|| RunError::UnregisteredColumn {
                column: column.to_string(),
            })?;
        let Some(&as_of) = sessions.last() else {
            return Ok(Vec::new());
        };
        let per_symbol: Vec<_> = symbols
            .iter()
            .map(|s| self.adjustments.adjustments(s))
            .collect();
        Ok(sessions
            .iter()
            .map(|&session| {
                symbols
                    .iter()
                    .zip(&per_symbol)
                    .map(|(symbol, adjustments)| {
                        self.daily
                            .get_value(symbol, session, field)
                            .map(|raw| adjust(raw, field, session, as_of, adjustments))
                    })
                    .collect()
            })
            .collect())
    }
}

/// Column → loader lookup handed to the simulation.
pub type LoaderDispatch = Box<dyn Fn(&Column) -> Result<Arc<dyn PipelineLoader>, RunError>>;

/// Dispatch every `EquityPricing` column to `loader` and reject the rest.
pub fn choose_loader(loader: Arc<dyn PipelineLoader>) -> LoaderDispatch {
    Box::new(move |column: &Column| {
        if column.price_field().is_some() {
            Ok(Arc::clone(&loader))
        } else {
            Err(RunError::UnregisteredColumn {
                column: column.to_string(),
            })
        }
    })
}
