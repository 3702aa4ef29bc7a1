//! Run parameters and the resolved run configuration.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::blotter::Blotter;
use crate::domain::data_portal::{BenchmarkReturns, DataPortal};
use crate::domain::metrics::MetricsSet;
use crate::ports::calendar_port::TradingCalendar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFrequency {
    #[default]
    Daily,
    Minute,
}

impl fmt::Display for DataFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFrequency::Daily => write!(f, "daily"),
            DataFrequency::Minute => write!(f, "minute"),
        }
    }
}

impl FromStr for DataFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(DataFrequency::Daily),
            "minute" => Ok(DataFrequency::Minute),
            other => Err(format!(
                "unknown data frequency {other:?}, expected \"daily\" or \"minute\""
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParameters {
    pub start_session: NaiveDate,
    pub end_session: NaiveDate,
    pub capital_base: f64,
    pub data_frequency: DataFrequency,
    pub sessions: Vec<NaiveDate>,
}

impl SimulationParameters {
    pub fn new(
        start_session: NaiveDate,
        end_session: NaiveDate,
        calendar: &dyn TradingCalendar,
        capital_base: f64,
        data_frequency: DataFrequency,
    ) -> Self {
        SimulationParameters {
            start_session,
            end_session,
            capital_base,
            data_frequency,
            sessions: calendar.sessions_in_range(start_session, end_session),
        }
    }
}

/// Everything a simulation needs besides the strategy and loader dispatch.
/// Built once per run and consumed when the simulation is constructed.
pub struct RunConfiguration {
    pub params: SimulationParameters,
    pub calendar: Arc<dyn TradingCalendar>,
    pub metrics_set: MetricsSet,
    pub blotter: Box<dyn Blotter>,
    pub data_portal: DataPortal,
    pub benchmark_returns: BenchmarkReturns,
}

impl fmt::Debug for RunConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfiguration")
            .field("params", &self.params)
            .field("calendar", &self.calendar.name())
            .field("metrics_set", &self.metrics_set)
            .field("data_portal", &self.data_portal)
            .field("benchmark_sessions", &self.benchmark_returns.len())
            .finish()
    }
}
