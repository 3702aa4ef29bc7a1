//! Resolve component names and validate the date range.
//!
//! Everything here runs before any bundle or benchmark data is opened.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::domain::blotter::Blotter;
use crate::domain::calendar::get_calendar;
use crate::domain::error::RunError;
use crate::domain::metrics::MetricsSet;
use crate::domain::registry::{ComponentRegistry, ComponentSpec};
use crate::ports::calendar_port::TradingCalendar;

pub const DEFAULT_CALENDAR: &str = "XNYS";

pub struct ResolvedComponents {
    pub metrics_set: MetricsSet,
    pub blotter: Box<dyn Blotter>,
    pub calendar: Arc<dyn TradingCalendar>,
}

impl std::fmt::Debug for ResolvedComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedComponents")
            .field("metrics_set", &self.metrics_set)
            .field("calendar", &self.calendar.name())
            .finish()
    }
}

/// Fail with `EmptyDateRange` unless `[start, end]` holds at least one session.
pub fn check_date_range(
    calendar: &dyn TradingCalendar,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(), RunError> {
    if calendar.session_distance(start, end) < 1 {
        return Err(RunError::EmptyDateRange { start, end });
    }
    Ok(())
}

pub fn resolve_configuration(
    registry: &ComponentRegistry,
    metrics_set: ComponentSpec<MetricsSet>,
    blotter: ComponentSpec<Box<dyn Blotter>>,
    calendar: Option<Arc<dyn TradingCalendar>>,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<ResolvedComponents, RunError> {
    let calendar = match calendar {
        Some(calendar) => calendar,
        None => get_calendar(DEFAULT_CALENDAR)?,
    };
    check_date_range(calendar.as_ref(), start, end)?;

    let metrics_name = metrics_set.name().map(str::to_string);
    let metrics_set = metrics_set.resolve(&registry.metrics_sets)?;
    let blotter = blotter.resolve(&registry.blotters)?;
    debug!(
        calendar = calendar.name(),
        metrics_set = metrics_name.as_deref().unwrap_or("<instance>"),
        "resolved run components"
    );
    Ok(ResolvedComponents {
        metrics_set,
        blotter,
        calendar,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::blotter::{CancelPolicy, SimulationBlotter};
    use crate::domain::registry::ComponentKind;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn resolve(
        metrics: &str,
        blotter: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ResolvedComponents, RunError> {
        resolve_configuration(
            &ComponentRegistry::with_builtins(),
            metrics.into(),
            blotter.into(),
            None,
            start,
            end,
        )
    }

    #[test]
    fn defaults_to_xnys() {
        let resolved = resolve("default", "default", day(2024, 1, 2), day(2024, 1, 5)).unwrap();
        assert_eq!(resolved.calendar.name(), "XNYS");
        assert!(!resolved.metrics_set.is_empty());
    }

    #[test]
    fn single_session_range_is_valid() {
        assert!(resolve("none", "default", day(2024, 1, 2), day(2024, 1, 2)).is_ok());
    }

    #[test]
    fn weekend_only_range_is_empty() {
        let err = resolve("none", "default", day(2024, 1, 6), day(2024, 1, 7)).unwrap_err();
        assert!(matches!(
            err,
            RunError::EmptyDateRange { start, end }
                if start == day(2024, 1, 6) && end == day(2024, 1, 7)
        ));
    }

    #[test]
    fn reversed_range_is_empty() {
        let err = resolve("none", "default", day(2024, 1, 5), day(2024, 1, 2)).unwrap_err();
        assert!(matches!(err, RunError::EmptyDateRange { .. }));
    }

    #[test]
    fn date_range_checked_before_components() {
        let err = resolve("missing", "missing", day(2024, 1, 6), day(2024, 1, 6)).unwrap_err();
        assert!(matches!(err, RunError::EmptyDateRange { .. }));
    }

    #[test]
    fn unknown_metrics_set() {
        let err = resolve("fancy", "default", day(2024, 1, 2), day(2024, 1, 5)).unwrap_err();
        assert!(matches!(
            err,
            RunError::UnknownComponent { kind: ComponentKind::MetricsSet, ref name } if name == "fancy"
        ));
    }

    #[test]
    fn unknown_blotter() {
        let err = resolve("default", "fancy", day(2024, 1, 2), day(2024, 1, 5)).unwrap_err();
        assert!(matches!(
            err,
            RunError::UnknownComponent { kind: ComponentKind::Blotter, .. }
        ));
    }

    #[test]
    fn instances_pass_through() {
        let resolved = resolve_configuration(
            &ComponentRegistry::empty(),
            ComponentSpec::Instance(MetricsSet::empty()),
            ComponentSpec::Instance(
                Box::new(SimulationBlotter::new(CancelPolicy::EndOfDay)) as Box<dyn Blotter>,
            ),
            None,
            day(2024, 1, 2),
            day(2024, 1, 3),
        )
        .unwrap();
        assert!(resolved.metrics_set.is_empty());
    }

    #[test]
    fn unknown_calendar_name() {
        assert!(get_calendar("XLON").is_err());
    }
}
