//! Tabular performance record produced by a run.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPerformance {
    pub session: NaiveDate,
    #[serde(flatten)]
    pub columns: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub rows: Vec<DailyPerformance>,
    pub summary: BTreeMap<String, f64>,
}

impl Performance {
    pub fn session_count(&self) -> usize {
        self.rows.len()
    }

    pub fn sessions(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.session).collect()
    }

    /// One column across all sessions. Sessions without it yield `None`.
    pub fn column(&self, name: &str) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.columns.get(name).copied()).collect()
    }

    fn column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .rows
            .iter()
            .flat_map(|r| r.columns.keys().map(String::as_str))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl fmt::Display for Performance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.column_names();
        write!(f, "{:<12}", "session")?;
        for name in &names {
            write!(f, " {name:>18}")?;
        }
        writeln!(f)?;
        for row in &self.rows {
            write!(f, "{:<12}", row.session.to_string())?;
            for name in &names {
                match row.columns.get(*name) {
                    Some(v) => write!(f, " {v:>18.6}")?,
                    None => write!(f, " {:>18}", "NaN")?,
                }
            }
            writeln!(f)?;
        }
        writeln!(f, "[{} rows x {} columns]", self.rows.len(), names.len())?;
        for (key, value) in &self.summary {
            writeln!(f, "{key}: {value:.6}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Performance {
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        Performance {
            rows: vec![
                DailyPerformance {
                    session: day(2),
                    columns: BTreeMap::from([("returns".to_string(), 0.0)]),
                },
                DailyPerformance {
                    session: day(3),
                    columns: BTreeMap::from([
                        ("returns".to_string(), 0.01),
                        ("ending_cash".to_string(), 5.0),
                    ]),
                },
            ],
            summary: BTreeMap::from([("trading_days".to_string(), 2.0)]),
        }
    }

    #[test]
    fn session_count_counts_rows() {
        assert_eq!(sample().session_count(), 2);
        assert_eq!(Performance::default().session_count(), 0);
    }

    #[test]
    fn missing_column_values_are_none() {
        assert_eq!(sample().column("ending_cash"), vec![None, Some(5.0)]);
    }

    #[test]
    fn display_renders_table_and_summary() {
        let text = sample().to_string();
        assert!(text.starts_with("session"));
        assert!(text.contains("2024-01-03"));
        assert!(text.contains("NaN"));
        assert!(text.contains("[2 rows x 2 columns]"));
        assert!(text.contains("trading_days: 2.000000"));
    }

    #[test]
    fn json_flattens_columns() {
        let json = serde_json::to_value(&sample()).unwrap();
        assert_eq!(json["rows"][1]["ending_cash"], 5.0);
        assert_eq!(json["rows"][1]["session"], "2024-01-03");
    }
}
