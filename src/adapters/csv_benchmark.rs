//! Benchmark returns from `<data root>/benchmark.csv`.
//!
//! The file holds either `date,return` rows or `date,close` rows; closes are
//! converted to daily returns.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::debug;

use crate::domain::data_portal::BenchmarkReturns;
use crate::domain::error::RunError;
use crate::domain::paths::{self, Environ};
use crate::ports::benchmark_port::BenchmarkPort;

pub const BENCHMARK_FILE: &str = "benchmark.csv";

pub struct CsvBenchmarkSource {
    path: Option<PathBuf>,
}

impl CsvBenchmarkSource {
    pub fn new() -> Self {
        Self { path: None }
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn resolve_path(&self, environ: &Environ) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| paths::data_root(environ).join(BENCHMARK_FILE))
    }
}

impl Default for CsvBenchmarkSource {
    fn default() -> Self {
        Self::new()
    }
}

fn benchmark_error(path: &Path, detail: impl std::fmt::Display) -> RunError {
    RunError::Benchmark {
        reason: format!("{}: {}", path.display(), detail),
    }
}

impl BenchmarkPort for CsvBenchmarkSource {
    fn load(&self, environ: &Environ) -> Result<BenchmarkReturns, RunError> {
        let path = self.resolve_path(environ);
        let mut rdr = csv::Reader::from_path(&path).map_err(|e| benchmark_error(&path, e))?;
        let headers = rdr.headers().map_err(|e| benchmark_error(&path, e))?.clone();
        let is_returns = match headers.get(1).map(str::trim) {
            Some("return") | Some("returns") => true,
            Some("close") => false,
            other => {
                return Err(benchmark_error(
                    &path,
                    format!("expected a return or close column, found {other:?}"),
                ))
            }
        };

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| benchmark_error(&path, e))?;
            let date = record
                .get(0)
                .ok_or_else(|| benchmark_error(&path, "missing date column"))?;
            let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                .map_err(|e| benchmark_error(&path, format!("invalid date {date:?}: {e}")))?;
            let value: f64 = record
                .get(1)
                .ok_or_else(|| benchmark_error(&path, "missing value column"))?
                .trim()
                .parse()
                .map_err(|e| benchmark_error(&path, format!("invalid value: {e}")))?;
            rows.push((date, value));
        }
        rows.sort_by_key(|(date, _)| *date);
        debug!(path = %path.display(), rows = rows.len(), "loaded benchmark");

        Ok(if is_returns {
            BenchmarkReturns::new(rows.into_iter().collect::<BTreeMap<_, _>>())
        } else {
            BenchmarkReturns::from_closes(&rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn reads_returns_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BENCHMARK_FILE);
        std::fs::write(&path, "date,return\n2024-01-03,0.02\n2024-01-02,0.01\n").unwrap();
        let returns = CsvBenchmarkSource::with_path(path)
            .load(&Environ::new())
            .unwrap();
        assert_eq!(returns.get(day(2)), Some(0.01));
        assert_eq!(returns.get(day(3)), Some(0.02));
    }

    #[test]
    fn converts_closes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BENCHMARK_FILE);
        std::fs::write(&path, "date,close\n2024-01-02,100\n2024-01-03,105\n").unwrap();
        let returns = CsvBenchmarkSource::with_path(path)
            .load(&Environ::new())
            .unwrap();
        assert_eq!(returns.len(), 1);
        assert_relative_eq!(returns.get(day(3)).unwrap(), 0.05, epsilon = 1e-12);
    }

    #[test]
    fn default_path_under_data_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut environ = Environ::new();
        environ.insert(paths::ROOT_VAR.into(), dir.path().to_string_lossy().into_owned());
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data").join(BENCHMARK_FILE), "date,return\n2024-01-02,0.0\n")
            .unwrap();
        assert_eq!(CsvBenchmarkSource::new().load(&environ).unwrap().len(), 1);
    }

    #[test]
    fn missing_file_is_benchmark_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CsvBenchmarkSource::with_path(dir.path().join("none.csv"))
            .load(&Environ::new())
            .unwrap_err();
        assert!(matches!(err, RunError::Benchmark { .. }));
    }

    #[test]
    fn unknown_value_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BENCHMARK_FILE);
        std::fs::write(&path, "date,price\n2024-01-02,1\n").unwrap();
        assert!(CsvBenchmarkSource::with_path(path).load(&Environ::new()).is_err());
    }
}
