//! Benchmark return source port trait.

use crate::domain::data_portal::BenchmarkReturns;
use crate::domain::error::RunError;
use crate::domain::paths::Environ;

pub trait BenchmarkPort {
    fn load(&self, environ: &Environ) -> Result<BenchmarkReturns, RunError>;
}
