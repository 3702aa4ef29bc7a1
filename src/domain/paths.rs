//! Filesystem locations derived from the environment mapping.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::domain::error::RunError;

/// Environment variables visible to a run.
pub type Environ = HashMap<String, String>;

pub const ROOT_VAR: &str = "ALGORUN_ROOT";
pub const DEFAULT_EXTENSION: &str = "extension.algo";

/// Snapshot of the process environment.
pub fn process_environ() -> Environ {
    std::env::vars().collect()
}

/// `$ALGORUN_ROOT`, else `$HOME/.algorun`, else `./.algorun`.
pub fn root(environ: &Environ) -> PathBuf {
    if let Some(root) = environ.get(ROOT_VAR).filter(|v| !v.is_empty()) {
        return PathBuf::from(root);
    }
    let home = environ
        .get("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".algorun")
}

pub fn default_extension(environ: &Environ) -> PathBuf {
    root(environ).join(DEFAULT_EXTENSION)
}

pub fn data_root(environ: &Environ) -> PathBuf {
    root(environ).join("data")
}

/// Create `path` and its parents if missing, leaving existing content alone.
pub fn ensure_file(path: &Path) -> Result<(), RunError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok(())
}
