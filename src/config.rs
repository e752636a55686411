//! Runtime configuration.
//!
//! Everything lives under a single base directory, `~/.templar` by default.
//! Each location can be overridden individually through the environment,
//! which the integration tests lean on to keep state inside a tempdir.

use std::env;
use std::path::PathBuf;

/// Filesystem layout for the catalog database and template environments
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for all persistent state
    pub base_dir: PathBuf,
    /// Directory holding one environment per registered template
    pub envs_dir: PathBuf,
    /// Path of the SQLite catalog database
    pub db_path: PathBuf,
}

impl Config {
    /// Resolve the configuration from the process environment.
    ///
    /// `TEMPLAR_BASE_DIR` moves the whole tree; `TEMPLAR_ENVS_DIR` and
    /// `TEMPLAR_DB_PATH` override individual locations on top of that.
    pub fn from_env() -> Self {
        let base_dir = env::var_os("TEMPLAR_BASE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_base_dir);
        Self::with_base_dir(base_dir)
    }

    /// Resolve with an explicit base directory, still honoring the
    /// per-location overrides.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        let envs_dir = env::var_os("TEMPLAR_ENVS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dir.join("envs"));
        let db_path = env::var_os("TEMPLAR_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dir.join("catalog.db"));
        Self {
            base_dir,
            envs_dir,
            db_path,
        }
    }

    fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".templar")
    }
}
