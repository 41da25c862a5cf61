use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// Database file name inside `state_dir`. An absolute path is used as is.
    pub db_file: PathBuf,
    /// Default tracing level when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("."),
            db_file: PathBuf::from("bugtrack.db"),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let state_dir = non_blank(lookup("BUGTRACK_STATE_DIR"))
            .map(PathBuf::from)
            .unwrap_or(defaults.state_dir);

        let db_file = non_blank(lookup("BUGTRACK_DB_FILE"))
            .map(PathBuf::from)
            .unwrap_or(defaults.db_file);

        let log_level = match non_blank(lookup("BUGTRACK_LOG_LEVEL")) {
            Some(level) => parse_log_level(&level)
                .with_context(|| format!("BUGTRACK_LOG_LEVEL '{}' is invalid", level))?,
            None => defaults.log_level,
        };

        Ok(Config {
            state_dir,
            db_file,
            log_level,
        })
    }

    /// Full path of the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join(&self.db_file)
    }
}

/// Treat missing, empty and whitespace-only values as unset.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Normalize a level name (`warn`, `DEBUG`, `off`, ...) to lowercase.
fn parse_log_level(value: &str) -> Result<String> {
    let level: LevelFilter = value
        .trim()
        .parse()
        .context("expected one of off, error, warn, info, debug, trace")?;
    Ok(level.to_string().to_ascii_lowercase())
}
