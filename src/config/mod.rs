//! Database configuration.
//!
//! This module provides the [`DbConfig`] record, its two canned profiles,
//! and the canonical connection target derived from it.
//!
//! # Profiles
//!
//! - [`DbConfig::development`]: small cache, long idle tolerance
//! - [`DbConfig::production`]: larger cache, shorter idle tolerance, longer busy timeout
//!
//! Profiles are presets only; both flow through the same open path.

use crate::error::{Error, Result};

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default database location for the development profile (relative to CWD).
pub const DEFAULT_DB_PATH: &str = "data/promptlog.db";

/// Default migrations directory (relative to CWD).
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Synchronization strengths accepted for `PRAGMA synchronous`.
pub const SYNCHRONOUS_MODES: &[&str] = &["OFF", "NORMAL", "FULL", "EXTRA"];

/// Memory-mapped I/O size applied during runtime tuning (256 MiB).
pub const MMAP_SIZE_BYTES: i64 = 268_435_456;

/// Configuration for opening a [`Database`](crate::storage::Database).
///
/// Zero durations mean "no limit" for lifetime/idle time and "unset" for the
/// busy timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbConfig {
    /// Path to the SQLite file.
    pub database_path: PathBuf,
    /// Directory holding `NNN_name.up.sql` scripts.
    pub migrations_dir: PathBuf,
    /// Pool size. SQLite works best with a single writer.
    pub max_open_conns: u32,
    /// Connections kept open while idle (clamped to `max_open_conns`).
    pub max_idle_conns: u32,
    /// Maximum lifetime of a pooled connection.
    pub conn_max_lifetime: Duration,
    /// Idle connections beyond `max_idle_conns` are closed after this long.
    pub conn_max_idle_time: Duration,
    /// How long a writer waits for a contended lock.
    pub busy_timeout: Duration,
    /// Enable write-ahead logging.
    pub wal_mode: bool,
    /// `PRAGMA synchronous` value; empty leaves the engine default.
    pub synchronous: String,
    /// Page cache size in KiB (applied as a negative `cache_size`).
    pub cache_size: i64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::development()
    }
}

impl DbConfig {
    /// Development profile: 10 MB cache, 30 minute idle tolerance.
    #[must_use]
    pub fn development() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            max_open_conns: 1,
            max_idle_conns: 1,
            conn_max_lifetime: Duration::ZERO,
            conn_max_idle_time: Duration::from_secs(30 * 60),
            busy_timeout: Duration::from_secs(30),
            wal_mode: true,
            synchronous: "NORMAL".to_string(),
            cache_size: 10_000,
        }
    }

    /// Production profile: 20 MB cache, 10 minute idle tolerance, 60 s busy timeout.
    #[must_use]
    pub fn production(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            conn_max_idle_time: Duration::from_secs(10 * 60),
            busy_timeout: Duration::from_secs(60),
            cache_size: 20_000,
            ..Self::development()
        }
    }

    /// Same profile, different file.
    #[must_use]
    pub fn with_path(mut self, database_path: impl Into<PathBuf>) -> Self {
        self.database_path = database_path.into();
        self
    }

    /// Check the record before anything touches disk.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a zero pool size or an unknown
    /// synchronization mode.
    pub fn validate(&self) -> Result<()> {
        if self.max_open_conns == 0 {
            return Err(Error::Config("max_open_conns must be at least 1".to_string()));
        }
        if !self.synchronous.is_empty()
            && !SYNCHRONOUS_MODES.contains(&self.synchronous.to_uppercase().as_str())
        {
            return Err(Error::Config(format!(
                "synchronous must be one of {}, got '{}'",
                SYNCHRONOUS_MODES.join(", "),
                self.synchronous
            )));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("database_path is empty".to_string()));
        }
        Ok(())
    }

    /// Idle connections to keep, never more than the pool size.
    #[must_use]
    pub fn effective_max_idle(&self) -> u32 {
        self.max_idle_conns.min(self.max_open_conns)
    }

    /// Build the canonical connection target for this configuration.
    #[must_use]
    pub fn connection_target(&self) -> ConnectionTarget {
        let mut params = vec![TargetParam::ForeignKeys];

        if !self.busy_timeout.is_zero() {
            params.push(TargetParam::BusyTimeout(self.busy_timeout));
        }
        if self.wal_mode {
            params.push(TargetParam::JournalMode("WAL"));
        }
        if !self.synchronous.is_empty() {
            params.push(TargetParam::Synchronous(self.synchronous.to_uppercase()));
        }

        ConnectionTarget {
            path: self.database_path.clone(),
            params,
        }
    }
}

/// One per-connection parameter of a [`ConnectionTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetParam {
    /// Referential-integrity enforcement; always present.
    ForeignKeys,
    BusyTimeout(Duration),
    JournalMode(&'static str),
    Synchronous(String),
}

impl TargetParam {
    /// Query-string key.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::ForeignKeys => "foreign_keys",
            Self::BusyTimeout(_) => "_busy_timeout",
            Self::JournalMode(_) => "_journal_mode",
            Self::Synchronous(_) => "_sync",
        }
    }

    /// Query-string value.
    #[must_use]
    pub fn value(&self) -> String {
        match self {
            Self::ForeignKeys => "1".to_string(),
            Self::BusyTimeout(d) => d.as_millis().to_string(),
            Self::JournalMode(mode) => (*mode).to_string(),
            Self::Synchronous(mode) => mode.clone(),
        }
    }
}

/// A database file plus the ordered parameters every connection applies.
///
/// The `Display` form is stable:
/// `path?foreign_keys=1&_busy_timeout=30000&_journal_mode=WAL&_sync=NORMAL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub path: PathBuf,
    pub params: Vec<TargetParam>,
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}?", self.path.display())?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", param.key(), param.value())?;
        }
        Ok(())
    }
}

/// Get the per-user data directory for production databases.
#[must_use]
pub fn default_data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "promptlog").map(|d| d.data_dir().to_path_buf())
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided (CLI flag or `PROMPTLOG_DB`), use it
/// 2. Production: `<data dir>/promptlog.db`
/// 3. Development: [`DEFAULT_DB_PATH`]
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>, production: bool) -> PathBuf {
    if let Some(path) = explicit_path {
        return path.to_path_buf();
    }

    if production {
        if let Some(dir) = default_data_dir() {
            return dir.join("promptlog.db");
        }
    }

    PathBuf::from(DEFAULT_DB_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_for(path: &str, busy: Duration, wal: bool, sync: &str) -> String {
        let config = DbConfig {
            database_path: PathBuf::from(path),
            busy_timeout: busy,
            wal_mode: wal,
            synchronous: sync.to_string(),
            ..DbConfig::development()
        };
        config.connection_target().to_string()
    }

    #[test]
    fn test_connection_target_default() {
        assert_eq!(
            target_for("test.db", Duration::from_secs(30), true, "NORMAL"),
            "test.db?foreign_keys=1&_busy_timeout=30000&_journal_mode=WAL&_sync=NORMAL"
        );
    }

    #[test]
    fn test_connection_target_minimal() {
        assert_eq!(
            target_for("minimal.db", Duration::ZERO, false, ""),
            "minimal.db?foreign_keys=1"
        );
    }

    #[test]
    fn test_connection_target_production() {
        assert_eq!(
            target_for("prod.db", Duration::from_secs(60), true, "FULL"),
            "prod.db?foreign_keys=1&_busy_timeout=60000&_journal_mode=WAL&_sync=FULL"
        );
    }

    #[test]
    fn test_connection_target_without_wal_keeps_order() {
        assert_eq!(
            target_for("a.db", Duration::from_millis(1500), false, "normal"),
            "a.db?foreign_keys=1&_busy_timeout=1500&_sync=NORMAL"
        );
    }

    #[test]
    fn test_profiles() {
        let dev = DbConfig::development();
        assert_eq!(dev.max_open_conns, 1);
        assert_eq!(dev.max_idle_conns, 1);
        assert_eq!(dev.cache_size, 10_000);
        assert_eq!(dev.conn_max_idle_time, Duration::from_secs(1800));
        assert_eq!(dev.busy_timeout, Duration::from_secs(30));

        let prod = DbConfig::production("/srv/prod.db");
        assert_eq!(prod.database_path, PathBuf::from("/srv/prod.db"));
        assert_eq!(prod.cache_size, 20_000);
        assert_eq!(prod.conn_max_idle_time, Duration::from_secs(600));
        assert_eq!(prod.busy_timeout, Duration::from_secs(60));
        assert!(prod.wal_mode);
        assert_eq!(prod.synchronous, "NORMAL");
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let mut config = DbConfig::development();
        config.max_open_conns = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = DbConfig::development();
        config.synchronous = "SOMETIMES".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = DbConfig::development();
        config.synchronous = "full".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_effective_max_idle_is_clamped() {
        let config = DbConfig {
            max_open_conns: 2,
            max_idle_conns: 8,
            ..DbConfig::development()
        };
        assert_eq!(config.effective_max_idle(), 2);
    }

    #[test]
    fn test_resolve_db_path_prefers_explicit() {
        let explicit = Path::new("/tmp/explicit.db");
        assert_eq!(resolve_db_path(Some(explicit), true), explicit);
        assert_eq!(resolve_db_path(None, false), PathBuf::from(DEFAULT_DB_PATH));
    }
}
