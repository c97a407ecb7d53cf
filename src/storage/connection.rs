//! Connection pool construction and tuning.
//!
//! Uses `r2d2` pooling with the `r2d2_sqlite` manager. Startup runs every
//! step on a probe connection first so a failure names the exact step and is
//! never retried by the pool; after that, [`ConnectionTuner`] repeats the same
//! steps on each connection the pool opens.

use crate::config::{ConnectionTarget, DbConfig, TargetParam, MMAP_SIZE_BYTES};
use crate::error::{Error, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::time::Duration;
use tracing::{debug, error};

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool acquire timeout when no busy timeout is configured.
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// First SQLite release with `INSERT ... RETURNING`.
const RETURNING_MIN_VERSION: i32 = 3_035_000;

/// One post-connect tuning statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningStep {
    pub description: &'static str,
    pub statement: String,
}

/// The runtime tuning applied after the connection target parameters.
#[must_use]
pub fn tuning_steps(config: &DbConfig) -> Vec<TuningStep> {
    vec![
        TuningStep {
            description: "set cache size",
            statement: format!("PRAGMA cache_size = {}", -config.cache_size),
        },
        TuningStep {
            description: "store temporary tables in memory",
            statement: "PRAGMA temp_store = MEMORY".to_string(),
        },
        TuningStep {
            description: "enable memory-mapped I/O",
            statement: format!("PRAGMA mmap_size = {MMAP_SIZE_BYTES}"),
        },
        TuningStep {
            description: "optimize database",
            statement: "PRAGMA optimize".to_string(),
        },
    ]
}

/// Apply the connection target's parameters, in order.
///
/// # Errors
///
/// Returns the first failing statement's error.
pub fn apply_target_params(conn: &Connection, target: &ConnectionTarget) -> rusqlite::Result<()> {
    for param in &target.params {
        match param {
            TargetParam::ForeignKeys => conn.execute_batch("PRAGMA foreign_keys = ON;")?,
            TargetParam::BusyTimeout(timeout) => conn.busy_timeout(*timeout)?,
            TargetParam::JournalMode(mode) => {
                conn.execute_batch(&format!("PRAGMA journal_mode = {mode};"))?;
            }
            TargetParam::Synchronous(mode) => {
                conn.execute_batch(&format!("PRAGMA synchronous = {mode};"))?;
            }
        }
    }
    Ok(())
}

/// Run each tuning step, stopping at the first failure.
///
/// # Errors
///
/// Returns the failing step's description with its error.
pub fn apply_tuning(
    conn: &Connection,
    steps: &[TuningStep],
) -> std::result::Result<(), (&'static str, rusqlite::Error)> {
    for step in steps {
        conn.execute_batch(&step.statement)
            .map_err(|e| (step.description, e))?;
    }
    Ok(())
}

/// Round-trip liveness check.
///
/// # Errors
///
/// Returns the query error if the engine does not answer.
pub fn ping(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
    Ok(())
}

/// Whether the linked SQLite supports `INSERT ... RETURNING`.
#[must_use]
pub fn supports_returning() -> bool {
    rusqlite::version_number() >= RETURNING_MIN_VERSION
}

/// Per-connection setup run by the pool on every new connection.
#[derive(Debug)]
struct ConnectionTuner {
    target: ConnectionTarget,
    steps: Vec<TuningStep>,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionTuner {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        apply_target_params(conn, &self.target)?;
        apply_tuning(conn, &self.steps).map_err(|(step, e)| {
            error!(step, error = %e, "Runtime tuning failed on pooled connection");
            e
        })
    }
}

/// Build a tuned, verified pool for `config`.
///
/// Steps, each fatal and named in `Error::Connection`:
/// 1. validate the configuration
/// 2. create the database directory
/// 3. open a probe connection and apply the connection target
/// 4. ping
/// 5. apply runtime tuning
/// 6. build the pool with the configured limits
///
/// # Errors
///
/// Returns `Error::Config` for an invalid record, `Error::Connection` for
/// everything else.
pub fn open_pool(config: &DbConfig) -> Result<ConnectionPool> {
    config.validate()?;

    let target = config.connection_target();
    let steps = tuning_steps(config);

    if let Some(dir) = config
        .database_path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
    {
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::connection("create database directory", e))?;
    }

    let probe = Connection::open(&config.database_path)
        .map_err(|e| Error::connection("open database", e))?;
    apply_target_params(&probe, &target)
        .map_err(|e| Error::connection("apply connection parameters", e))?;
    ping(&probe).map_err(|e| Error::connection("ping database", e))?;
    apply_tuning(&probe, &steps).map_err(|(step, e)| Error::connection(step, e))?;
    drop(probe);

    debug!(%target, "Probe connection verified");

    let acquire_timeout = if config.busy_timeout.is_zero() {
        DEFAULT_ACQUIRE_TIMEOUT
    } else {
        config.busy_timeout
    };

    let manager = SqliteConnectionManager::file(&config.database_path);
    Pool::builder()
        .max_size(config.max_open_conns)
        .min_idle(Some(config.effective_max_idle()))
        .max_lifetime(non_zero(config.conn_max_lifetime))
        .idle_timeout(non_zero(config.conn_max_idle_time))
        .connection_timeout(acquire_timeout)
        .connection_customizer(Box::new(ConnectionTuner { target, steps }))
        .build(manager)
        .map_err(|e| Error::connection("build connection pool", e))
}

/// Zero means "no limit" in configuration; r2d2 spells that `None`.
fn non_zero(d: Duration) -> Option<Duration> {
    (!d.is_zero()).then_some(d)
}
