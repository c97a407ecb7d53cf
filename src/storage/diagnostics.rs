//! Health checks and statistics.
//!
//! Read-only: nothing here writes to the database.

use crate::error::Result;
use crate::storage::connection::ping;
use crate::storage::sqlite::Database;
use rusqlite::Connection;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Snapshot of the connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub max_open_connections: u32,
    pub min_idle_connections: u32,
    pub open_connections: u32,
    pub idle: u32,
    pub in_use: u32,
    pub wait_count: u64,
    pub wait_duration_ms: u64,
    /// `None` means unlimited.
    pub max_lifetime_ms: Option<u64>,
    /// `None` means idle connections are never reaped.
    pub idle_timeout_ms: Option<u64>,
}

/// Engine settings as reported by the live engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSettings {
    pub version: String,
    pub journal_mode: String,
    /// 0=OFF, 1=NORMAL, 2=FULL, 3=EXTRA
    pub synchronous: i64,
    pub cache_size: i64,
    /// 0=DEFAULT, 1=FILE, 2=MEMORY
    pub temp_store: i64,
    pub mmap_size: i64,
    pub page_count: i64,
    pub page_size: i64,
    pub freelist_count: i64,
    pub foreign_keys: bool,
}

/// Row counts, file sizes, pool metrics, and engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    pub conversations: u64,
    pub messages: u64,
    pub ratings: u64,
    pub database_size_bytes: Option<u64>,
    /// `None` when no WAL file exists.
    pub wal_size_bytes: Option<u64>,
    pub connection_pool: PoolStats,
    pub sqlite: EngineSettings,
}

impl Database {
    /// Check out a connection and round-trip `SELECT 1`.
    ///
    /// # Errors
    ///
    /// Returns `Error::PoolTimeout` if no connection is available, or the
    /// ping failure tagged with `health`.
    pub fn health(&self) -> Result<()> {
        self.read("health", self.path().display(), |conn| Ok(ping(conn)?))
    }

    /// Gather [`DatabaseStats`].
    ///
    /// Pool metrics are sampled before the stats queries check out their own
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns an error if a count or PRAGMA query fails.
    pub fn stats(&self) -> Result<DatabaseStats> {
        let connection_pool = self.pool_stats();

        let (conversations, messages, ratings, sqlite) =
            self.read("stats", self.path().display(), |conn| {
                let counts = conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM conversations),
                            (SELECT COUNT(*) FROM messages),
                            (SELECT COUNT(*) FROM ratings)",
                    [],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    },
                )?;
                Ok((counts.0, counts.1, counts.2, engine_settings(conn)?))
            })?;

        Ok(DatabaseStats {
            conversations: to_u64(conversations),
            messages: to_u64(messages),
            ratings: to_u64(ratings),
            database_size_bytes: file_size(self.path()),
            wal_size_bytes: file_size(&wal_path(self.path())),
            connection_pool,
            sqlite,
        })
    }

    /// Current pool metrics.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        let pool = self.pool();
        let state = pool.state();
        let waits = self.waits();
        PoolStats {
            max_open_connections: pool.max_size(),
            min_idle_connections: pool.min_idle().unwrap_or(0),
            open_connections: state.connections,
            idle: state.idle_connections,
            in_use: state.connections.saturating_sub(state.idle_connections),
            wait_count: waits.count(),
            wait_duration_ms: duration_ms(waits.total()),
            max_lifetime_ms: pool.max_lifetime().map(duration_ms),
            idle_timeout_ms: pool.idle_timeout().map(duration_ms),
        }
    }
}

fn engine_settings(conn: &Connection) -> rusqlite::Result<EngineSettings> {
    let int = |name: &str| conn.pragma_query_value(None, name, |row| row.get::<_, i64>(0));

    Ok(EngineSettings {
        version: rusqlite::version().to_string(),
        journal_mode: conn.pragma_query_value(None, "journal_mode", |row| row.get(0))?,
        synchronous: int("synchronous")?,
        cache_size: int("cache_size")?,
        temp_store: int("temp_store")?,
        mmap_size: int("mmap_size")?,
        page_count: int("page_count")?,
        page_size: int("page_size")?,
        freelist_count: int("freelist_count")?,
        foreign_keys: int("foreign_keys")? != 0,
    })
}

fn wal_path(db_path: &Path) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push("-wal");
    PathBuf::from(name)
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

fn duration_ms(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageType;
    use crate::storage::test_support::open_test_db;

    #[test]
    fn test_health() {
        let (_dir, db) = open_test_db();
        db.health().unwrap();
    }

    #[test]
    fn test_stats_reports_tuned_engine() {
        let (_dir, db) = open_test_db();
        let conv = db.create_conversation("stats", None, None, None).unwrap();
        let msg = db
            .create_message(conv.id, MessageType::Prompt, "hello", None, None)
            .unwrap();
        db.create_message_rating(msg.id, 4, None).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!((stats.conversations, stats.messages, stats.ratings), (1, 1, 1));
        assert!(stats.database_size_bytes.unwrap_or(0) > 0);

        let engine = &stats.sqlite;
        assert_eq!(engine.journal_mode, "wal");
        assert_eq!(engine.synchronous, 1);
        assert_eq!(engine.cache_size, -10_000);
        assert_eq!(engine.temp_store, 2);
        assert!(engine.foreign_keys);
        assert!(engine.page_size > 0);
    }

    #[test]
    fn test_pool_stats_reflect_config() {
        let (_dir, db) = open_test_db();
        let pool = db.pool_stats();
        assert_eq!(pool.max_open_connections, 1);
        assert_eq!(pool.min_idle_connections, 1);
        assert_eq!(pool.max_lifetime_ms, None);
        assert_eq!(pool.idle_timeout_ms, Some(30 * 60 * 1000));
        assert_eq!(pool.in_use, 0);

        let json = serde_json::to_value(db.stats().unwrap()).unwrap();
        assert!(json["connection_pool"]["wait_count"].is_u64());
        assert!(json["sqlite"]["journal_mode"].is_string());
    }

    #[test]
    fn test_wal_path() {
        assert_eq!(
            wal_path(Path::new("/data/promptlog.db")),
            PathBuf::from("/data/promptlog.db-wal")
        );
    }
}
