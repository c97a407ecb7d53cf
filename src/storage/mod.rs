//! SQLite storage layer for promptlog.
//!
//! This module provides the persistence layer using SQLite with:
//! - An `r2d2` pool whose connections are tuned on checkout
//! - WAL mode so readers run alongside the single writer
//! - `BEGIN IMMEDIATE` transactions for every write
//! - Directory-driven, versioned migrations
//!
//! # Submodules
//!
//! - [`connection`] - Pool construction, connection target, runtime tuning
//! - [`migrations`] - Migration discovery and runner
//! - [`sqlite`] - The [`Database`] handle, conversations, and messages
//! - [`ratings`] - Rating operations and aggregate statistics
//! - [`diagnostics`] - Health check and database statistics

pub mod connection;
pub mod diagnostics;
pub mod migrations;
pub mod ratings;
pub mod sqlite;

pub use diagnostics::{DatabaseStats, EngineSettings, PoolStats};
pub use migrations::{MigrationReport, MigrationStatus};
pub use sqlite::Database;

#[cfg(test)]
pub(crate) mod test_support {
    use super::Database;
    use crate::config::DbConfig;
    use std::path::{Path, PathBuf};

    /// The crate's own `migrations/` directory.
    pub fn migrations_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    }

    /// Development profile pointed at `dir/test.db`.
    pub fn test_config(dir: &Path) -> DbConfig {
        DbConfig::development().with_path(dir.join("test.db"))
    }

    /// A migrated database in a fresh temp directory. Keep the `TempDir`
    /// alive for as long as the database is used.
    pub fn open_test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&test_config(dir.path())).unwrap();
        db.apply_migrations(&migrations_dir()).unwrap();
        (dir, db)
    }
}
