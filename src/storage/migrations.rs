//! Versioned schema migrations read from a directory.
//!
//! Scripts are named `NNN_description.up.sql`; the first three characters
//! are the version token. Matching `.down.sql` files sit alongside for
//! operators and are never run here. The `schema_migrations` table records
//! which versions have been applied.

use crate::error::{Error, MigrationFailure, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Suffix of scripts applied by the runner.
pub const UP_SUFFIX: &str = ".up.sql";

/// Characters of the file name that form the version token.
const VERSION_LEN: usize = 3;

const BOOKKEEPING_TABLE: &str = "schema_migrations";

/// One discovered up-script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    pub version: String,
    pub file_name: String,
    pub path: PathBuf,
}

/// Outcome of one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Versions applied by this run, in order.
    pub applied: Vec<String>,
    /// Versions that were already recorded.
    pub skipped: Vec<String>,
}

/// Applied state of one discovered script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: String,
    pub file_name: String,
    /// Unix milliseconds, `None` while pending.
    pub applied_at: Option<i64>,
}

impl MigrationStatus {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Version token of a script file name.
#[must_use]
pub fn version_of(file_name: &str) -> String {
    file_name.chars().take(VERSION_LEN).collect()
}

/// List up-scripts in `dir`, sorted by file name.
///
/// # Errors
///
/// Returns `MigrationFailure::ScanDirectory` if the directory cannot be read
/// and `MigrationFailure::DuplicateVersion` if two scripts share a version.
pub fn discover(dir: &Path) -> Result<Vec<MigrationScript>> {
    let scan_error = |e: std::io::Error| {
        Error::migration(dir.display().to_string(), MigrationFailure::ScanDirectory, e)
    };

    let mut scripts = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(scan_error)? {
        let entry = entry.map_err(scan_error)?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.ends_with(UP_SUFFIX) || !entry.file_type().map_err(scan_error)?.is_file() {
            continue;
        }
        scripts.push(MigrationScript {
            version: version_of(&file_name),
            file_name,
            path: entry.path(),
        });
    }
    scripts.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    // Same-version scripts sort next to each other.
    if let Some(pair) = scripts.windows(2).find(|w| w[0].version == w[1].version) {
        return Err(Error::migration(
            pair[1].file_name.clone(),
            MigrationFailure::DuplicateVersion,
            format!("version {} is already used by {}", pair[1].version, pair[0].file_name),
        ));
    }

    Ok(scripts)
}

/// Apply every pending script in `dir`.
///
/// Each script and its bookkeeping row share one transaction. A failure
/// rolls that script back and stops the run; earlier scripts stay applied.
/// Safe to call on every startup.
///
/// # Errors
///
/// Returns `Error::Migration` naming the script and the failed stage.
pub fn run_migrations(conn: &mut Connection, dir: &Path) -> Result<MigrationReport> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| Error::migration(BOOKKEEPING_TABLE, MigrationFailure::CreateBookkeeping, e))?;

    let scripts = discover(dir)?;
    let mut report = MigrationReport::default();

    for script in &scripts {
        let fail = |failure: MigrationFailure| {
            let name = script.file_name.clone();
            move |e: rusqlite::Error| Error::migration(name, failure, e)
        };

        if applied_at(conn, &script.version).map_err(fail(MigrationFailure::CheckStatus))?.is_some() {
            debug!(version = %script.version, "Migration already applied");
            report.skipped.push(script.version.clone());
            continue;
        }

        let sql = std::fs::read_to_string(&script.path).map_err(|e| {
            Error::migration(script.file_name.clone(), MigrationFailure::ReadScript, e)
        })?;

        info!(version = %script.version, file = %script.file_name, "Applying migration");

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(fail(MigrationFailure::Execute))?;
        tx.execute_batch(&sql).map_err(fail(MigrationFailure::Execute))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![script.version, chrono::Utc::now().timestamp_millis()],
        )
        .map_err(fail(MigrationFailure::Record))?;
        tx.commit().map_err(fail(MigrationFailure::Commit))?;

        info!(version = %script.version, "Migration complete");
        report.applied.push(script.version.clone());
    }

    Ok(report)
}

/// Applied/pending state of each script in `dir`, without writing.
///
/// # Errors
///
/// Returns `Error::Migration` if discovery or a status lookup fails.
pub fn migration_status(conn: &Connection, dir: &Path) -> Result<Vec<MigrationStatus>> {
    let scripts = discover(dir)?;

    let has_table: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [BOOKKEEPING_TABLE],
            |row| row.get(0),
        )
        .map_err(|e| Error::migration(BOOKKEEPING_TABLE, MigrationFailure::CheckStatus, e))?;

    scripts
        .into_iter()
        .map(|script| {
            let applied_at = if has_table {
                applied_at(conn, &script.version).map_err(|e| {
                    Error::migration(script.file_name.clone(), MigrationFailure::CheckStatus, e)
                })?
            } else {
                None
            };
            Ok(MigrationStatus {
                version: script.version,
                file_name: script.file_name,
                applied_at,
            })
        })
        .collect()
}

fn applied_at(conn: &Connection, version: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT applied_at FROM schema_migrations WHERE version = ?1",
        [version],
        |row| row.get(0),
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::migrations_dir;
    use std::fs;

    fn write(dir: &Path, name: &str, sql: &str) {
        fs::write(dir.join(name), sql).unwrap();
    }

    fn recorded(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT version FROM schema_migrations ORDER BY version")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap()
    }

    #[test]
    fn test_discover_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "002_b.up.sql", "");
        write(dir.path(), "001_a.up.sql", "");
        write(dir.path(), "001_a.down.sql", "");
        write(dir.path(), "notes.txt", "");

        let scripts = discover(dir.path()).unwrap();
        let names: Vec<&str> = scripts.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(names, ["001_a.up.sql", "002_b.up.sql"]);
        assert_eq!(scripts[1].version, "002");
    }

    #[test]
    fn test_duplicate_versions_rejected_before_apply() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "001_a.up.sql", "CREATE TABLE a (id INTEGER);");
        write(dir.path(), "001_b.up.sql", "CREATE TABLE b (id INTEGER);");

        let mut conn = Connection::open_in_memory().unwrap();
        let err = run_migrations(&mut conn, dir.path()).unwrap_err();
        assert!(matches!(
            err,
            Error::Migration { failure: MigrationFailure::DuplicateVersion, ref script, .. }
                if script == "001_b.up.sql"
        ));
        assert!(recorded(&conn).is_empty());
    }

    #[test]
    fn test_missing_directory_is_scan_failure() {
        let mut conn = Connection::open_in_memory().unwrap();
        let err = run_migrations(&mut conn, Path::new("/nonexistent/promptlog/migrations"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Migration { failure: MigrationFailure::ScanDirectory, .. }
        ));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_run_migrations_fresh_db() {
        let mut conn = Connection::open_in_memory().unwrap();
        let report = run_migrations(&mut conn, &migrations_dir()).unwrap();
        assert_eq!(report.applied, ["001", "002"]);
        assert!(report.skipped.is_empty());

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('conversations', 'messages', 'ratings', 'tags', 'conversation_tags')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn test_run_migrations_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn, &migrations_dir()).unwrap();
        let second = run_migrations(&mut conn, &migrations_dir()).unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.skipped, ["001", "002"]);
        assert_eq!(recorded(&conn), ["001", "002"]);
    }

    #[test]
    fn test_failing_script_rolls_back_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "001_ok.up.sql", "CREATE TABLE ok (id INTEGER);");
        write(
            dir.path(),
            "002_bad.up.sql",
            "CREATE TABLE partial (id INTEGER); INSERT INTO missing VALUES (1);",
        );
        write(dir.path(), "003_never.up.sql", "CREATE TABLE never (id INTEGER);");

        let mut conn = Connection::open_in_memory().unwrap();
        let err = run_migrations(&mut conn, dir.path()).unwrap_err();
        assert!(matches!(
            err,
            Error::Migration { failure: MigrationFailure::Execute, ref script, .. }
                if script == "002_bad.up.sql"
        ));

        assert_eq!(recorded(&conn), ["001"]);
        let partial: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name IN ('partial', 'never'))",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(!partial);

        // Fixing the script lets the next run pick up where it stopped.
        write(dir.path(), "002_bad.up.sql", "CREATE TABLE partial (id INTEGER);");
        let report = run_migrations(&mut conn, dir.path()).unwrap();
        assert_eq!(report.applied, ["002", "003"]);
        assert_eq!(report.skipped, ["001"]);
    }

    #[test]
    fn test_status_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "001_a.up.sql", "CREATE TABLE a (id INTEGER);");
        write(dir.path(), "002_b.up.sql", "CREATE TABLE b (id INTEGER);");

        let mut conn = Connection::open_in_memory().unwrap();
        let before = migration_status(&conn, dir.path()).unwrap();
        assert!(before.iter().all(|s| !s.is_applied()));
        let created: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name = 'schema_migrations')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(!created);

        run_migrations(&mut conn, dir.path()).unwrap();
        write(dir.path(), "003_c.up.sql", "CREATE TABLE c (id INTEGER);");

        let after = migration_status(&conn, dir.path()).unwrap();
        let applied: Vec<bool> = after.iter().map(MigrationStatus::is_applied).collect();
        assert_eq!(applied, [true, true, false]);
    }
}
