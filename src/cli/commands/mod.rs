//! Command implementations.

pub mod conversation;
pub mod health;
pub mod migrate;
pub mod rating;
pub mod stats;
pub mod version;

use crate::config::DbConfig;
use crate::error::Result;
use crate::storage::Database;
use serde::Serialize;
use tracing::info;

/// What every database command needs from the global flags.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: DbConfig,
    pub json: bool,
}

impl CommandContext {
    /// Open without touching the schema.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` or `Error::Connection` from [`Database::open`].
    pub fn open(&self) -> Result<Database> {
        Database::open(&self.config)
    }

    /// Open and bring the schema up to date, as a service would at startup.
    ///
    /// # Errors
    ///
    /// Returns the open error or the first migration failure.
    pub fn open_migrated(&self) -> Result<Database> {
        let db = self.open()?;
        let report = db.apply_migrations(&self.config.migrations_dir)?;
        if !report.applied.is_empty() {
            info!(applied = ?report.applied, "Schema migrated");
        }
        Ok(db)
    }
}

/// Print `value` as one line of JSON.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string(value)?;
    println!("{payload}");
    Ok(())
}

/// Format Unix milliseconds for humans.
pub(crate) fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis).map_or_else(
        || millis.to_string(),
        |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// Shorten `text` to `max` characters, marking the cut.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let cut: String = single_line.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14 22:13:20 UTC");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 100), "line one line two");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
    }
}
