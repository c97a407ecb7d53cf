//! Migrate command implementation.

use super::{format_timestamp, print_json, CommandContext};
use crate::error::Result;
use colored::Colorize;

/// Apply pending migrations, or with `status` list them without applying.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or a migration fails.
pub fn execute(ctx: &CommandContext, status: bool) -> Result<()> {
    let db = ctx.open()?;
    let dir = &ctx.config.migrations_dir;

    if status {
        let scripts = db.migration_status(dir)?;
        if ctx.json {
            return print_json(&scripts);
        }
        if scripts.is_empty() {
            println!("No migrations found in {}", dir.display());
            return Ok(());
        }
        for script in &scripts {
            let state = match script.applied_at {
                Some(at) => format!("applied {}", format_timestamp(at)).green(),
                None => "pending".yellow(),
            };
            println!("  {} {} {}", script.version.bold(), script.file_name, state);
        }
        return Ok(());
    }

    let report = db.apply_migrations(dir)?;
    if ctx.json {
        return print_json(&report);
    }

    if report.applied.is_empty() {
        println!("Schema is up to date ({} applied)", report.skipped.len());
    } else {
        println!(
            "{} {} migration(s): {}",
            "Applied".green().bold(),
            report.applied.len(),
            report.applied.join(", ")
        );
    }
    Ok(())
}
