//! Health command implementation.

use super::{print_json, CommandContext};
use crate::error::Result;
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct HealthOutput<'a> {
    status: &'a str,
    database: String,
}

/// Open the database and ping it.
///
/// # Errors
///
/// Returns the connection or ping failure.
pub fn execute(ctx: &CommandContext) -> Result<()> {
    let db = ctx.open()?;
    db.health()?;

    let output = HealthOutput {
        status: "ok",
        database: db.path().display().to_string(),
    };
    if ctx.json {
        return print_json(&output);
    }
    println!("{} {}", "healthy".green().bold(), output.database);
    Ok(())
}
