//! Version command implementation.

use super::print_json;
use crate::error::Result;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    sqlite: &'a str,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };
    let sqlite = rusqlite::version();

    if json {
        return print_json(&VersionOutput {
            version,
            build,
            sqlite,
        });
    }

    println!("promptlog version {version} ({build}, SQLite {sqlite})");
    Ok(())
}
