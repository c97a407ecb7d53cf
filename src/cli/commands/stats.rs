//! Stats command implementation.

use super::{print_json, CommandContext};
use crate::error::Result;
use colored::Colorize;

/// Print row counts, file sizes, pool metrics, and engine settings.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or queried.
pub fn execute(ctx: &CommandContext) -> Result<()> {
    let db = ctx.open_migrated()?;
    let stats = db.stats()?;

    if ctx.json {
        return print_json(&stats);
    }

    println!("{}", "Data".cyan().bold());
    println!("  Conversations: {}", stats.conversations);
    println!("  Messages:      {}", stats.messages);
    println!("  Ratings:       {}", stats.ratings);

    println!("{}", "Files".cyan().bold());
    println!("  Database: {}", bytes(stats.database_size_bytes));
    println!("  WAL:      {}", bytes(stats.wal_size_bytes));

    let pool = &stats.connection_pool;
    println!("{}", "Connection pool".cyan().bold());
    println!(
        "  Open {} / max {} ({} idle, {} in use)",
        pool.open_connections, pool.max_open_connections, pool.idle, pool.in_use
    );
    println!(
        "  Waits: {} ({} ms total)",
        pool.wait_count, pool.wait_duration_ms
    );

    let engine = &stats.sqlite;
    println!("{}", format!("SQLite {}", engine.version).cyan().bold());
    println!("  journal_mode={} synchronous={}", engine.journal_mode, engine.synchronous);
    println!(
        "  cache_size={} temp_store={} mmap_size={}",
        engine.cache_size, engine.temp_store, engine.mmap_size
    );
    println!(
        "  pages={} page_size={} freelist={} foreign_keys={}",
        engine.page_count, engine.page_size, engine.freelist_count, engine.foreign_keys
    );
    Ok(())
}

fn bytes(size: Option<u64>) -> String {
    size.map_or_else(|| "-".dimmed().to_string(), |n| format!("{n} bytes"))
}
