//! Rating command implementations.

use super::{print_json, CommandContext};
use crate::cli::RatingCommands;
use crate::error::Result;
use colored::Colorize;

/// Execute rating commands.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or queried.
pub fn execute(command: &RatingCommands, ctx: &CommandContext) -> Result<()> {
    match command {
        RatingCommands::Stats => stats(ctx),
    }
}

fn stats(ctx: &CommandContext) -> Result<()> {
    let db = ctx.open_migrated()?;
    let stats = db.rating_stats()?;

    if ctx.json {
        return print_json(&stats);
    }

    match stats.average_score {
        Some(avg) => println!(
            "{} {avg:.2} from {} rating(s)",
            "Average".cyan().bold(),
            stats.total_count
        ),
        None => println!("No ratings yet."),
    }
    for (score, count) in &stats.distribution {
        println!("  {score}: {count}");
    }
    Ok(())
}
