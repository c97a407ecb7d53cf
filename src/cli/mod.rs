//! CLI definitions using clap.

use crate::config::{resolve_db_path, DbConfig, DEFAULT_MIGRATIONS_DIR};
use crate::validate::DEFAULT_PAGE_SIZE;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// Configuration preset used to open the database.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Profile {
    /// 10 MB cache, 30 minute idle tolerance, database under ./data
    #[default]
    Development,
    /// 20 MB cache, 10 minute idle tolerance, database in the user data dir
    Production,
}

/// promptlog - conversation log store for AI coding sessions
#[derive(Parser, Debug)]
#[command(name = "promptlog", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default depends on --profile)
    #[arg(long, global = true, env = "PROMPTLOG_DB")]
    pub db: Option<PathBuf>,

    /// Directory holding NNN_name.up.sql scripts
    #[arg(long, global = true, env = "PROMPTLOG_MIGRATIONS")]
    pub migrations: Option<PathBuf>,

    /// Configuration preset
    #[arg(long, value_enum, global = true, default_value_t)]
    pub profile: Profile,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

impl Cli {
    /// Database configuration from profile and flags.
    #[must_use]
    pub fn db_config(&self) -> DbConfig {
        let production = self.profile == Profile::Production;
        let path = resolve_db_path(self.db.as_deref(), production);
        let mut config = if production {
            DbConfig::production(path)
        } else {
            DbConfig::development().with_path(path)
        };
        config.migrations_dir = self
            .migrations
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MIGRATIONS_DIR));
        config
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending schema migrations
    Migrate {
        /// Show applied/pending scripts without applying anything
        #[arg(long)]
        status: bool,
    },

    /// Check that the database answers
    Health,

    /// Row counts, file sizes, pool metrics, and engine settings
    Stats,

    /// Conversation management
    Conversations {
        #[command(subcommand)]
        command: ConversationCommands,
    },

    /// Rating reports
    Ratings {
        #[command(subcommand)]
        command: RatingCommands,
    },

    /// Print version information
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConversationCommands {
    /// List conversations, most recently updated first
    List {
        /// Page number (1-based)
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Conversations per page (1-100)
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        per_page: u32,
    },

    /// Show a conversation with its messages
    Show {
        /// Conversation ID
        id: String,
    },

    /// Delete a conversation, its messages, and their ratings
    Delete {
        /// Conversation ID
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum RatingCommands {
    /// Average score and per-score distribution
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_db_config_follows_flags() {
        let cli = Cli::parse_from([
            "promptlog",
            "--db",
            "/tmp/flag.db",
            "--migrations",
            "/srv/migrations",
            "--profile",
            "production",
            "stats",
        ]);
        let config = cli.db_config();
        assert_eq!(config.database_path, PathBuf::from("/tmp/flag.db"));
        assert_eq!(config.migrations_dir, PathBuf::from("/srv/migrations"));
        assert_eq!(config.cache_size, 20_000);
    }

    #[test]
    fn test_conversation_list_defaults() {
        let cli = Cli::parse_from(["promptlog", "conversations", "list"]);
        match cli.command {
            Commands::Conversations {
                command: ConversationCommands::List { page, per_page },
            } => {
                assert_eq!(page, 1);
                assert_eq!(per_page, DEFAULT_PAGE_SIZE);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
