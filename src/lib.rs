//! promptlog - embedded persistence and migration engine for AI session logs
//!
//! Stores conversations, their prompt/response messages, and 1-5 ratings in
//! one SQLite file, behind a tuned `r2d2` connection pool.
//!
//! # Architecture
//!
//! - [`config`] - `DbConfig` profiles and the canonical connection target
//! - [`storage`] - Pool, migrations, entity operations, diagnostics
//! - [`model`] - Data types (Conversation, Message, Rating)
//! - [`validate`] - Input limits for callers in front of the store
//! - [`cli`] - Operator command-line interface using clap
//! - [`error`] - Error types and handling
//!
//! # Example
//!
//! ```no_run
//! use promptlog::config::DbConfig;
//! use promptlog::model::MessageType;
//! use promptlog::storage::Database;
//! use std::path::Path;
//!
//! # fn main() -> promptlog::Result<()> {
//! let db = Database::open(&DbConfig::development())?;
//! db.apply_migrations(Path::new("migrations"))?;
//!
//! let conv = db.get_or_create_conversation("session-123", None, None)?;
//! db.create_message(conv.id, MessageType::Prompt, "hello", None, None)?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod validate;

pub use error::{Error, Result};
pub use storage::Database;
