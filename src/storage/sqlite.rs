//! SQLite storage implementation.
//!
//! [`Database`] owns the connection pool and exposes the conversation and
//! message operations. Ratings live in [`super::ratings`], health and
//! statistics in [`super::diagnostics`]; all of them share the transaction
//! helpers defined here.
//!
//! Every write runs inside one `BEGIN IMMEDIATE` transaction, so a failure
//! at any point leaves nothing behind.

use crate::config::DbConfig;
use crate::error::{Error, Result};
use crate::model::{character_count, Conversation, ConversationWithMessages, Message, MessageType};
use crate::storage::connection::{self, ConnectionPool, PooledConnection};
use crate::storage::migrations::{self, MigrationReport, MigrationStatus};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub(crate) const CONVERSATION_COLUMNS: &str = "id, session_id, title, created_at, updated_at, \
     prompt_count, total_characters, working_directory, transcript_path";

pub(crate) const MESSAGE_COLUMNS: &str =
    "id, conversation_id, message_type, content, character_count, timestamp, tool_calls, execution_time";

/// Checkouts faster than this are not counted as waits.
const WAIT_THRESHOLD: Duration = Duration::from_millis(1);

/// Cumulative pool wait accounting.
#[derive(Debug, Default)]
pub(crate) struct WaitStats {
    count: AtomicU64,
    total_micros: AtomicU64,
}

impl WaitStats {
    fn record(&self, waited: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(waited.as_micros()).unwrap_or(u64::MAX);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub(crate) fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub(crate) fn total(&self) -> Duration {
        Duration::from_micros(self.total_micros.load(Ordering::Relaxed))
    }
}

/// Handle to an open, tuned database.
///
/// Cheap to share: wrap it in an `Arc` and call it from any number of
/// threads. Dropping the last handle closes the pool.
pub struct Database {
    pool: ConnectionPool,
    config: DbConfig,
    returning: AtomicBool,
    waits: WaitStats,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.config.database_path)
            .field("returning", &self.uses_returning())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open the database described by `config`.
    ///
    /// Creates the parent directory, verifies connectivity, applies tuning,
    /// and builds the pool. Migrations are not applied; call
    /// [`Database::apply_migrations`] next.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid record and `Error::Connection`
    /// naming the failed step otherwise.
    pub fn open(config: &DbConfig) -> Result<Self> {
        let pool = connection::open_pool(config)?;
        let returning = connection::supports_returning();

        info!(
            path = %config.database_path.display(),
            max_open = config.max_open_conns,
            sqlite = rusqlite::version(),
            returning,
            "Database opened"
        );

        Ok(Self {
            pool,
            config: config.clone(),
            returning: AtomicBool::new(returning),
            waits: WaitStats::default(),
        })
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.database_path
    }

    /// Configuration this handle was opened with.
    #[must_use]
    pub const fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Whether inserts use `RETURNING` instead of a follow-up read.
    #[must_use]
    pub fn uses_returning(&self) -> bool {
        self.returning.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn set_returning(&self, enabled: bool) {
        self.returning.store(enabled, Ordering::Relaxed);
    }

    pub(crate) const fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub(crate) const fn waits(&self) -> &WaitStats {
        &self.waits
    }

    /// Check out a connection, recording checkouts that blocked.
    ///
    /// A checkout counts as a wait when `get()` itself takes at least
    /// `WAIT_THRESHOLD`, so the figure reflects time actually spent blocked
    /// rather than a racy look at pool state beforehand.
    pub(crate) fn conn(&self, op: &'static str) -> Result<PooledConnection> {
        let started = Instant::now();
        let conn = self
            .pool
            .get()
            .map_err(|source| Error::PoolTimeout { op, source });

        let waited = started.elapsed();
        if waited >= WAIT_THRESHOLD {
            self.waits.record(waited);
        }
        conn
    }

    /// Run `f` inside an IMMEDIATE transaction.
    ///
    /// The transaction commits only if `f` succeeds and rolls back on drop
    /// otherwise. Raw database errors are tagged with `op` and `key`.
    pub(crate) fn mutate<F, R>(&self, op: &'static str, key: impl fmt::Display, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let run = || -> Result<R> {
            let mut conn = self.conn(op)?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        };
        run().map_err(|e| e.in_op(op, &key))
    }

    /// Run `f` against a pooled connection without an explicit transaction.
    pub(crate) fn read<F, R>(&self, op: &'static str, key: impl fmt::Display, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn(op).map_err(|e| e.in_op(op, &key))?;
        f(&conn).map_err(|e| e.in_op(op, &key))
    }

    // ==================
    // Migrations
    // ==================

    /// Apply pending `*.up.sql` scripts from `dir`, in version order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Migration` naming the script and failed stage. Scripts
    /// applied before the failure stay applied.
    pub fn apply_migrations(&self, dir: &Path) -> Result<MigrationReport> {
        let mut conn = self.conn("apply_migrations")?;
        migrations::run_migrations(&mut conn, dir)
    }

    /// Applied/pending state of every script in `dir`. Does not write.
    ///
    /// # Errors
    ///
    /// Returns `Error::Migration` if the directory cannot be scanned.
    pub fn migration_status(&self, dir: &Path) -> Result<Vec<MigrationStatus>> {
        let conn = self.conn("migration_status")?;
        migrations::migration_status(&conn, dir)
    }

    // ==================
    // Conversation Operations
    // ==================

    /// Create a conversation for a new session.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConstraintViolation` if `session_id` already exists.
    pub fn create_conversation(
        &self,
        session_id: &str,
        title: Option<&str>,
        working_directory: Option<&str>,
        transcript_path: Option<&str>,
    ) -> Result<Conversation> {
        let returning = self.uses_returning();
        let conversation = self.mutate("create_conversation", session_id, |tx| {
            insert_conversation(tx, returning, session_id, title, working_directory, transcript_path)
        })?;
        debug!(id = conversation.id, session_id, "Conversation created");
        Ok(conversation)
    }

    /// Return the conversation for `session_id`, creating it if absent.
    ///
    /// Lookup and insert share one transaction, so concurrent callers with
    /// the same session id all receive the same row.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub fn get_or_create_conversation(
        &self,
        session_id: &str,
        working_directory: Option<&str>,
        transcript_path: Option<&str>,
    ) -> Result<Conversation> {
        let returning = self.uses_returning();
        self.mutate("get_or_create_conversation", session_id, |tx| {
            if let Some(existing) = find_by_session(tx, session_id)? {
                return Ok(existing);
            }
            let created = insert_conversation(
                tx,
                returning,
                session_id,
                None,
                working_directory,
                transcript_path,
            )?;
            debug!(id = created.id, session_id, "Conversation created for new session");
            Ok(created)
        })
    }

    /// # Errors
    ///
    /// Returns `Error::ConversationNotFound` if no row has this id.
    pub fn get_conversation(&self, id: i64) -> Result<Conversation> {
        self.read("get_conversation", id, |conn| {
            find_conversation(conn, id)?.ok_or(Error::ConversationNotFound { id })
        })
    }

    /// Exact, case-sensitive lookup by session id.
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotFound` if no conversation has this session.
    pub fn get_conversation_by_session_id(&self, session_id: &str) -> Result<Conversation> {
        self.read("get_conversation_by_session_id", session_id, |conn| {
            find_by_session(conn, session_id)?.ok_or_else(|| Error::SessionNotFound {
                session_id: session_id.to_string(),
            })
        })
    }

    /// Page of conversations, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_conversations(&self, limit: u32, offset: u64) -> Result<Vec<Conversation>> {
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        self.read("list_conversations", format!("{limit}@{offset}"), |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 ORDER BY updated_at DESC, id DESC
                 LIMIT ?1 OFFSET ?2"
            ))?;
            let rows = stmt.query_map(params![limit, offset], map_conversation_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
    }

    /// Total number of conversations.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_conversations(&self) -> Result<u64> {
        self.read("count_conversations", "*", |conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }

    /// Set or clear the title. Also bumps `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConversationNotFound` if no row has this id.
    pub fn update_conversation_title(&self, id: i64, title: Option<&str>) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.mutate("update_conversation_title", id, |tx| {
            let rows = tx.execute(
                "UPDATE conversations SET title = ?1, updated_at = ?2 WHERE id = ?3",
                params![title, now, id],
            )?;
            if rows == 0 {
                return Err(Error::ConversationNotFound { id });
            }
            Ok(())
        })
    }

    /// Delete a conversation and all of its messages atomically.
    ///
    /// Ratings attached to the conversation or its messages go with them.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConversationNotFound` if no row has this id; nothing
    /// is deleted in that case.
    pub fn delete_conversation(&self, id: i64) -> Result<()> {
        self.mutate("delete_conversation", id, |tx| {
            let messages = tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [id])?;
            let rows = tx.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
            if rows == 0 {
                return Err(Error::ConversationNotFound { id });
            }
            info!(id, messages, "Conversation deleted");
            Ok(())
        })
    }

    /// A conversation and its messages, read from one snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConversationNotFound` if no row has this id.
    pub fn get_conversation_with_messages(&self, id: i64) -> Result<ConversationWithMessages> {
        self.read("get_conversation_with_messages", id, |conn| {
            let tx = conn.unchecked_transaction()?;
            let conversation = find_conversation(&tx, id)?.ok_or(Error::ConversationNotFound { id })?;
            let messages = messages_for(&tx, id)?;
            tx.commit()?;
            Ok(ConversationWithMessages {
                conversation,
                messages,
            })
        })
    }

    // ==================
    // Message Operations
    // ==================

    /// Append a message to a conversation.
    ///
    /// `character_count` is computed here from `content`. The parent's
    /// `prompt_count`, `total_characters`, and `updated_at` are advanced in
    /// the same transaction by the `trg_messages_after_insert` trigger.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for a negative execution time and
    /// `Error::ConversationNotFound` if the parent does not exist.
    pub fn create_message(
        &self,
        conversation_id: i64,
        message_type: MessageType,
        content: &str,
        tool_calls: Option<&str>,
        execution_time: Option<i64>,
    ) -> Result<Message> {
        if execution_time.is_some_and(|ms| ms < 0) {
            return Err(Error::validation("execution_time", "cannot be negative"));
        }

        let count = character_count(content);
        let returning = self.uses_returning();
        self.mutate("create_message", conversation_id, |tx| {
            ensure_conversation(tx, conversation_id)?;
            insert_and_fetch(
                tx,
                returning,
                "INSERT INTO messages
                     (conversation_id, message_type, content, character_count, tool_calls, execution_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![conversation_id, message_type, content, count, tool_calls, execution_time],
                "messages",
                MESSAGE_COLUMNS,
                map_message_row,
            )
        })
    }

    /// # Errors
    ///
    /// Returns `Error::MessageNotFound` if no row has this id.
    pub fn get_message(&self, id: i64) -> Result<Message> {
        self.read("get_message", id, |conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                [id],
                map_message_row,
            )
            .optional()?
            .ok_or(Error::MessageNotFound { id })
        })
    }

    /// Messages of a conversation, oldest first. Unknown ids yield an empty
    /// list.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_messages_by_conversation(&self, conversation_id: i64) -> Result<Vec<Message>> {
        self.read("list_messages_by_conversation", conversation_id, |conn| {
            messages_for(conn, conversation_id)
        })
    }
}

// ==================
// Row helpers
// ==================

/// Insert one row and return it as stored.
///
/// With `returning`, a single `INSERT ... RETURNING` statement; otherwise the
/// insert followed by a read of `last_insert_rowid()` on the same
/// connection. Both paths produce identical records.
pub(crate) fn insert_and_fetch<T, P>(
    conn: &Connection,
    returning: bool,
    insert_sql: &str,
    params: P,
    table: &str,
    columns: &str,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<T>
where
    P: rusqlite::Params,
{
    if returning {
        let sql = format!("{insert_sql} RETURNING {columns}");
        return Ok(conn.query_row(&sql, params, map)?);
    }

    conn.execute(insert_sql, params)?;
    let id = conn.last_insert_rowid();
    let sql = format!("SELECT {columns} FROM {table} WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map)?)
}

fn insert_conversation(
    conn: &Connection,
    returning: bool,
    session_id: &str,
    title: Option<&str>,
    working_directory: Option<&str>,
    transcript_path: Option<&str>,
) -> Result<Conversation> {
    insert_and_fetch(
        conn,
        returning,
        "INSERT INTO conversations (session_id, title, working_directory, transcript_path)
         VALUES (?1, ?2, ?3, ?4)",
        params![session_id, title, working_directory, transcript_path],
        "conversations",
        CONVERSATION_COLUMNS,
        map_conversation_row,
    )
}

fn find_conversation(conn: &Connection, id: i64) -> Result<Option<Conversation>> {
    let conversation = conn
        .query_row(
            &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
            [id],
            map_conversation_row,
        )
        .optional()?;
    Ok(conversation)
}

fn find_by_session(conn: &Connection, session_id: &str) -> Result<Option<Conversation>> {
    let conversation = conn
        .query_row(
            &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE session_id = ?1"),
            [session_id],
            map_conversation_row,
        )
        .optional()?;
    Ok(conversation)
}

/// Fail with `ConversationNotFound` unless the row exists.
pub(crate) fn ensure_conversation(conn: &Connection, id: i64) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(Error::ConversationNotFound { id })
    }
}

fn messages_for(conn: &Connection, conversation_id: i64) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE conversation_id = ?1
         ORDER BY timestamp ASC, id ASC"
    ))?;
    let rows = stmt.query_map([conversation_id], map_message_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

/// Map a row to a Conversation struct.
pub(crate) fn map_conversation_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        session_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        prompt_count: row.get(5)?,
        total_characters: row.get(6)?,
        working_directory: row.get(7)?,
        transcript_path: row.get(8)?,
    })
}

/// Map a row to a Message struct.
pub(crate) fn map_message_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        message_type: row.get(2)?,
        content: row.get(3)?,
        character_count: row.get(4)?,
        timestamp: row.get(5)?,
        tool_calls: row.get(6)?,
        execution_time: row.get(7)?,
    })
}

impl ToSql for MessageType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MessageType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: Error| FromSqlError::Other(Box::new(e)))
    }
}
