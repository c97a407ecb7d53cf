//! Rating operations.
//!
//! Scores are validated before any storage access. The parent check and the
//! insert share one transaction, so a rating never points at a row that was
//! deleted underneath it.

use crate::error::{Error, Result};
use crate::model::{Rating, RatingStats, RatingTarget};
use crate::storage::sqlite::{ensure_conversation, insert_and_fetch, Database};
use crate::validate::validate_rating;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

const RATING_COLUMNS: &str = "id, conversation_id, message_id, rating, comment, created_at, updated_at";

impl Database {
    /// Rate a conversation or a message.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for a score outside 1-5 (before touching
    /// storage), and `Error::ConversationNotFound` / `Error::MessageNotFound`
    /// if the parent does not exist.
    pub fn create_rating(
        &self,
        target: RatingTarget,
        rating: i64,
        comment: Option<&str>,
    ) -> Result<Rating> {
        validate_rating(rating)?;

        let returning = self.uses_returning();
        let (conversation_id, message_id) = target.as_parts();
        let created = self.mutate("create_rating", target, |tx| {
            match target {
                RatingTarget::Conversation(id) => ensure_conversation(tx, id)?,
                RatingTarget::Message(id) => ensure_message(tx, id)?,
            }
            insert_and_fetch(
                tx,
                returning,
                "INSERT INTO ratings (conversation_id, message_id, rating, comment)
                 VALUES (?1, ?2, ?3, ?4)",
                params![conversation_id, message_id, rating, comment],
                "ratings",
                RATING_COLUMNS,
                map_rating_row,
            )
        })?;
        debug!(id = created.id, %target, rating, "Rating created");
        Ok(created)
    }

    /// # Errors
    ///
    /// See [`Database::create_rating`].
    pub fn create_conversation_rating(
        &self,
        conversation_id: i64,
        rating: i64,
        comment: Option<&str>,
    ) -> Result<Rating> {
        self.create_rating(RatingTarget::Conversation(conversation_id), rating, comment)
    }

    /// # Errors
    ///
    /// See [`Database::create_rating`].
    pub fn create_message_rating(
        &self,
        message_id: i64,
        rating: i64,
        comment: Option<&str>,
    ) -> Result<Rating> {
        self.create_rating(RatingTarget::Message(message_id), rating, comment)
    }

    /// # Errors
    ///
    /// Returns `Error::RatingNotFound` if no row has this id.
    pub fn get_rating(&self, id: i64) -> Result<Rating> {
        self.read("get_rating", id, |conn| {
            conn.query_row(
                &format!("SELECT {RATING_COLUMNS} FROM ratings WHERE id = ?1"),
                [id],
                map_rating_row,
            )
            .optional()?
            .ok_or(Error::RatingNotFound { id })
        })
    }

    /// Ratings attached to `target`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_ratings_for(&self, target: RatingTarget) -> Result<Vec<Rating>> {
        let (column, id) = match target {
            RatingTarget::Conversation(id) => ("conversation_id", id),
            RatingTarget::Message(id) => ("message_id", id),
        };
        self.read("list_ratings_for", target, |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {RATING_COLUMNS} FROM ratings
                 WHERE {column} = ?1
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt.query_map([id], map_rating_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
    }

    /// Replace score and comment. Bumps `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for an out-of-range score and
    /// `Error::RatingNotFound` if no row has this id.
    pub fn update_rating(&self, id: i64, rating: i64, comment: Option<&str>) -> Result<()> {
        validate_rating(rating)?;

        let now = chrono::Utc::now().timestamp_millis();
        self.mutate("update_rating", id, |tx| {
            let rows = tx.execute(
                "UPDATE ratings SET rating = ?1, comment = ?2, updated_at = ?3 WHERE id = ?4",
                params![rating, comment, now, id],
            )?;
            if rows == 0 {
                return Err(Error::RatingNotFound { id });
            }
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns `Error::RatingNotFound` if no row has this id.
    pub fn delete_rating(&self, id: i64) -> Result<()> {
        self.mutate("delete_rating", id, |tx| {
            let rows = tx.execute("DELETE FROM ratings WHERE id = ?1", [id])?;
            if rows == 0 {
                return Err(Error::RatingNotFound { id });
            }
            Ok(())
        })
    }

    /// Average, per-score distribution, and total, from one query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn rating_stats(&self) -> Result<RatingStats> {
        self.read("rating_stats", "*", |conn| {
            let stats = conn.query_row(
                "SELECT AVG(rating), COUNT(*),
                        COALESCE(SUM(rating = 1), 0), COALESCE(SUM(rating = 2), 0),
                        COALESCE(SUM(rating = 3), 0), COALESCE(SUM(rating = 4), 0),
                        COALESCE(SUM(rating = 5), 0)
                 FROM ratings",
                [],
                |row| {
                    let mut stats = RatingStats::empty();
                    stats.average_score = row.get(0)?;
                    stats.total_count = to_count(row.get(1)?);
                    for score in 1..=5u8 {
                        let n: i64 = row.get(usize::from(score) + 1)?;
                        stats.distribution.insert(score, to_count(n));
                    }
                    Ok(stats)
                },
            )?;
            Ok(stats)
        })
    }
}

fn ensure_message(conn: &Connection, id: i64) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(Error::MessageNotFound { id })
    }
}

fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

/// Map a row to a Rating struct.
fn map_rating_row(row: &Row<'_>) -> rusqlite::Result<Rating> {
    Ok(Rating {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        message_id: row.get(2)?,
        rating: row.get(3)?,
        comment: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageType;
    use crate::storage::test_support::open_test_db;

    #[test]
    fn test_rating_crud() {
        let (_dir, db) = open_test_db();
        let conv = db.create_conversation("rated", None, None, None).unwrap();

        let rating = db
            .create_conversation_rating(conv.id, 4, Some("useful"))
            .unwrap();
        assert_eq!(rating.conversation_id, Some(conv.id));
        assert_eq!(rating.message_id, None);
        assert_eq!(rating.target().unwrap(), RatingTarget::Conversation(conv.id));

        db.update_rating(rating.id, 5, None).unwrap();
        let updated = db.get_rating(rating.id).unwrap();
        assert_eq!(updated.rating, 5);
        assert_eq!(updated.comment, None);
        assert!(updated.updated_at >= rating.updated_at);

        db.delete_rating(rating.id).unwrap();
        assert!(matches!(
            db.get_rating(rating.id),
            Err(Error::RatingNotFound { .. })
        ));
        assert!(matches!(
            db.delete_rating(rating.id),
            Err(Error::RatingNotFound { .. })
        ));
        assert!(matches!(
            db.update_rating(rating.id, 3, None),
            Err(Error::RatingNotFound { .. })
        ));
    }

    #[test]
    fn test_score_validated_before_storage() {
        let (_dir, db) = open_test_db();
        // Parent does not exist; validation must win.
        for score in [0, 6, -1] {
            let err = db.create_conversation_rating(999, score, None).unwrap_err();
            assert!(matches!(err, Error::Validation { field: "rating", .. }));
        }
        assert!(matches!(
            db.update_rating(1, 9, None),
            Err(Error::Validation { field: "rating", .. })
        ));
    }

    #[test]
    fn test_rating_requires_existing_parent() {
        let (_dir, db) = open_test_db();
        assert!(matches!(
            db.create_conversation_rating(41, 3, None),
            Err(Error::ConversationNotFound { id: 41 })
        ));
        assert!(matches!(
            db.create_message_rating(42, 3, None),
            Err(Error::MessageNotFound { id: 42 })
        ));
    }

    #[test]
    fn test_schema_enforces_exclusive_target() {
        let (_dir, db) = open_test_db();
        let conv = db.create_conversation("x", None, None, None).unwrap();
        let msg = db
            .create_message(conv.id, MessageType::Prompt, "p", None, None)
            .unwrap();

        let conn = db.conn("test").unwrap();
        let both = conn.execute(
            "INSERT INTO ratings (conversation_id, message_id, rating) VALUES (?1, ?2, 3)",
            [conv.id, msg.id],
        );
        assert!(both.is_err());
        let neither = conn.execute("INSERT INTO ratings (rating) VALUES (3)", []);
        assert!(neither.is_err());
    }

    #[test]
    fn test_list_ratings_newest_first() {
        let (_dir, db) = open_test_db();
        let conv = db.create_conversation("list", None, None, None).unwrap();
        let msg = db
            .create_message(conv.id, MessageType::Response, "r", None, None)
            .unwrap();

        let first = db.create_message_rating(msg.id, 2, None).unwrap();
        let second = db.create_message_rating(msg.id, 4, None).unwrap();
        db.create_conversation_rating(conv.id, 5, None).unwrap();

        let ratings = db.list_ratings_for(RatingTarget::Message(msg.id)).unwrap();
        let ids: Vec<i64> = ratings.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(
            db.list_ratings_for(RatingTarget::Conversation(conv.id))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_ratings_follow_message_deletion() {
        let (_dir, db) = open_test_db();
        let conv = db.create_conversation("cascade", None, None, None).unwrap();
        let msg = db
            .create_message(conv.id, MessageType::Prompt, "p", None, None)
            .unwrap();
        let on_msg = db.create_message_rating(msg.id, 3, None).unwrap();
        let on_conv = db.create_conversation_rating(conv.id, 4, None).unwrap();

        db.delete_conversation(conv.id).unwrap();
        assert!(db.get_rating(on_msg.id).unwrap_err().is_not_found());
        assert!(db.get_rating(on_conv.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_rating_stats() {
        let (_dir, db) = open_test_db();

        let empty = db.rating_stats().unwrap();
        assert_eq!(empty, RatingStats::empty());

        let conv = db.create_conversation("stats", None, None, None).unwrap();
        for score in [5, 5, 3, 1] {
            db.create_conversation_rating(conv.id, score, None).unwrap();
        }

        let stats = db.rating_stats().unwrap();
        assert_eq!(stats.total_count, 4);
        assert_eq!(stats.average_score, Some(3.5));
        assert_eq!(stats.distribution[&5], 2);
        assert_eq!(stats.distribution[&3], 1);
        assert_eq!(stats.distribution[&1], 1);
        assert_eq!(stats.distribution[&2], 0);
        assert_eq!(stats.distribution[&4], 0);
    }
}
