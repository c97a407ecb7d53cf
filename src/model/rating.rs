//! Rating model.
//!
//! A rating attaches a 1-5 score to exactly one conversation or exactly one
//! message. [`RatingTarget`] makes "both" and "neither" unrepresentable; the
//! schema enforces the same rule with a CHECK constraint.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lowest accepted score.
pub const MIN_RATING: i64 = 1;

/// Highest accepted score.
pub const MAX_RATING: i64 = 5;

/// What a rating is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum RatingTarget {
    Conversation(i64),
    Message(i64),
}

impl RatingTarget {
    /// Build a target from two nullable parent references.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if both or neither are set.
    pub fn from_parts(conversation_id: Option<i64>, message_id: Option<i64>) -> Result<Self> {
        match (conversation_id, message_id) {
            (Some(id), None) => Ok(Self::Conversation(id)),
            (None, Some(id)) => Ok(Self::Message(id)),
            (Some(_), Some(_)) => Err(Error::validation(
                "rating_target",
                "cannot specify both conversation_id and message_id",
            )),
            (None, None) => Err(Error::validation(
                "rating_target",
                "either conversation_id or message_id is required",
            )),
        }
    }

    /// `(conversation_id, message_id)` as stored.
    #[must_use]
    pub const fn as_parts(&self) -> (Option<i64>, Option<i64>) {
        match *self {
            Self::Conversation(id) => (Some(id), None),
            Self::Message(id) => (None, Some(id)),
        }
    }
}

impl fmt::Display for RatingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conversation(id) => write!(f, "conversation {id}"),
            Self::Message(id) => write!(f, "message {id}"),
        }
    }
}

/// A stored rating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub id: i64,
    pub conversation_id: Option<i64>,
    pub message_id: Option<i64>,
    /// Score, 1-5
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Rating {
    /// The parent this rating belongs to.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the row violates exclusivity, which the
    /// schema should make impossible.
    pub fn target(&self) -> Result<RatingTarget> {
        RatingTarget::from_parts(self.conversation_id, self.message_id)
    }
}

/// Aggregate rating statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingStats {
    /// Mean score; `None` when no ratings exist.
    pub average_score: Option<f64>,
    /// Count per score. Always holds keys 1 through 5.
    pub distribution: BTreeMap<u8, u64>,
    pub total_count: u64,
}

impl RatingStats {
    /// Stats with every bucket present and zeroed.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            average_score: None,
            distribution: (1..=5).map(|score| (score, 0)).collect(),
            total_count: 0,
        }
    }
}
