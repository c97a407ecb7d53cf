//! Conversation and message models.
//!
//! A conversation is the thread of activity for one external session id.
//! Its `prompt_count` and `total_characters` are maintained by the store and
//! are never computed by callers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A logged conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Store-assigned identifier
    pub id: i64,

    /// External session identifier (unique)
    pub session_id: String,

    pub title: Option<String>,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,

    /// Number of `prompt` messages
    pub prompt_count: i64,

    /// Sum of `character_count` over all messages
    pub total_characters: i64,

    pub working_directory: Option<String>,

    pub transcript_path: Option<String>,
}

/// A conversation together with its messages, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationWithMessages {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// Message type values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Prompt,
    Response,
}

impl MessageType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = Error;

    /// Parse a stored or caller-supplied tag. Only the exact lowercase tags
    /// are accepted.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "prompt" => Ok(Self::Prompt),
            "response" => Ok(Self::Response),
            other => Err(Error::validation(
                "message_type",
                format!("must be 'prompt' or 'response', got '{other}'"),
            )),
        }
    }
}

/// One prompt or response in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,

    pub conversation_id: i64,

    pub message_type: MessageType,

    pub content: String,

    /// Character length of `content`, computed at write time
    pub character_count: i64,

    /// Unix milliseconds
    pub timestamp: i64,

    /// Serialized `ToolCall` list (JSON array), if any
    pub tool_calls: Option<String>,

    /// Execution time in milliseconds
    pub execution_time: Option<i64>,
}

impl Message {
    /// Parse the stored tool-call list.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the stored text is not a tool-call array.
    pub fn parsed_tool_calls(&self) -> Result<Vec<ToolCall>> {
        parse_tool_calls(self.tool_calls.as_deref())
    }
}

/// Length of `content` as stored in `character_count`.
///
/// This is the UTF-8 byte length, the same value SQLite gives for
/// `length(CAST(content AS BLOB))`. Plain `length()` on TEXT stops at the
/// first NUL, so the schema CHECK casts to a blob.
#[must_use]
pub fn character_count(content: &str) -> i64 {
    i64::try_from(content.len()).unwrap_or(i64::MAX)
}

/// A tool invocation recorded alongside a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,

    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

/// Serialize tool calls for storage. An empty list stores as `None`.
///
/// # Errors
///
/// Returns `Error::Json` if serialization fails.
pub fn serialize_tool_calls(calls: &[ToolCall]) -> Result<Option<String>> {
    if calls.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(calls)?))
}

/// Parse stored tool-call text. `None` or empty text yields an empty list.
///
/// # Errors
///
/// Returns `Error::Json` on malformed JSON.
pub fn parse_tool_calls(raw: Option<&str>) -> Result<Vec<ToolCall>> {
    match raw {
        None => Ok(Vec::new()),
        Some(s) if s.trim().is_empty() => Ok(Vec::new()),
        Some(s) => Ok(serde_json::from_str(s)?),
    }
}
