//! Data models for promptlog.
//!
//! This module contains the domain models:
//! - Conversation
//! - Message (and ToolCall)
//! - Rating

pub mod conversation;
pub mod rating;

pub use conversation::{
    character_count, parse_tool_calls, serialize_tool_calls, Conversation,
    ConversationWithMessages, Message, MessageType, ToolCall,
};
pub use rating::{Rating, RatingStats, RatingTarget, MAX_RATING, MIN_RATING};
