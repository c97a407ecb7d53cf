//! Input validation for callers of the store.
//!
//! The store itself enforces score range, message type, execution time, and
//! rating exclusivity. Everything here is for the layer in front of it:
//! length limits, identifier shape, and pagination bounds.

use crate::error::{Error, Result};
use crate::model::{MAX_RATING, MIN_RATING};

// ── Limits ───────────────────────────────────────────────────

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_CONTENT_LENGTH: usize = 100_000;
pub const MAX_COMMENT_LENGTH: usize = 1_000;
pub const MAX_PATH_LENGTH: usize = 1_000;
pub const MAX_SESSION_ID_LENGTH: usize = 100;
pub const MAX_TOOL_CALL_LENGTH: usize = 50_000;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const MIN_PAGE_SIZE: u32 = 1;
pub const MAX_PAGE_NUMBER: u32 = 10_000;
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Characters allowed in paths besides ASCII alphanumerics.
const PATH_PUNCTUATION: &[char] = &['.', '_', '/', '\\', ':', '-'];

/// Strip control characters (keeping `\n`, `\t`, `\r`), trim, and cap at
/// `max_length` bytes without splitting a character.
#[must_use]
pub fn sanitize_string(input: &str, max_length: usize) -> String {
    let cleaned: String = input
        .chars()
        .filter(|&c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.len() <= max_length {
        return cleaned.to_string();
    }

    let mut end = max_length;
    while !cleaned.is_char_boundary(end) {
        end -= 1;
    }
    cleaned[..end].to_string()
}

/// Session ids: non-empty, at most 100 bytes, `[A-Za-z0-9_-]+`.
///
/// # Errors
///
/// Returns `Error::Validation` naming `session_id`.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() {
        return Err(Error::validation("session_id", "cannot be empty"));
    }
    if session_id.len() > MAX_SESSION_ID_LENGTH {
        return Err(Error::validation(
            "session_id",
            format!("cannot exceed {MAX_SESSION_ID_LENGTH} characters"),
        ));
    }
    if !session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::validation(
            "session_id",
            "can only contain letters, numbers, underscores, and hyphens",
        ));
    }
    Ok(())
}

/// Optional title, at most 200 bytes.
///
/// # Errors
///
/// Returns `Error::Validation` naming `title`.
pub fn validate_title(title: Option<&str>) -> Result<()> {
    check_optional_len("title", title, MAX_TITLE_LENGTH)
}

/// Message content: non-empty, at most 100 000 bytes.
///
/// # Errors
///
/// Returns `Error::Validation` naming `content`.
pub fn validate_content(content: &str) -> Result<()> {
    if content.is_empty() {
        return Err(Error::validation("content", "cannot be empty"));
    }
    if content.len() > MAX_CONTENT_LENGTH {
        return Err(Error::validation(
            "content",
            format!("cannot exceed {MAX_CONTENT_LENGTH} characters"),
        ));
    }
    Ok(())
}

/// Optional rating comment, at most 1 000 bytes.
///
/// # Errors
///
/// Returns `Error::Validation` naming `comment`.
pub fn validate_comment(comment: Option<&str>) -> Result<()> {
    check_optional_len("comment", comment, MAX_COMMENT_LENGTH)
}

/// Optional serialized tool-call list, at most 50 000 bytes.
///
/// # Errors
///
/// Returns `Error::Validation` naming `tool_calls`.
pub fn validate_tool_calls(tool_calls: Option<&str>) -> Result<()> {
    check_optional_len("tool_calls", tool_calls, MAX_TOOL_CALL_LENGTH)
}

/// Optional filesystem path: at most 1 000 bytes of
/// `[A-Za-z0-9._/\\:-]`.
///
/// # Errors
///
/// Returns `Error::Validation` naming `path`.
pub fn validate_path(path: Option<&str>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    if path.len() > MAX_PATH_LENGTH {
        return Err(Error::validation(
            "path",
            format!("cannot exceed {MAX_PATH_LENGTH} characters"),
        ));
    }
    if path.is_empty()
        || !path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || PATH_PUNCTUATION.contains(&c))
    {
        return Err(Error::validation("path", "contains invalid characters"));
    }
    Ok(())
}

/// Score in `[1, 5]`.
///
/// # Errors
///
/// Returns `Error::Validation` naming `rating`.
pub fn validate_rating(rating: i64) -> Result<()> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(Error::validation(
            "rating",
            format!("must be between {MIN_RATING} and {MAX_RATING}"),
        ));
    }
    Ok(())
}

/// Positive integer id.
///
/// # Errors
///
/// Returns `Error::Validation` naming `field`.
pub fn validate_id(id: i64, field: &'static str) -> Result<()> {
    if id <= 0 {
        return Err(Error::validation(field, "must be a positive integer"));
    }
    Ok(())
}

/// Parse and validate an id from text.
///
/// # Errors
///
/// Returns `Error::Validation` naming `field` for empty, non-numeric, or
/// non-positive input.
pub fn parse_id(raw: &str, field: &'static str) -> Result<i64> {
    if raw.is_empty() {
        return Err(Error::validation(field, "cannot be empty"));
    }
    let id: i64 = raw
        .parse()
        .map_err(|_| Error::validation(field, "must be a valid integer"))?;
    validate_id(id, field)?;
    Ok(id)
}

/// Page bounds: `1..=10_000`; page size bounds: `1..=100`.
///
/// # Errors
///
/// Returns `Error::Validation` naming `page` or `per_page`.
pub fn validate_pagination(page: u32, per_page: u32) -> Result<()> {
    if page < 1 {
        return Err(Error::validation("page", "must be at least 1"));
    }
    if page > MAX_PAGE_NUMBER {
        return Err(Error::validation(
            "page",
            format!("cannot exceed {MAX_PAGE_NUMBER}"),
        ));
    }
    if per_page < MIN_PAGE_SIZE {
        return Err(Error::validation(
            "per_page",
            format!("must be at least {MIN_PAGE_SIZE}"),
        ));
    }
    if per_page > MAX_PAGE_SIZE {
        return Err(Error::validation(
            "per_page",
            format!("cannot exceed {MAX_PAGE_SIZE}"),
        ));
    }
    Ok(())
}

/// A validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    /// # Errors
    ///
    /// Returns `Error::Validation` if either bound is out of range.
    pub fn new(page: u32, per_page: u32) -> Result<Self> {
        validate_pagination(page, per_page)?;
        Ok(Self { page, per_page })
    }

    /// Parse optional text parameters, defaulting to page 1 of 20.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for non-numeric or out-of-range input.
    pub fn parse(page: Option<&str>, per_page: Option<&str>) -> Result<Self> {
        let defaults = Self::default();
        let page = match page.filter(|s| !s.is_empty()) {
            Some(s) => s
                .parse()
                .map_err(|_| Error::validation("page", "must be a valid integer"))?,
            None => defaults.page,
        };
        let per_page = match per_page.filter(|s| !s.is_empty()) {
            Some(s) => s
                .parse()
                .map_err(|_| Error::validation("per_page", "must be a valid integer"))?,
            None => defaults.per_page,
        };
        Self::new(page, per_page)
    }

    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.per_page
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        (u64::from(self.page) - 1) * u64::from(self.per_page)
    }
}

fn check_optional_len(field: &'static str, value: Option<&str>, max: usize) -> Result<()> {
    match value {
        Some(v) if v.len() > max => Err(Error::validation(
            field,
            format!("cannot exceed {max} characters"),
        )),
        _ => Ok(()),
    }
}
