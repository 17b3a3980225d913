//! Input validation for silences, matchers, and inhibition rules.
//!
//! Every check returns [`SuppressError::Validation`] naming the field and the
//! violated constraint, so administrative callers get precise feedback.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::error::{Result, SuppressError};

/// Minimum comment length, in characters.
pub const MIN_COMMENT_LENGTH: usize = 3;

/// Maximum comment length, in characters.
pub const MAX_COMMENT_LENGTH: usize = 1024;

/// Maximum creator length (RFC 5321 path limit).
pub const MAX_CREATOR_LENGTH: usize = 254;

/// Minimum number of matchers on a silence.
pub const MIN_MATCHERS: usize = 1;

/// Maximum number of matchers on a silence.
pub const MAX_MATCHERS: usize = 100;

/// Maximum length of a label name.
pub const MAX_LABEL_NAME_LENGTH: usize = 256;

/// Regex for e-mail shaped creator identities.
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)+$")
        .unwrap_or_else(|_| unreachable!())
});

/// Regex for Prometheus label names.
static LABEL_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap_or_else(|_| unreachable!()));

/// Validates a silence comment.
pub fn validate_comment(comment: &str) -> Result<()> {
    let len = comment.trim().chars().count();
    if len < MIN_COMMENT_LENGTH {
        return Err(SuppressError::validation(
            "comment",
            format!("must be at least {MIN_COMMENT_LENGTH} characters, got {len}"),
        ));
    }
    let len = comment.chars().count();
    if len > MAX_COMMENT_LENGTH {
        return Err(SuppressError::validation(
            "comment",
            format!("must be at most {MAX_COMMENT_LENGTH} characters, got {len}"),
        ));
    }
    Ok(())
}

/// Validates the creator identity of a silence.
pub fn validate_creator(created_by: &str) -> Result<()> {
    if created_by.is_empty() {
        return Err(SuppressError::validation("created_by", "cannot be empty"));
    }
    if created_by.len() > MAX_CREATOR_LENGTH {
        return Err(SuppressError::validation(
            "created_by",
            format!("must be at most {MAX_CREATOR_LENGTH} characters"),
        ));
    }
    if !EMAIL_REGEX.is_match(created_by) {
        return Err(SuppressError::validation(
            "created_by",
            format!("'{created_by}' is not a valid email address"),
        ));
    }
    Ok(())
}

/// Validates the number of matchers on a silence.
pub fn validate_matcher_count(count: usize) -> Result<()> {
    if count < MIN_MATCHERS {
        return Err(SuppressError::validation(
            "matchers",
            "at least one matcher is required",
        ));
    }
    if count > MAX_MATCHERS {
        return Err(SuppressError::validation(
            "matchers",
            format!("at most {MAX_MATCHERS} matchers are allowed, got {count}"),
        ));
    }
    Ok(())
}

/// Validates that a time window is non-empty.
pub fn validate_window(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Result<()> {
    if ends_at <= starts_at {
        return Err(SuppressError::validation(
            "ends_at",
            format!("must be after starts_at ({starts_at})"),
        ));
    }
    Ok(())
}

/// Validates a label name.
pub fn validate_label_name(field: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SuppressError::validation(field, "label name cannot be empty"));
    }
    if name.len() > MAX_LABEL_NAME_LENGTH {
        return Err(SuppressError::validation(
            field,
            format!("label name exceeds {MAX_LABEL_NAME_LENGTH} characters"),
        ));
    }
    if !LABEL_NAME_REGEX.is_match(name) {
        return Err(SuppressError::validation(
            field,
            format!("'{name}' is not a valid label name"),
        ));
    }
    Ok(())
}

/// Parses a silence ID.
pub fn parse_silence_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim())
        .map_err(|e| SuppressError::validation("id", format!("'{id}' is not a valid UUID: {e}")))
}
