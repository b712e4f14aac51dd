use super::Event;
use std::fmt;

/// Validation errors for an outgoing [`Event`] or a source instance id.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingId,
    MissingSource,
    InvalidSourceId(String),
    InvalidTimestamp(i64),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingId => write!(f, "event id is required"),
            ValidationError::MissingSource => write!(f, "source is required"),
            ValidationError::InvalidSourceId(s) => {
                write!(
                    f,
                    "invalid source id '{}': must be alphanumeric with optional '-' or '_'",
                    s
                )
            }
            ValidationError::InvalidTimestamp(ts) => {
                write!(f, "timestamp must be positive, got {}", ts)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates an event envelope.
///
/// Rules:
/// - `id` must be non-empty (it is the downstream dedup key)
/// - `source` must be a valid source instance id
/// - `timestamp` must be positive (Unix epoch milliseconds)
pub fn validate(event: &Event) -> Result<(), ValidationError> {
    if event.id.is_empty() {
        return Err(ValidationError::MissingId);
    }
    if event.source.is_empty() {
        return Err(ValidationError::MissingSource);
    }
    if !is_valid_source_id(&event.source) {
        return Err(ValidationError::InvalidSourceId(event.source.clone()));
    }
    if event.timestamp <= 0 {
        return Err(ValidationError::InvalidTimestamp(event.timestamp));
    }
    Ok(())
}

/// Validates a source instance id.
///
/// Ids end up in webhook callback paths, so they are restricted to:
/// - ASCII letters and digits
/// - `-` and `_` separators, never leading or trailing
/// - at most 128 characters
pub fn is_valid_source_id(id: &str) -> bool {
    if id.is_empty() || id.len() > 128 {
        return false;
    }

    let is_sep = |c: char| c == '-' || c == '_';
    if id.starts_with(is_sep) || id.ends_with(is_sep) {
        return false;
    }

    id.chars().all(|c| c.is_ascii_alphanumeric() || is_sep(c))
}
