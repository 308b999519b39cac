// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Input validation for party specs, chat messages and nicknames.

use crate::config::{ChatSettings, PartySettings};
use partyline_common::PartySpec;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

const MAX_ACTIVITY_LENGTH: usize = 64;
const MAX_NICKNAME_LENGTH: usize = 15;

// Catalog references are slugs owned by the activity catalog
static ACTIVITY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"));

/// Possible validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid activity reference: {0}")]
    InvalidActivity(String),

    #[error("Mode must be at most {0} characters")]
    ModeTooLong(usize),

    #[error("Description must be at most {0} characters")]
    DescriptionTooLong(usize),

    #[error("Max members must be between 1 and {0}")]
    InvalidCapacity(u32),

    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("Message must be at most {0} characters")]
    MessageTooLong(usize),

    #[error("Nickname must be between 1 and {MAX_NICKNAME_LENGTH} characters")]
    InvalidNickname,
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate the parameters of a new party
pub fn validate_party_spec(spec: &PartySpec, limits: &PartySettings) -> ValidationResult<()> {
    let activity = spec.activity.trim();
    if activity.is_empty() || activity.len() > MAX_ACTIVITY_LENGTH {
        return Err(ValidationError::InvalidActivity(format!(
            "must be 1 to {MAX_ACTIVITY_LENGTH} characters"
        )));
    }
    if !ACTIVITY_REGEX.is_match(activity) {
        return Err(ValidationError::InvalidActivity(
            "only letters, digits, '-' and '_' are allowed".to_string(),
        ));
    }

    if spec.mode.chars().count() > limits.max_mode_len {
        return Err(ValidationError::ModeTooLong(limits.max_mode_len));
    }

    if spec.description.chars().count() > limits.max_description_len {
        return Err(ValidationError::DescriptionTooLong(limits.max_description_len));
    }

    if spec.max_members == 0 || spec.max_members > limits.max_members_limit {
        return Err(ValidationError::InvalidCapacity(limits.max_members_limit));
    }

    Ok(())
}

/// Validate chat (or notice) content, returning the trimmed text
pub fn validate_message<'a>(content: &'a str, limits: &ChatSettings) -> ValidationResult<&'a str> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    if trimmed.chars().count() > limits.max_message_len {
        return Err(ValidationError::MessageTooLong(limits.max_message_len));
    }
    Ok(trimmed)
}

/// Validate a display name, returning the trimmed text
pub fn validate_nickname(nickname: &str) -> ValidationResult<&str> {
    let trimmed = nickname.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > MAX_NICKNAME_LENGTH {
        return Err(ValidationError::InvalidNickname);
    }
    Ok(trimmed)
}
