//! Tag list parsing
//!
//! A tag list arrives as comma-separated text. Each entry is trimmed and
//! lowercased; empty entries follow the configured [`EmptyTagPolicy`].

use crate::error::{AppError, Result};
use crate::services::settings::EmptyTagPolicy;

/// Parse `"DOG, Pet ,cat"` into `["dog", "pet", "cat"]`
pub fn parse_matches(text: &str, policy: EmptyTagPolicy) -> Result<Vec<String>> {
    if text.trim().is_empty() {
        return Err(AppError::MissingField("matches".to_string()));
    }

    let tags: Vec<String> = text.split(',').map(|t| t.trim().to_lowercase()).collect();

    let tags = match policy {
        EmptyTagPolicy::Keep => tags,
        EmptyTagPolicy::Drop => tags.into_iter().filter(|t| !t.is_empty()).collect(),
        EmptyTagPolicy::Reject => {
            if tags.iter().any(String::is_empty) {
                return Err(AppError::MissingField(
                    "matches (empty tag entry)".to_string(),
                ));
            }
            tags
        }
    };

    if tags.is_empty() {
        return Err(AppError::MissingField("matches".to_string()));
    }

    Ok(tags)
}
