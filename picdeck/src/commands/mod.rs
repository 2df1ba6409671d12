//! Inbound operations
//!
//! Each command takes the application state and already-decoded request
//! parameters, and returns a serializable value or an `AppError` whose
//! `status_code()` a transport layer can forward. Commands are grouped by
//! entity:
//! - `categories`: Category creation, update, listing and cascade delete
//! - `pictures`: Picture CRUD and batch sampling

pub mod categories;
pub mod pictures;

use crate::app::AppState;
use crate::config::{DEFAULT_BATCH_LIMIT, MAX_BATCH_LIMIT};
use crate::error::{AppError, Result};

pub use categories::*;
pub use pictures::*;

// ===== General Commands =====

/// Get application information
pub async fn get_app_info(state: &AppState) -> Result<AppInfo> {
    Ok(AppInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        data_dir: state.data_dir.to_string_lossy().to_string(),
        recent_window: state.sampler.recent_window(),
    })
}

/// Application information structure
#[derive(Debug, serde::Serialize)]
pub struct AppInfo {
    pub version: String,
    pub data_dir: String,
    pub recent_window: i64,
}

/// Parse a textual batch size: absent or blank means the default, larger
/// values are clamped
pub fn parse_limit(limit: Option<&str>) -> Result<i64> {
    let Some(text) = limit.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(DEFAULT_BATCH_LIMIT);
    };
    let value: i64 = text
        .parse()
        .map_err(|_| AppError::MissingField("limit".to_string()))?;
    Ok(value.min(MAX_BATCH_LIMIT))
}
