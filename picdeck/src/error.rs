//! Error types for picdeck
//!
//! All errors use thiserror for structured error handling.
//! Validation errors are client-caused; store errors are server-side and
//! logged in full where they are raised. Errors serialize to their message.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Unknown file type: {0}")]
    UnknownFileType(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Update failed: {0}")]
    UpdateFailed(StepFailures),

    #[error("Delete failed: {0}")]
    DeleteFailed(StepFailures),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

/// Underlying I/O failure of the record store or the blob store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("filesystem: {0}")]
    Io(#[from] std::io::Error),

    #[error("memory store: {0}")]
    Memory(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::StoreUnavailable(StoreError::Database(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::StoreUnavailable(StoreError::Io(err))
    }
}

impl AppError {
    /// True for failures caused by the caller's input; these are never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::MissingField(_)
                | AppError::InvalidReference(_)
                | AppError::UnknownFileType(_)
                | AppError::NotFound(_)
        )
    }

    /// HTTP-equivalent status for the failure
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::MissingField(_)
            | AppError::InvalidReference(_)
            | AppError::UnknownFileType(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::StoreUnavailable(_) => 503,
            _ => 500,
        }
    }

    /// Per-step outcomes carried by aggregate failures
    pub fn step_failures(&self) -> Option<&StepFailures> {
        match self {
            AppError::UpdateFailed(failures) | AppError::DeleteFailed(failures) => Some(failures),
            _ => None,
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// One failed sub-step of a concurrent join
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub step: String,
    pub error: String,
}

impl StepFailure {
    pub fn new(step: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            step: step.into(),
            error: error.to_string(),
        }
    }
}

/// Every failed sub-step of an operation, in the order they were joined
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepFailures(pub Vec<StepFailure>);

impl StepFailures {
    pub fn push(&mut self, failure: StepFailure) {
        self.0.push(failure);
    }

    pub fn extend(&mut self, other: StepFailures) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepFailure> {
        self.0.iter()
    }

    /// Whether any failed step name starts with `prefix`
    pub fn has_step(&self, prefix: &str) -> bool {
        self.0.iter().any(|f| f.step.starts_with(prefix))
    }
}

impl fmt::Display for StepFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|failure| format!("{} ({})", failure.step, failure.error))
            .collect();
        write!(f, "{} step(s) failed: {}", self.0.len(), parts.join("; "))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(AppError::MissingField("matches".into()).is_client_error());
        assert_eq!(AppError::UnknownFileType("x".into()).status_code(), 400);
        assert_eq!(AppError::NotFound("x".into()).status_code(), 404);

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: AppError = io.into();
        assert!(!err.is_client_error());
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_step_failures_display() {
        let mut failures = StepFailures::default();
        failures.push(StepFailure::new("update matches", "boom"));
        failures.push(StepFailure::new("update image_url", "bang"));

        let err = AppError::UpdateFailed(failures);
        assert_eq!(
            err.to_string(),
            "Update failed: 2 step(s) failed: update matches (boom); update image_url (bang)"
        );
        assert!(err.step_failures().unwrap().has_step("update image"));
        assert_eq!(err.status_code(), 500);
    }
}
