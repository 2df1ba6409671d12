//! Settings service
//!
//! Manages runtime settings persistence using JSON file storage.

use crate::config::{
    DEFAULT_ORPHAN_GRACE_SECS, DEFAULT_SWEEP_FREQUENCY, MAX_ORPHAN_GRACE_SECS, MAX_RECENT_WINDOW,
    MIN_ORPHAN_GRACE_SECS,
    MIN_RECENT_WINDOW, RECENT_WINDOW, SETTINGS_FILENAME,
};
use crate::error::{AppError, Result};
use crate::services::scheduler::SweepFrequency;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// What to do with empty entries in a comma-separated tag list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyTagPolicy {
    /// Store empty tags verbatim (a trailing comma yields "")
    #[default]
    Keep,
    /// Silently remove empty tags
    Drop,
    /// Fail with `MissingField`
    Reject,
}

/// What happens to a blob once no record points at it anymore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobRelease {
    /// Leave the old blob on disk; the reconciliation sweep collects it
    Orphan,
    /// Delete the old blob once the new reference is committed
    #[default]
    AfterCommit,
}

/// Sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingSettings {
    /// Most-recent matching pictures considered fresh
    #[serde(default = "default_recent_window")]
    pub recent_window: i64,
}

fn default_recent_window() -> i64 {
    RECENT_WINDOW
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            recent_window: default_recent_window(),
        }
    }
}

/// Tag parsing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchSettings {
    #[serde(default)]
    pub empty_tags: EmptyTagPolicy,
}

/// Blob lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub blob_release: BlobRelease,
    /// Unreferenced blobs younger than this survive a sweep
    #[serde(default = "default_orphan_grace_secs")]
    pub orphan_grace_secs: u64,
    #[serde(default = "default_true")]
    pub sweep_enabled: bool,
    /// "30m", "6h", "1d", "hourly" or "daily"
    #[serde(default = "default_sweep_frequency")]
    pub sweep_frequency: String,
}

fn default_orphan_grace_secs() -> u64 {
    DEFAULT_ORPHAN_GRACE_SECS
}

fn default_true() -> bool {
    true
}

fn default_sweep_frequency() -> String {
    DEFAULT_SWEEP_FREQUENCY.to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            blob_release: BlobRelease::default(),
            orphan_grace_secs: default_orphan_grace_secs(),
            sweep_enabled: true,
            sweep_frequency: default_sweep_frequency(),
        }
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppSettings {
    #[serde(default)]
    pub sampling: SamplingSettings,
    #[serde(default)]
    pub matches: MatchSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

impl AppSettings {
    /// Check every value against the bounds in `config`
    pub fn validate(&self) -> Result<()> {
        let window = self.sampling.recent_window;
        if !(MIN_RECENT_WINDOW..=MAX_RECENT_WINDOW).contains(&window) {
            return Err(AppError::Settings(format!(
                "recent_window must be between {} and {}, got {}",
                MIN_RECENT_WINDOW, MAX_RECENT_WINDOW, window
            )));
        }

        let grace = self.storage.orphan_grace_secs;
        if !(MIN_ORPHAN_GRACE_SECS..=MAX_ORPHAN_GRACE_SECS).contains(&grace) {
            return Err(AppError::Settings(format!(
                "orphan_grace_secs must be between {} and {}, got {}",
                MIN_ORPHAN_GRACE_SECS, MAX_ORPHAN_GRACE_SECS, grace
            )));
        }

        self.sweep_frequency()?;
        Ok(())
    }

    pub fn sweep_frequency(&self) -> Result<SweepFrequency> {
        self.storage
            .sweep_frequency
            .parse()
            .map_err(AppError::Settings)
    }
}

/// Service for managing application settings
#[derive(Clone)]
pub struct SettingsService {
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            settings_path: data_dir.join(SETTINGS_FILENAME),
        }
    }

    /// Load settings from disk or create default if not exists
    pub async fn load(&self) -> Result<AppSettings> {
        if !fs::try_exists(&self.settings_path).await? {
            tracing::info!("Settings file not found, creating default settings");
            let default = AppSettings::default();
            self.save(&default).await?;
            return Ok(default);
        }

        let content = fs::read_to_string(&self.settings_path).await?;
        let settings: AppSettings = serde_json::from_str(&content)
            .map_err(|e| AppError::Settings(format!("Failed to parse settings: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to disk
    pub async fn save(&self, settings: &AppSettings) -> Result<()> {
        settings.validate()?;

        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.settings_path, content).await?;
        tracing::info!("Settings saved to {:?}", self.settings_path);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_creates_defaults() {
        let temp = TempDir::new().unwrap();
        let service = SettingsService::new(temp.path().to_path_buf());

        let settings = service.load().await.unwrap();
        assert_eq!(settings.sampling.recent_window, RECENT_WINDOW);
        assert_eq!(settings.matches.empty_tags, EmptyTagPolicy::Keep);
        assert_eq!(settings.storage.blob_release, BlobRelease::AfterCommit);
        assert!(temp.path().join(SETTINGS_FILENAME).exists());
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        tokio::fs::write(
            temp.path().join(SETTINGS_FILENAME),
            r#"{"matches":{"empty_tags":"drop"},"storage":{"blob_release":"orphan"}}"#,
        )
        .await
        .unwrap();

        let settings = SettingsService::new(temp.path().to_path_buf())
            .load()
            .await
            .unwrap();
        assert_eq!(settings.matches.empty_tags, EmptyTagPolicy::Drop);
        assert_eq!(settings.storage.blob_release, BlobRelease::Orphan);
        assert_eq!(settings.storage.orphan_grace_secs, DEFAULT_ORPHAN_GRACE_SECS);
        assert_eq!(settings.sampling.recent_window, RECENT_WINDOW);
    }

    #[tokio::test]
    async fn test_save_rejects_out_of_range() {
        let temp = TempDir::new().unwrap();
        let service = SettingsService::new(temp.path().to_path_buf());

        let mut settings = AppSettings::default();
        settings.sampling.recent_window = 0;
        assert!(matches!(
            service.save(&settings).await,
            Err(AppError::Settings(_))
        ));

        let mut settings = AppSettings::default();
        settings.storage.sweep_frequency = "fortnightly".to_string();
        assert!(service.save(&settings).await.is_err());
    }

    #[test]
    fn test_grace_period_bounds() {
        let mut settings = AppSettings::default();

        settings.storage.orphan_grace_secs = u64::MAX;
        assert!(matches!(settings.validate(), Err(AppError::Settings(_))));

        settings.storage.orphan_grace_secs = MAX_ORPHAN_GRACE_SECS + 1;
        assert!(settings.validate().is_err());

        settings.storage.orphan_grace_secs = MAX_ORPHAN_GRACE_SECS;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_sweep_frequency_out_of_unit_range() {
        let mut settings = AppSettings::default();
        settings.storage.sweep_frequency = "90m".to_string();
        assert!(matches!(settings.validate(), Err(AppError::Settings(_))));

        settings.storage.sweep_frequency = "48h".to_string();
        assert!(settings.validate().is_err());

        settings.storage.sweep_frequency = "2d".to_string();
        assert!(settings.validate().is_ok());
    }
}
