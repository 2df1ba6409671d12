//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All services are initialized here and made available through AppState.

use crate::config::{BLOBS_DIRNAME, DATABASE_FILENAME, DATA_DIR_ENV};
use crate::database::{create_pool, RecordStore, Repository};
use crate::error::Result;
use crate::services::{
    AppSettings, ConsistencyCoordinator, CoordinatorOptions, ReconcileService, Sampler,
    SettingsService,
};
use crate::storage::BlobStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub settings: AppSettings,
    pub store: Arc<dyn RecordStore>,
    pub blob_store: BlobStore,
    pub coordinator: ConsistencyCoordinator,
    pub sampler: Sampler,
    pub reconciler: ReconcileService,
}

impl AppState {
    /// Wire services over an already-open record store and blob store
    pub fn from_parts(
        data_dir: PathBuf,
        settings: AppSettings,
        store: Arc<dyn RecordStore>,
        blob_store: BlobStore,
    ) -> Self {
        let coordinator = ConsistencyCoordinator::new(
            store.clone(),
            blob_store.clone(),
            CoordinatorOptions {
                empty_tags: settings.matches.empty_tags,
                blob_release: settings.storage.blob_release,
            },
        );
        let sampler = Sampler::with_recent_window(store.clone(), settings.sampling.recent_window);
        let reconciler = ReconcileService::new(
            store.clone(),
            blob_store.clone(),
            settings.storage.orphan_grace_secs,
        );

        Self {
            data_dir,
            settings,
            store,
            blob_store,
            coordinator,
            sampler,
            reconciler,
        }
    }
}

/// Resolve the data directory: `PICDECK_DATA_DIR`, then the platform data
/// directory, then `./picdeck-data`
pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|dir| dir.join("picdeck"))
        .unwrap_or_else(|| PathBuf::from("picdeck-data"))
}

/// Application setup - called once on startup
pub async fn setup(data_dir: PathBuf) -> Result<AppState> {
    tracing::info!("Initializing application");
    tracing::info!("App data directory: {:?}", data_dir);

    tokio::fs::create_dir_all(&data_dir).await?;

    let settings = SettingsService::new(data_dir.clone()).load().await?;

    let pool = create_pool(&data_dir.join(DATABASE_FILENAME)).await?;
    let store: Arc<dyn RecordStore> = Arc::new(Repository::new(pool));

    let blob_store = BlobStore::new(data_dir.join(BLOBS_DIRNAME));
    blob_store.initialize().await?;

    let state = AppState::from_parts(data_dir, settings, store, blob_store);

    tracing::info!("Application initialized successfully");

    Ok(state)
}
