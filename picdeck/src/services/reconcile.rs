//! Reconciliation sweep
//!
//! Blob writes and record writes are not transactional with each other, so a
//! failed insert or an orphaning update leaves blobs nothing points at. The
//! sweep deletes finalized blobs that no record references, and staged blobs
//! that were never finalized, once they are older than the grace period.
//! Younger files may still belong to an operation in flight.

use crate::database::RecordStore;
use crate::error::{AppError, Result, StepFailure, StepFailures};
use crate::storage::BlobStore;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of a single sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub staged_removed: usize,
    pub failures: StepFailures,
}

#[derive(Clone)]
pub struct ReconcileService {
    store: Arc<dyn RecordStore>,
    blob_store: BlobStore,
    /// `None` when the configured period does not fit a `Duration`
    grace: Option<Duration>,
}

impl ReconcileService {
    pub fn new(store: Arc<dyn RecordStore>, blob_store: BlobStore, grace_secs: u64) -> Self {
        Self {
            store,
            blob_store,
            grace: i64::try_from(grace_secs).ok().and_then(Duration::try_seconds),
        }
    }

    /// Sweep relative to the current time
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep treating `now` as the current time
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let cutoff = self
            .grace
            .and_then(|grace| now.checked_sub_signed(grace))
            .ok_or_else(|| {
                AppError::Settings("orphan grace period is out of range".to_string())
            })?;
        let referenced = self.store.referenced_blobs().await?;
        let finalized = self.blob_store.list_all().await?;
        let staged = self.blob_store.list_staged().await?;

        let mut report = SweepReport {
            scanned: finalized.len() + staged.len(),
            ..Default::default()
        };

        for blob in finalized {
            if referenced.contains(&blob.name) || blob.modified > cutoff {
                continue;
            }
            match self.blob_store.delete(&blob.name).await {
                Ok(()) => {
                    tracing::debug!("Removed orphaned blob: {}", blob.name);
                    report.removed += 1;
                }
                Err(e) => report
                    .failures
                    .push(StepFailure::new(format!("delete blob {}", blob.name), e)),
            }
        }

        for blob in staged {
            if blob.modified > cutoff {
                continue;
            }
            match self.blob_store.discard_staged(&blob.name).await {
                Ok(()) => report.staged_removed += 1,
                Err(e) => report
                    .failures
                    .push(StepFailure::new(format!("discard staged {}", blob.name), e)),
            }
        }

        if report.failures.is_empty() {
            tracing::info!(
                "Reconciliation sweep done: {} scanned, {} orphans and {} staged files removed",
                report.scanned,
                report.removed,
                report.staged_removed
            );
        } else {
            tracing::error!("Reconciliation sweep incomplete: {}", report.failures);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryRecordStore, NewCategory};
    use tempfile::TempDir;

    async fn setup() -> (ReconcileService, Arc<MemoryRecordStore>, BlobStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let blob_store = BlobStore::new(temp.path().join("blobs"));
        blob_store.initialize().await.unwrap();
        let store = Arc::new(MemoryRecordStore::new());
        let service = ReconcileService::new(store.clone(), blob_store.clone(), 3600);
        (service, store, blob_store, temp)
    }

    async fn put(blob_store: &BlobStore, name: &str) -> String {
        let staged = blob_store.store(name.as_bytes()).await.unwrap();
        blob_store.finalize(staged, name).await.unwrap()
    }

    #[tokio::test]
    async fn test_removes_old_orphans_only() {
        let (service, store, blob_store, _temp) = setup().await;

        let referenced = put(&blob_store, "kept.png").await;
        let orphan = put(&blob_store, "orphan.png").await;
        store
            .insert_category(NewCategory {
                title: "Animals".to_string(),
                image_url: referenced.clone(),
                date_added: Utc::now(),
            })
            .await
            .unwrap();

        // Within the grace period nothing goes
        let report = service.sweep().await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.removed, 0);
        assert!(blob_store.exists(&orphan).await.unwrap());

        let later = Utc::now() + Duration::hours(2);
        let report = service.sweep_at(later).await.unwrap();
        assert_eq!(report.removed, 1);
        assert!(report.failures.is_empty());
        assert!(!blob_store.exists(&orphan).await.unwrap());
        assert!(blob_store.exists(&referenced).await.unwrap());
    }

    #[tokio::test]
    async fn test_removes_stale_staged_files() {
        let (service, _store, blob_store, _temp) = setup().await;

        blob_store.store(b"abandoned").await.unwrap();
        assert_eq!(blob_store.list_staged().await.unwrap().len(), 1);

        let report = service.sweep().await.unwrap();
        assert_eq!(report.staged_removed, 0);

        let report = service
            .sweep_at(Utc::now() + Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(report.staged_removed, 1);
        assert!(blob_store.list_staged().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_grace_period_is_an_error() {
        let temp = TempDir::new().unwrap();
        let blob_store = BlobStore::new(temp.path().join("blobs"));
        blob_store.initialize().await.unwrap();
        let orphan = put(&blob_store, "orphan.png").await;

        for grace_secs in [u64::MAX, i64::MAX as u64, 9_300_000_000_000_000, 9_000_000_000_000_000] {
            let service = ReconcileService::new(
                Arc::new(MemoryRecordStore::new()),
                blob_store.clone(),
                grace_secs,
            );
            assert!(matches!(
                service.sweep().await,
                Err(AppError::Settings(_))
            ));
        }
        assert!(blob_store.exists(&orphan).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_store() {
        let (service, _store, _blob_store, _temp) = setup().await;
        let report = service.sweep().await.unwrap();
        assert_eq!(report.scanned, 0);
        assert_eq!(report.removed, 0);
    }
}
