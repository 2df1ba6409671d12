//! Consistency coordinator
//!
//! Every mutation touching both a record and its image blob goes through here.
//! The record store and the blob store share no transaction, so each
//! operation runs its steps in a fixed order:
//!
//! - create: validate, stage blob, finalize blob, insert record. An insert
//!   failure after finalize leaves an orphaned blob for the reconciliation
//!   sweep.
//! - update with a new image: finalize the new blob, then patch tags and
//!   image reference concurrently. Neither patch is rolled back if the other
//!   fails.
//! - delete: remove records, then their blobs. Completed removals stay
//!   removed when a sibling step fails.
//!
//! Steps that run concurrently are all joined before returning, and every
//! failed step is reported.

use crate::database::{
    Category, CategoryPatch, NewCategory, NewPicture, Picture, PictureFilter, PicturePatch,
    RecordStore,
};
use crate::error::{AppError, Result, StepFailure, StepFailures};
use crate::services::matches::parse_matches;
use crate::services::settings::{BlobRelease, EmptyTagPolicy};
use crate::storage::{BlobStore, Upload};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

/// Behaviour switches for the coordinator
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinatorOptions {
    pub empty_tags: EmptyTagPolicy,
    pub blob_release: BlobRelease,
}

/// What a cascade delete removed
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteReport {
    pub category_removed: bool,
    pub pictures_removed: usize,
    pub blobs_removed: usize,
}

impl DeleteReport {
    fn merge(&mut self, other: DeleteReport) {
        self.category_removed |= other.category_removed;
        self.pictures_removed += other.pictures_removed;
        self.blobs_removed += other.blobs_removed;
    }
}

/// Coordinates record and blob mutations
#[derive(Clone)]
pub struct ConsistencyCoordinator {
    store: Arc<dyn RecordStore>,
    blob_store: BlobStore,
    options: CoordinatorOptions,
}

impl ConsistencyCoordinator {
    pub fn new(store: Arc<dyn RecordStore>, blob_store: BlobStore, options: CoordinatorOptions) -> Self {
        Self {
            store,
            blob_store,
            options,
        }
    }

    pub fn options(&self) -> CoordinatorOptions {
        self.options
    }

    /// Create a category illustrated by `upload`
    pub async fn create_category(&self, title: &str, upload: Upload) -> Result<Category> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::MissingField("title".to_string()));
        }
        check_upload(&upload)?;

        tracing::info!("Creating category: {}", title);

        let image_url = self.put_blob(upload).await?;

        let category = self
            .store
            .insert_category(NewCategory {
                title: title.to_string(),
                image_url: image_url.clone(),
                date_added: Utc::now(),
            })
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    "Category insert failed, blob {} left for reconciliation: {}",
                    image_url,
                    e
                );
            })?;

        tracing::info!("Category created: {}", category.id);
        Ok(category)
    }

    /// Create a picture in an existing category.
    ///
    /// The category is checked before any blob is written.
    pub async fn create_picture(
        &self,
        category_id: &str,
        matches_text: &str,
        upload: Upload,
    ) -> Result<Picture> {
        if upload.is_empty() {
            return Err(AppError::MissingField("image".to_string()));
        }
        let matches = parse_matches(matches_text, self.options.empty_tags)?;

        if self.store.find_category(category_id).await?.is_none() {
            return Err(AppError::InvalidReference(format!(
                "category {} does not exist",
                category_id
            )));
        }
        check_upload(&upload)?;

        tracing::info!(
            "Creating picture in category: {} (size: {} bytes)",
            category_id,
            upload.data.len()
        );

        let image_url = self.put_blob(upload).await?;

        let picture = self
            .store
            .insert_picture(NewPicture {
                category_id: category_id.to_string(),
                matches,
                image_url: image_url.clone(),
                date_added: Utc::now(),
            })
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    "Picture insert failed, blob {} left for reconciliation: {}",
                    image_url,
                    e
                );
            })?;

        tracing::info!("Picture created: {}", picture.id);
        Ok(picture)
    }

    /// Replace a picture's tags, and its image when `upload` is given.
    ///
    /// With a new image the two patches are issued together; if either fails
    /// the result is `UpdateFailed` naming the failed patch, and the other
    /// patch stays applied.
    ///
    /// The replaced blob is the one read before the patches. It is released
    /// only if the committed record no longer points at it; a blob written by
    /// a concurrent update that lost the race is left for the sweep.
    pub async fn update_picture(
        &self,
        id: &str,
        matches_text: Option<&str>,
        upload: Option<Upload>,
    ) -> Result<Picture> {
        let matches_text = matches_text.ok_or_else(|| AppError::MissingField("matches".to_string()))?;
        let matches = parse_matches(matches_text, self.options.empty_tags)?;

        let existing = self
            .store
            .find_picture(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("picture {}", id)))?;

        let Some(upload) = upload else {
            tracing::debug!("Updating matches of picture: {}", id);
            return self
                .store
                .update_picture(id, PicturePatch::matches(matches))
                .await?
                .ok_or_else(|| AppError::NotFound(format!("picture {}", id)));
        };

        check_upload(&upload)?;
        tracing::info!("Replacing image of picture: {}", id);

        let image_url = self.put_blob(upload).await?;

        let (matches_result, image_result) = tokio::join!(
            self.store.update_picture(id, PicturePatch::matches(matches)),
            self.store
                .update_picture(id, PicturePatch::image_url(image_url.clone())),
        );

        let mut failures = StepFailures::default();
        record_patch_outcome(&mut failures, "update matches", id, matches_result);
        record_patch_outcome(&mut failures, "update image_url", id, image_result);

        if !failures.is_empty() {
            tracing::warn!("Update of picture {} partially failed: {}", id, failures);
            return Err(AppError::UpdateFailed(failures));
        }

        let current = self
            .store
            .find_picture(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("picture {}", id)))?;

        self.release_blob(&existing.image_url, &current.image_url).await;

        Ok(current)
    }

    /// Rename a category and/or replace its image
    pub async fn update_category(
        &self,
        id: &str,
        title: Option<&str>,
        upload: Option<Upload>,
    ) -> Result<Category> {
        let title = match title.map(str::trim) {
            Some("") => return Err(AppError::MissingField("title".to_string())),
            other => other.map(str::to_string),
        };
        if title.is_none() && upload.is_none() {
            return Err(AppError::MissingField("title or image".to_string()));
        }

        let existing = self
            .store
            .find_category(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("category {}", id)))?;

        let image_url = match upload {
            Some(upload) => {
                check_upload(&upload)?;
                Some(self.put_blob(upload).await?)
            }
            None => None,
        };

        tracing::info!("Updating category: {}", id);

        let category = self
            .store
            .update_category(
                id,
                CategoryPatch {
                    title,
                    image_url: image_url.clone(),
                },
            )
            .await
            .map_err(|e| {
                let mut failures = StepFailures::default();
                failures.push(StepFailure::new("update category", &e));
                tracing::warn!("Update of category {} failed: {}", id, e);
                AppError::UpdateFailed(failures)
            })?
            .ok_or_else(|| AppError::NotFound(format!("category {}", id)))?;

        if image_url.is_some() {
            self.release_blob(&existing.image_url, &category.image_url).await;
        }

        Ok(category)
    }

    /// Delete a category, every picture referencing it, and all their blobs.
    ///
    /// Pictures and the category are removed concurrently. Any failed step
    /// makes the whole call fail with `DeleteFailed`; steps that succeeded
    /// are not undone.
    pub async fn delete_category(&self, id: &str) -> Result<DeleteReport> {
        tracing::info!("Deleting category with cascade: {}", id);

        let ((pictures_report, pictures_failures, pictures_found), (category_report, category_failures)) =
            tokio::join!(self.delete_pictures_of(id), self.delete_category_record(id));

        let mut report = pictures_report;
        report.merge(category_report);

        let mut failures = pictures_failures;
        failures.extend(category_failures);

        if !failures.is_empty() {
            tracing::warn!("Cascade delete of category {} failed: {}", id, failures);
            return Err(AppError::DeleteFailed(failures));
        }

        if !report.category_removed && pictures_found == 0 {
            return Err(AppError::NotFound(format!("category {}", id)));
        }

        tracing::info!(
            "Category {} deleted ({} pictures, {} blobs)",
            id,
            report.pictures_removed,
            report.blobs_removed
        );
        Ok(report)
    }

    /// Delete a picture record.
    ///
    /// The blob is deleted afterwards unless blobs are configured to orphan.
    pub async fn delete_picture(&self, id: &str) -> Result<Picture> {
        tracing::info!("Deleting picture: {}", id);

        let picture = self
            .store
            .delete_picture(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("picture {}", id)))?;

        if self.options.blob_release == BlobRelease::AfterCommit {
            if let Err(e) = self.blob_store.delete(&picture.image_url).await {
                tracing::warn!(
                    "Picture {} deleted but blob {} was not: {}",
                    id,
                    picture.image_url,
                    e
                );
            }
        }

        Ok(picture)
    }

    /// Stage and finalize an upload, returning the permanent reference
    async fn put_blob(&self, upload: Upload) -> Result<String> {
        let staged = self.blob_store.store(&upload.data).await?;
        self.blob_store.finalize(staged, &upload.original_name).await
    }

    /// Delete a blob that a committed update replaced
    async fn release_blob(&self, old_url: &str, new_url: &str) {
        if old_url == new_url {
            return;
        }
        match self.options.blob_release {
            BlobRelease::Orphan => {
                tracing::debug!("Leaving replaced blob {} in place", old_url);
            }
            BlobRelease::AfterCommit => {
                if let Err(e) = self.blob_store.delete(old_url).await {
                    tracing::warn!("Failed to release replaced blob {}: {}", old_url, e);
                }
            }
        }
    }

    /// Branch (a) of a cascade: every picture of the category, concurrently
    async fn delete_pictures_of(&self, category_id: &str) -> (DeleteReport, StepFailures, usize) {
        let mut report = DeleteReport::default();
        let mut failures = StepFailures::default();

        let pictures = match self
            .store
            .find_pictures(&PictureFilter::for_category(category_id))
            .await
        {
            Ok(pictures) => pictures,
            Err(e) => {
                failures.push(StepFailure::new("find pictures", e));
                return (report, failures, 0);
            }
        };

        let found = pictures.len();
        let outcomes = join_all(pictures.iter().map(|p| self.delete_record_then_blob(p))).await;

        for (record_removed, blob_removed, step_failures) in outcomes {
            if record_removed {
                report.pictures_removed += 1;
            }
            if blob_removed {
                report.blobs_removed += 1;
            }
            failures.extend(step_failures);
        }

        (report, failures, found)
    }

    async fn delete_record_then_blob(&self, picture: &Picture) -> (bool, bool, StepFailures) {
        let mut failures = StepFailures::default();

        let record_removed = match self.store.delete_picture(&picture.id).await {
            Ok(removed) => removed.is_some(),
            Err(e) => {
                failures.push(StepFailure::new(
                    format!("delete picture record {}", picture.id),
                    e,
                ));
                return (false, false, failures);
            }
        };

        let blob_removed = match self.blob_store.delete(&picture.image_url).await {
            Ok(()) => true,
            Err(e) => {
                failures.push(StepFailure::new(
                    format!("delete picture blob {}", picture.image_url),
                    e,
                ));
                false
            }
        };

        (record_removed, blob_removed, failures)
    }

    /// Branch (b) of a cascade: the category record and its blob
    async fn delete_category_record(&self, id: &str) -> (DeleteReport, StepFailures) {
        let mut report = DeleteReport::default();
        let mut failures = StepFailures::default();

        let category = match self.store.find_category(id).await {
            Ok(Some(category)) => category,
            Ok(None) => return (report, failures),
            Err(e) => {
                failures.push(StepFailure::new("find category", e));
                return (report, failures);
            }
        };

        match self.store.delete_category(id).await {
            Ok(removed) => report.category_removed = removed.is_some(),
            Err(e) => {
                failures.push(StepFailure::new("delete category record", e));
                return (report, failures);
            }
        }

        match self.blob_store.delete(&category.image_url).await {
            Ok(()) => report.blobs_removed += 1,
            Err(e) => failures.push(StepFailure::new(
                format!("delete category blob {}", category.image_url),
                e,
            )),
        }

        (report, failures)
    }
}

/// Reject uploads that could never be finalized, before anything is written
fn check_upload(upload: &Upload) -> Result<()> {
    if upload.is_empty() {
        return Err(AppError::MissingField("image".to_string()));
    }
    if upload.extension().is_none() {
        return Err(AppError::UnknownFileType(
            crate::storage::blob_store::sanitize_filename(&upload.original_name),
        ));
    }
    Ok(())
}

fn record_patch_outcome(
    failures: &mut StepFailures,
    step: &str,
    id: &str,
    outcome: Result<Option<Picture>>,
) {
    match outcome {
        Ok(Some(_)) => {}
        Ok(None) => failures.push(StepFailure::new(step, format!("picture {} not found", id))),
        Err(e) => failures.push(StepFailure::new(step, e)),
    }
}
