//! Record store capability
//!
//! The coordinator, sampler and reconciler only talk to records through this
//! trait. `Repository` implements it over SQLite, `MemoryRecordStore` in
//! process memory.
//!
//! Point operations return `Ok(None)` for a missing identity; deciding whether
//! that is an error belongs to the caller. Concurrent updates of the same
//! record are last-write-wins: there is no version check.

use super::models::*;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_category(&self, new: NewCategory) -> Result<Category>;

    async fn find_category(&self, id: &str) -> Result<Option<Category>>;

    async fn update_category(&self, id: &str, patch: CategoryPatch) -> Result<Option<Category>>;

    async fn delete_category(&self, id: &str) -> Result<Option<Category>>;

    /// All categories, newest first
    async fn list_categories(&self) -> Result<Vec<Category>>;

    async fn insert_picture(&self, new: NewPicture) -> Result<Picture>;

    async fn find_picture(&self, id: &str) -> Result<Option<Picture>>;

    async fn update_picture(&self, id: &str, patch: PicturePatch) -> Result<Option<Picture>>;

    async fn delete_picture(&self, id: &str) -> Result<Option<Picture>>;

    /// Pictures accepted by `filter`, newest first
    async fn find_pictures(&self, filter: &PictureFilter) -> Result<Vec<Picture>>;

    /// See [`SampleQuery`]
    async fn sample_pictures(&self, query: &SampleQuery) -> Result<Vec<Picture>>;

    /// Every blob reference held by a category or picture
    async fn referenced_blobs(&self) -> Result<HashSet<String>>;
}
