//! Category-related commands

use crate::app::AppState;
use crate::database::{Category, RecordStore};
use crate::error::Result;
use crate::services::DeleteReport;
use crate::storage::Upload;
use serde::Deserialize;

/// Decoded parameters of a category update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategoryParams {
    pub id: String,
    pub title: Option<String>,
}

/// Create a category from a title and an image upload
pub async fn create_category(state: &AppState, title: String, image: Option<Upload>) -> Result<Category> {
    let image = image.unwrap_or_default();
    state.coordinator.create_category(&title, image).await
}

/// List all categories, newest first
pub async fn list_categories(state: &AppState) -> Result<Vec<Category>> {
    state.store.list_categories().await
}

/// Rename a category and/or replace its image
pub async fn update_category(
    state: &AppState,
    params: UpdateCategoryParams,
    image: Option<Upload>,
) -> Result<Category> {
    state
        .coordinator
        .update_category(&params.id, params.title.as_deref(), image)
        .await
}

/// Delete a category together with all its pictures and blobs
pub async fn delete_category(state: &AppState, id: String) -> Result<DeleteReport> {
    state.coordinator.delete_category(&id).await
}
