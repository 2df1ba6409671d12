//! Picture-related commands
//!
//! CRUD operations and batch sampling for pictures.

use super::parse_limit;
use crate::app::AppState;
use crate::database::{Picture, PictureFilter, RecordStore};
use crate::error::{AppError, Result};
use crate::storage::Upload;
use serde::Deserialize;

/// Decoded query of a batch request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SampleBatchParams {
    pub category_id: String,
    /// Batch size as sent by the client
    pub limit: Option<String>,
    /// Only pictures carrying this tag
    pub tag: Option<String>,
}

/// Decoded fields of a picture creation form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePictureParams {
    pub category_id: String,
    pub matches: String,
}

/// Decoded fields of a picture update form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePictureParams {
    pub id: String,
    pub matches: Option<String>,
}

/// Sample an unordered batch of pictures of a category
pub async fn sample_batch(state: &AppState, params: SampleBatchParams) -> Result<Vec<Picture>> {
    if params.category_id.trim().is_empty() {
        return Err(AppError::MissingField("category_id".to_string()));
    }
    let limit = parse_limit(params.limit.as_deref())?;

    let mut filter = PictureFilter::for_category(params.category_id);
    if let Some(tag) = params.tag.filter(|t| !t.trim().is_empty()) {
        filter = filter.with_tag(tag);
    }

    state.sampler.sample(&filter, limit).await
}

/// Create a picture in an existing category
pub async fn create_picture(
    state: &AppState,
    params: CreatePictureParams,
    image: Option<Upload>,
) -> Result<Picture> {
    let image = image.unwrap_or_default();
    state
        .coordinator
        .create_picture(&params.category_id, &params.matches, image)
        .await
}

/// Get a picture by ID
pub async fn get_picture(state: &AppState, id: String) -> Result<Picture> {
    state
        .store
        .find_picture(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("picture {}", id)))
}

/// Replace a picture's tags, and its image when one is uploaded
pub async fn update_picture(
    state: &AppState,
    params: UpdatePictureParams,
    image: Option<Upload>,
) -> Result<Picture> {
    state
        .coordinator
        .update_picture(&params.id, params.matches.as_deref(), image)
        .await
}

/// Delete a picture
pub async fn delete_picture(state: &AppState, id: String) -> Result<()> {
    state.coordinator.delete_picture(&id).await?;
    Ok(())
}
