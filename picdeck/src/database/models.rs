//! Database models
//!
//! Rust structs representing stored entities and the requests that create,
//! patch and query them. All models use serde for serialization to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A category of pictures, illustrated by its own image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: String,
    pub title: String,
    /// Reference of the blob holding the category image
    pub image_url: String,
    pub date_added: DateTime<Utc>,
}

/// A picture belonging to a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Picture {
    pub id: String,
    /// Advisory reference; the store does not enforce it
    pub category_id: String,
    /// Lowercased, trimmed tags in the order they were given
    #[sqlx(json)]
    pub matches: Vec<String>,
    pub image_url: String,
    pub date_added: DateTime<Utc>,
}

/// Insert category request
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub title: String,
    pub image_url: String,
    pub date_added: DateTime<Utc>,
}

/// Insert picture request
#[derive(Debug, Clone)]
pub struct NewPicture {
    pub category_id: String,
    pub matches: Vec<String>,
    pub image_url: String,
    pub date_added: DateTime<Utc>,
}

/// Point update for a category; `None` leaves the field untouched
#[derive(Debug, Clone, Default)]
pub struct CategoryPatch {
    pub title: Option<String>,
    pub image_url: Option<String>,
}

impl CategoryPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.image_url.is_none()
    }
}

/// Point update for a picture; `None` leaves the field untouched
#[derive(Debug, Clone, Default)]
pub struct PicturePatch {
    pub matches: Option<Vec<String>>,
    pub image_url: Option<String>,
}

impl PicturePatch {
    pub fn matches(matches: Vec<String>) -> Self {
        Self {
            matches: Some(matches),
            image_url: None,
        }
    }

    pub fn image_url(image_url: impl Into<String>) -> Self {
        Self {
            matches: None,
            image_url: Some(image_url.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_none() && self.image_url.is_none()
    }
}

/// Which pictures a query considers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PictureFilter {
    pub category_id: Option<String>,
    /// Only pictures whose matches contain this tag
    pub tag: Option<String>,
}

impl PictureFilter {
    pub fn for_category(category_id: impl Into<String>) -> Self {
        Self {
            category_id: Some(category_id.into()),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into().trim().to_lowercase());
        self
    }

    /// Evaluate the filter in memory
    pub fn accepts(&self, picture: &Picture) -> bool {
        let category_ok = self
            .category_id
            .as_ref()
            .map_or(true, |id| &picture.category_id == id);
        let tag_ok = self
            .tag
            .as_ref()
            .map_or(true, |tag| picture.matches.iter().any(|m| m == tag));
        category_ok && tag_ok
    }
}

/// Random subset of a recency-ordered slice of matching pictures.
///
/// Matching pictures are ordered newest first, `skip` are skipped, at most
/// `limit` are kept (all when `None`), pictures in `exclude_ids` are removed,
/// and a uniform random subset of `sample_size` is returned.
#[derive(Debug, Clone, Default)]
pub struct SampleQuery {
    pub filter: PictureFilter,
    pub skip: i64,
    pub limit: Option<i64>,
    pub sample_size: i64,
    pub exclude_ids: Vec<String>,
}
