//! In-memory record store
//!
//! Keeps categories and pictures in insertion order behind a lock. Used by
//! tests and by embedders that do not need durability.

use super::models::*;
use super::store::RecordStore;
use crate::error::{AppError, Result, StoreError};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// In-memory record store
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<MemoryRecordStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryRecordStoreInner {
    categories: HashMap<String, (u64, Category)>,
    pictures: HashMap<String, (u64, Picture)>,
    /// Insertion counter, breaks `date_added` ties like SQLite's rowid
    next_seq: u64,
}

impl MemoryRecordStoreInner {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Pictures accepted by `filter`, newest first
    fn ordered_pictures(&self, filter: &PictureFilter) -> Vec<&Picture> {
        let mut matching: Vec<&(u64, Picture)> = self
            .pictures
            .values()
            .filter(|(_, picture)| filter.accepts(picture))
            .collect();
        matching.sort_by(|(seq_a, a), (seq_b, b)| {
            b.date_added.cmp(&a.date_added).then(seq_b.cmp(seq_a))
        });
        matching.into_iter().map(|(_, picture)| picture).collect()
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryRecordStoreInner>> {
        self.inner.read().map_err(|e| {
            AppError::StoreUnavailable(StoreError::Memory(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryRecordStoreInner>> {
        self.inner.write().map_err(|e| {
            AppError::StoreUnavailable(StoreError::Memory(format!(
                "failed to acquire write lock: {}",
                e
            )))
        })
    }

    /// Number of stored pictures
    pub fn picture_count(&self) -> Result<usize> {
        Ok(self.read()?.pictures.len())
    }

    fn sample(&self, query: &SampleQuery) -> Result<Vec<Picture>> {
        let inner = self.read()?;
        let excluded: HashSet<&str> = query.exclude_ids.iter().map(String::as_str).collect();
        let skip = query.skip.max(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l.max(0) as usize);

        let candidates: Vec<&Picture> = inner
            .ordered_pictures(&query.filter)
            .into_iter()
            .skip(skip)
            .take(limit)
            .filter(|picture| !excluded.contains(picture.id.as_str()))
            .collect();

        let mut rng = rand::thread_rng();
        Ok(candidates
            .choose_multiple(&mut rng, query.sample_size.max(0) as usize)
            .map(|picture| (*picture).clone())
            .collect())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_category(&self, new: NewCategory) -> Result<Category> {
        let mut inner = self.write()?;
        let category = Category {
            id: Uuid::new_v4().to_string(),
            title: new.title,
            image_url: new.image_url,
            date_added: new.date_added,
        };
        let seq = inner.next_seq();
        inner
            .categories
            .insert(category.id.clone(), (seq, category.clone()));
        Ok(category)
    }

    async fn find_category(&self, id: &str) -> Result<Option<Category>> {
        Ok(self.read()?.categories.get(id).map(|(_, c)| c.clone()))
    }

    async fn update_category(&self, id: &str, patch: CategoryPatch) -> Result<Option<Category>> {
        let mut inner = self.write()?;
        let Some((_, category)) = inner.categories.get_mut(id) else {
            return Ok(None);
        };
        if let Some(title) = patch.title {
            category.title = title;
        }
        if let Some(image_url) = patch.image_url {
            category.image_url = image_url;
        }
        Ok(Some(category.clone()))
    }

    async fn delete_category(&self, id: &str) -> Result<Option<Category>> {
        Ok(self.write()?.categories.remove(id).map(|(_, c)| c))
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let inner = self.read()?;
        let mut categories: Vec<&(u64, Category)> = inner.categories.values().collect();
        categories.sort_by(|(seq_a, a), (seq_b, b)| {
            b.date_added.cmp(&a.date_added).then(seq_b.cmp(seq_a))
        });
        Ok(categories.into_iter().map(|(_, c)| c.clone()).collect())
    }

    async fn insert_picture(&self, new: NewPicture) -> Result<Picture> {
        let mut inner = self.write()?;
        let picture = Picture {
            id: Uuid::new_v4().to_string(),
            category_id: new.category_id,
            matches: new.matches,
            image_url: new.image_url,
            date_added: new.date_added,
        };
        let seq = inner.next_seq();
        inner
            .pictures
            .insert(picture.id.clone(), (seq, picture.clone()));
        Ok(picture)
    }

    async fn find_picture(&self, id: &str) -> Result<Option<Picture>> {
        Ok(self.read()?.pictures.get(id).map(|(_, p)| p.clone()))
    }

    async fn update_picture(&self, id: &str, patch: PicturePatch) -> Result<Option<Picture>> {
        let mut inner = self.write()?;
        let Some((_, picture)) = inner.pictures.get_mut(id) else {
            return Ok(None);
        };
        if let Some(matches) = patch.matches {
            picture.matches = matches;
        }
        if let Some(image_url) = patch.image_url {
            picture.image_url = image_url;
        }
        Ok(Some(picture.clone()))
    }

    async fn delete_picture(&self, id: &str) -> Result<Option<Picture>> {
        Ok(self.write()?.pictures.remove(id).map(|(_, p)| p))
    }

    async fn find_pictures(&self, filter: &PictureFilter) -> Result<Vec<Picture>> {
        let inner = self.read()?;
        Ok(inner
            .ordered_pictures(filter)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn sample_pictures(&self, query: &SampleQuery) -> Result<Vec<Picture>> {
        self.sample(query)
    }

    async fn referenced_blobs(&self) -> Result<HashSet<String>> {
        let inner = self.read()?;
        Ok(inner
            .categories
            .values()
            .map(|(_, c)| c.image_url.clone())
            .chain(inner.pictures.values().map(|(_, p)| p.image_url.clone()))
            .collect())
    }
}
