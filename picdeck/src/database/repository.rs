//! Repository layer for database operations
//!
//! SQLite implementation of [`RecordStore`]. Tags are stored as a JSON array
//! and matched with `json_each`; recency is `date_added` with insertion order
//! breaking ties.

use super::models::*;
use super::store::RecordStore;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::SqlitePool;
use std::collections::HashSet;
use uuid::Uuid;

const RECENCY_ORDER: &str = "ORDER BY date_added DESC, rowid DESC";

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// WHERE clause (without the keyword) and its bind values for a filter
fn filter_clause(filter: &PictureFilter) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    if let Some(category_id) = &filter.category_id {
        conditions.push("category_id = ?");
        params.push(category_id.clone());
    }

    if let Some(tag) = &filter.tag {
        conditions.push(
            "EXISTS (SELECT 1 FROM json_each(pictures.matches) WHERE json_each.value = ?)",
        );
        params.push(tag.clone());
    }

    if conditions.is_empty() {
        ("1 = 1".to_string(), params)
    } else {
        (conditions.join(" AND "), params)
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[async_trait]
impl RecordStore for Repository {
    async fn insert_category(&self, new: NewCategory) -> Result<Category> {
        let id = Uuid::new_v4().to_string();

        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (id, title, image_url, date_added)
            VALUES (?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&new.title)
        .bind(&new.image_url)
        .bind(new.date_added)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Created category: {}", id);
        Ok(category)
    }

    async fn find_category(&self, id: &str) -> Result<Option<Category>> {
        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(category)
    }

    async fn update_category(&self, id: &str, patch: CategoryPatch) -> Result<Option<Category>> {
        if patch.is_empty() {
            return self.find_category(id).await;
        }

        // Build dynamic update query
        let mut assignments = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(title) = patch.title {
            assignments.push("title = ?");
            params.push(title);
        }

        if let Some(image_url) = patch.image_url {
            assignments.push("image_url = ?");
            params.push(image_url);
        }

        let query = format!(
            "UPDATE categories SET {} WHERE id = ? RETURNING *",
            assignments.join(", ")
        );
        params.push(id.to_string());

        let mut q = sqlx::query_as::<_, Category>(&query);
        for param in &params {
            q = q.bind(param);
        }

        let category = q.fetch_optional(&self.pool).await?;

        tracing::debug!("Updated category: {} (found: {})", id, category.is_some());
        Ok(category)
    }

    async fn delete_category(&self, id: &str) -> Result<Option<Category>> {
        let category =
            sqlx::query_as::<_, Category>("DELETE FROM categories WHERE id = ? RETURNING *")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        tracing::debug!("Deleted category: {} (found: {})", id, category.is_some());
        Ok(category)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(&format!(
            "SELECT * FROM categories {}",
            RECENCY_ORDER
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    async fn insert_picture(&self, new: NewPicture) -> Result<Picture> {
        let id = Uuid::new_v4().to_string();

        let picture = sqlx::query_as::<_, Picture>(
            r#"
            INSERT INTO pictures (id, category_id, matches, image_url, date_added)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&new.category_id)
        .bind(Json(&new.matches))
        .bind(&new.image_url)
        .bind(new.date_added)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Created picture: {} in category: {}", id, new.category_id);
        Ok(picture)
    }

    async fn find_picture(&self, id: &str) -> Result<Option<Picture>> {
        let picture = sqlx::query_as::<_, Picture>("SELECT * FROM pictures WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(picture)
    }

    async fn update_picture(&self, id: &str, patch: PicturePatch) -> Result<Option<Picture>> {
        if patch.is_empty() {
            return self.find_picture(id).await;
        }

        // Build dynamic update query
        let mut assignments = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(matches) = &patch.matches {
            assignments.push("matches = ?");
            params.push(serde_json::to_string(matches)?);
        }

        if let Some(image_url) = patch.image_url {
            assignments.push("image_url = ?");
            params.push(image_url);
        }

        let query = format!(
            "UPDATE pictures SET {} WHERE id = ? RETURNING *",
            assignments.join(", ")
        );
        params.push(id.to_string());

        let mut q = sqlx::query_as::<_, Picture>(&query);
        for param in &params {
            q = q.bind(param);
        }

        let picture = q.fetch_optional(&self.pool).await?;

        tracing::debug!("Updated picture: {} (found: {})", id, picture.is_some());
        Ok(picture)
    }

    async fn delete_picture(&self, id: &str) -> Result<Option<Picture>> {
        let picture = sqlx::query_as::<_, Picture>("DELETE FROM pictures WHERE id = ? RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        tracing::debug!("Deleted picture: {} (found: {})", id, picture.is_some());
        Ok(picture)
    }

    async fn find_pictures(&self, filter: &PictureFilter) -> Result<Vec<Picture>> {
        let (clause, params) = filter_clause(filter);
        let query = format!("SELECT * FROM pictures WHERE {} {}", clause, RECENCY_ORDER);

        let mut q = sqlx::query_as::<_, Picture>(&query);
        for param in &params {
            q = q.bind(param);
        }

        Ok(q.fetch_all(&self.pool).await?)
    }

    async fn sample_pictures(&self, query: &SampleQuery) -> Result<Vec<Picture>> {
        if query.sample_size <= 0 {
            return Ok(Vec::new());
        }

        let (clause, params) = filter_clause(&query.filter);

        let exclusion = if query.exclude_ids.is_empty() {
            String::new()
        } else {
            format!(
                "WHERE id NOT IN ({})",
                placeholders(query.exclude_ids.len())
            )
        };

        // LIMIT -1 means unbounded in SQLite
        let sql = format!(
            r#"
            SELECT * FROM (
                SELECT * FROM pictures WHERE {} {} LIMIT ? OFFSET ?
            ) {}
            ORDER BY RANDOM()
            LIMIT ?
            "#,
            clause, RECENCY_ORDER, exclusion
        );

        let mut q = sqlx::query_as::<_, Picture>(&sql);
        for param in &params {
            q = q.bind(param);
        }
        q = q.bind(query.limit.unwrap_or(-1)).bind(query.skip.max(0));
        for id in &query.exclude_ids {
            q = q.bind(id);
        }
        q = q.bind(query.sample_size);

        Ok(q.fetch_all(&self.pool).await?)
    }

    async fn referenced_blobs(&self) -> Result<HashSet<String>> {
        let references: Vec<String> = sqlx::query_scalar(
            "SELECT image_url FROM categories UNION SELECT image_url FROM pictures",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(references.into_iter().collect())
    }
}
