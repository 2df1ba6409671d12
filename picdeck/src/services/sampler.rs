//! Recency-biased batch sampler
//!
//! A batch is split into a "fresh" part, drawn from the `recent_window`
//! newest matching pictures, and a "backfill" part drawn from everything
//! older. The fresh part is between 1 and `count / 2` pictures, so newly added
//! pictures show up in every batch while most of the batch still spans the
//! whole history. Randomness comes from the store's sampling primitive.

use crate::config::RECENT_WINDOW;
use crate::database::{Picture, PictureFilter, RecordStore, SampleQuery};
use crate::error::Result;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;

/// Draws unordered, duplicate-free batches of pictures
#[derive(Clone)]
pub struct Sampler {
    store: Arc<dyn RecordStore>,
    recent_window: i64,
}

impl Sampler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_recent_window(store, RECENT_WINDOW)
    }

    pub fn with_recent_window(store: Arc<dyn RecordStore>, recent_window: i64) -> Self {
        Self {
            store,
            recent_window: recent_window.max(1),
        }
    }

    pub fn recent_window(&self) -> i64 {
        self.recent_window
    }

    /// Sample at most `count` pictures accepted by `filter`.
    ///
    /// A population smaller than `count` yields a smaller batch; `count <= 0`
    /// yields an empty one.
    pub async fn sample(&self, filter: &PictureFilter, count: i64) -> Result<Vec<Picture>> {
        if count <= 0 {
            return Ok(Vec::new());
        }

        let fresh_count = draw_fresh_count(count, &mut rand::thread_rng());

        let fresh = self
            .store
            .sample_pictures(&SampleQuery {
                filter: filter.clone(),
                skip: 0,
                limit: Some(self.recent_window),
                sample_size: fresh_count.min(self.recent_window),
                exclude_ids: Vec::new(),
            })
            .await?;

        let mut seen = HashSet::new();
        let mut batch: Vec<Picture> = fresh
            .into_iter()
            .filter(|p| seen.insert(p.id.clone()))
            .collect();

        let rest_count = count - batch.len() as i64;
        if rest_count <= 0 {
            batch.truncate(count as usize);
            return Ok(batch);
        }

        let backfill = self
            .store
            .sample_pictures(&SampleQuery {
                filter: filter.clone(),
                skip: self.recent_window,
                limit: None,
                sample_size: rest_count,
                exclude_ids: seen.iter().cloned().collect(),
            })
            .await?;
        extend_unique(&mut batch, &mut seen, backfill, count);

        // Older pictures ran out: top up from the recent window so a small
        // population is returned whole
        let shortfall = count - batch.len() as i64;
        if shortfall > 0 {
            let top_up = self
                .store
                .sample_pictures(&SampleQuery {
                    filter: filter.clone(),
                    skip: 0,
                    limit: Some(self.recent_window),
                    sample_size: shortfall,
                    exclude_ids: seen.iter().cloned().collect(),
                })
                .await?;
            extend_unique(&mut batch, &mut seen, top_up, count);
        }

        tracing::debug!(
            "Sampled {} of {} requested pictures ({} fresh)",
            batch.len(),
            count,
            fresh_count
        );

        Ok(batch)
    }
}

/// Uniform draw in `[1, max(1, count / 2)]`
pub fn draw_fresh_count<R: Rng + ?Sized>(count: i64, rng: &mut R) -> i64 {
    let upper = (count / 2).max(1);
    rng.gen_range(1..=upper)
}

fn extend_unique(
    batch: &mut Vec<Picture>,
    seen: &mut HashSet<String>,
    candidates: Vec<Picture>,
    count: i64,
) {
    for picture in candidates {
        if batch.len() as i64 >= count {
            break;
        }
        if seen.insert(picture.id.clone()) {
            batch.push(picture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryRecordStore, NewPicture};
    use chrono::{Duration, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    async fn seeded_sampler(population: i64, window: i64) -> (Sampler, Vec<Picture>) {
        let store = MemoryRecordStore::new();
        let base = Utc::now() - Duration::days(1);
        let mut pictures = Vec::new();
        for i in 0..population {
            pictures.push(
                store
                    .insert_picture(NewPicture {
                        category_id: "c1".to_string(),
                        matches: vec!["cat".to_string(), "animal".to_string()],
                        image_url: format!("{}.jpg", i),
                        date_added: base + Duration::seconds(i),
                    })
                    .await
                    .unwrap(),
            );
        }
        (
            Sampler::with_recent_window(Arc::new(store), window),
            pictures,
        )
    }

    fn ids(batch: &[Picture]) -> HashSet<String> {
        batch.iter().map(|p| p.id.clone()).collect()
    }

    #[test]
    fn test_fresh_count_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for count in 1..40 {
            for _ in 0..50 {
                let fresh = draw_fresh_count(count, &mut rng);
                assert!(fresh >= 1);
                assert!(fresh <= (count / 2).max(1));
            }
        }
        assert_eq!(draw_fresh_count(1, &mut rng), 1);
        assert_eq!(draw_fresh_count(3, &mut rng), 1);
    }

    #[tokio::test]
    async fn test_non_positive_count_is_empty() {
        let (sampler, _) = seeded_sampler(10, 5).await;
        let filter = PictureFilter::for_category("c1");

        assert!(sampler.sample(&filter, 0).await.unwrap().is_empty());
        assert!(sampler.sample(&filter, -3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_duplicates_and_bounded() {
        let (sampler, _) = seeded_sampler(120, 50).await;
        let filter = PictureFilter::for_category("c1");

        for count in [1, 2, 5, 10, 37, 100, 200] {
            for _ in 0..10 {
                let batch = sampler.sample(&filter, count).await.unwrap();
                assert!(batch.len() as i64 <= count);
                assert_eq!(ids(&batch).len(), batch.len());
            }
        }
    }

    #[tokio::test]
    async fn test_small_population_returned_whole() {
        let (sampler, pictures) = seeded_sampler(30, 50).await;
        let filter = PictureFilter::for_category("c1");

        let batch = sampler.sample(&filter, 40).await.unwrap();
        assert_eq!(ids(&batch), ids(&pictures));
    }

    #[tokio::test]
    async fn test_population_spanning_window_returned_whole() {
        let (sampler, pictures) = seeded_sampler(60, 50).await;
        let filter = PictureFilter::for_category("c1");

        let batch = sampler.sample(&filter, 100).await.unwrap();
        assert_eq!(batch.len(), 60);
        assert_eq!(ids(&batch), ids(&pictures));
    }

    #[tokio::test]
    async fn test_empty_population() {
        let (sampler, _) = seeded_sampler(0, 50).await;
        let batch = sampler
            .sample(&PictureFilter::for_category("c1"), 10)
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_fresh_pictures_always_present() {
        let (sampler, pictures) = seeded_sampler(200, 10).await;
        let recent = ids(&pictures[190..]);
        let filter = PictureFilter::for_category("c1");

        for _ in 0..50 {
            let batch = sampler.sample(&filter, 10).await.unwrap();
            assert_eq!(batch.len(), 10);
            let fresh_in_batch = batch.iter().filter(|p| recent.contains(&p.id)).count();
            // 1..=5 fresh; backfill never reaches into the window
            assert!((1..=5).contains(&fresh_in_batch));
        }
    }

    #[tokio::test]
    async fn test_filter_is_applied() {
        let (sampler, _) = seeded_sampler(20, 5).await;

        let other_category = sampler
            .sample(&PictureFilter::for_category("c2"), 10)
            .await
            .unwrap();
        assert!(other_category.is_empty());

        let by_tag = sampler
            .sample(&PictureFilter::for_category("c1").with_tag("Animal"), 10)
            .await
            .unwrap();
        assert_eq!(by_tag.len(), 10);

        let wrong_tag = sampler
            .sample(&PictureFilter::for_category("c1").with_tag("dog"), 10)
            .await
            .unwrap();
        assert!(wrong_tag.is_empty());
    }
}
