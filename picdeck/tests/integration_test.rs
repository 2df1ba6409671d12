//! Integration tests for picdeck
//!
//! These tests verify end-to-end functionality including:
//! - Category and picture workflows through the command layer
//! - Cascade delete across records and blobs
//! - Batch sampling on an SQLite-backed store
//! - Reconciliation of orphaned blobs

use chrono::{Duration, Utc};
use picdeck::app::{self, AppState};
use picdeck::commands::{self, CreatePictureParams, SampleBatchParams, UpdatePictureParams};
use picdeck::database::{NewPicture, Picture, PictureFilter, RecordStore};
use picdeck::error::AppError;
use picdeck::storage::Upload;
use std::collections::{HashMap, HashSet};
use tempfile::TempDir;

/// Helper to create a fully wired application on a temporary data directory
async fn create_test_app() -> (AppState, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let state = app::setup(temp_dir.path().join("data")).await.unwrap();
    (state, temp_dir)
}

fn image(name: &str) -> Option<Upload> {
    Some(Upload::new(format!("bytes of {}", name).into_bytes(), name))
}

async fn blob_count(state: &AppState) -> usize {
    state.blob_store.list_all().await.unwrap().len()
        + state.blob_store.list_staged().await.unwrap().len()
}

/// Insert `count` pictures directly, one second apart, oldest first
async fn seed_pictures(state: &AppState, category_id: &str, count: i64) -> Vec<Picture> {
    let base = Utc::now() - Duration::days(1);
    let mut pictures = Vec::new();
    for i in 0..count {
        let picture = state
            .store
            .insert_picture(NewPicture {
                category_id: category_id.to_string(),
                matches: vec!["cat".to_string(), "animal".to_string()],
                image_url: format!("seed-{}.jpg", i),
                date_added: base + Duration::seconds(i),
            })
            .await
            .unwrap();
        pictures.push(picture);
    }
    pictures
}

#[tokio::test]
async fn test_category_and_picture_workflow() {
    let (state, _temp) = create_test_app().await;

    let category = commands::create_category(&state, "Animals".to_string(), image("animals.png"))
        .await
        .unwrap();
    assert!(!category.id.is_empty());

    let picture = commands::create_picture(
        &state,
        CreatePictureParams {
            category_id: category.id.clone(),
            matches: "Cat, Animal".to_string(),
        },
        image("cat.jpg"),
    )
    .await
    .unwrap();
    assert_eq!(picture.matches, vec!["cat", "animal"]);

    let fetched = commands::get_picture(&state, picture.id.clone()).await.unwrap();
    assert_eq!(fetched, picture);

    let updated = commands::update_picture(
        &state,
        UpdatePictureParams {
            id: picture.id.clone(),
            matches: Some("DOG, Pet ,cat".to_string()),
        },
        None,
    )
    .await
    .unwrap();
    assert_eq!(updated.matches, vec!["dog", "pet", "cat"]);

    let categories = commands::list_categories(&state).await.unwrap();
    assert_eq!(categories.len(), 1);

    commands::delete_picture(&state, picture.id.clone()).await.unwrap();
    assert!(matches!(
        commands::get_picture(&state, picture.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(!state.blob_store.exists(&picture.image_url).await.unwrap());
}

#[tokio::test]
async fn test_create_picture_with_missing_category() {
    let (state, _temp) = create_test_app().await;
    let before = blob_count(&state).await;

    let err = commands::create_picture(
        &state,
        CreatePictureParams {
            category_id: "does-not-exist".to_string(),
            matches: "cat".to_string(),
        },
        image("cat.png"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::InvalidReference(_)));
    assert_eq!(err.status_code(), 400);
    assert_eq!(blob_count(&state).await, before);
}

#[tokio::test]
async fn test_create_picture_without_extension() {
    let (state, _temp) = create_test_app().await;
    let category = commands::create_category(&state, "Animals".to_string(), image("animals.png"))
        .await
        .unwrap();

    let err = commands::create_picture(
        &state,
        CreatePictureParams {
            category_id: category.id,
            matches: "cat".to_string(),
        },
        image("cat"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::UnknownFileType(_)));
}

#[tokio::test]
async fn test_create_picture_without_image() {
    let (state, _temp) = create_test_app().await;
    let category = commands::create_category(&state, "Animals".to_string(), image("animals.png"))
        .await
        .unwrap();

    let err = commands::create_picture(
        &state,
        CreatePictureParams {
            category_id: category.id,
            matches: "cat".to_string(),
        },
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::MissingField(_)));
}

#[tokio::test]
async fn test_delete_category_cascade() {
    let (state, _temp) = create_test_app().await;

    let category = commands::create_category(&state, "Animals".to_string(), image("animals.png"))
        .await
        .unwrap();
    for i in 0..4 {
        commands::create_picture(
            &state,
            CreatePictureParams {
                category_id: category.id.clone(),
                matches: "cat,animal".to_string(),
            },
            image(&format!("cat{}.png", i)),
        )
        .await
        .unwrap();
    }
    assert_eq!(blob_count(&state).await, 5);

    let report = commands::delete_category(&state, category.id.clone())
        .await
        .unwrap();
    assert!(report.category_removed);
    assert_eq!(report.pictures_removed, 4);
    assert_eq!(report.blobs_removed, 5);

    let residual = state
        .store
        .find_pictures(&PictureFilter::for_category(&category.id))
        .await
        .unwrap();
    assert!(residual.is_empty());
    assert!(commands::list_categories(&state).await.unwrap().is_empty());
    assert_eq!(blob_count(&state).await, 0);

    assert!(matches!(
        commands::delete_category(&state, category.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_replacing_image_releases_previous_blob() {
    let (state, _temp) = create_test_app().await;
    let category = commands::create_category(&state, "Animals".to_string(), image("animals.png"))
        .await
        .unwrap();
    let picture = commands::create_picture(
        &state,
        CreatePictureParams {
            category_id: category.id,
            matches: "cat".to_string(),
        },
        image("cat.png"),
    )
    .await
    .unwrap();

    let updated = commands::update_picture(
        &state,
        UpdatePictureParams {
            id: picture.id,
            matches: Some("cat, kitten".to_string()),
        },
        image("kitten.png"),
    )
    .await
    .unwrap();

    assert_eq!(updated.matches, vec!["cat", "kitten"]);
    assert!(state.blob_store.exists(&updated.image_url).await.unwrap());
    assert!(!state.blob_store.exists(&picture.image_url).await.unwrap());
    assert_eq!(blob_count(&state).await, 2);
}

#[tokio::test]
async fn test_sample_batch_sixty_pictures_no_duplicates() {
    let (state, _temp) = create_test_app().await;
    seed_pictures(&state, "c", 60).await;

    for _ in 0..100 {
        let batch = commands::sample_batch(
            &state,
            SampleBatchParams {
                category_id: "c".to_string(),
                limit: Some("10".to_string()),
                tag: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(batch.len(), 10);
        let ids: HashSet<&str> = batch.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids.len(), batch.len());
    }
}

#[tokio::test]
async fn test_sample_batch_favours_recent_pictures() {
    let (state, _temp) = create_test_app().await;
    let pictures = seed_pictures(&state, "c", 300).await;
    let window = state.sampler.recent_window() as usize;
    let recent: HashSet<String> = pictures[pictures.len() - window..]
        .iter()
        .map(|p| p.id.clone())
        .collect();

    let mut appearances: HashMap<String, usize> = HashMap::new();
    for _ in 0..100 {
        let batch = commands::sample_batch(
            &state,
            SampleBatchParams {
                category_id: "c".to_string(),
                limit: None,
                tag: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(batch.len(), 10);

        let fresh = batch.iter().filter(|p| recent.contains(&p.id)).count();
        assert!((1..=5).contains(&fresh));

        for picture in batch {
            *appearances.entry(picture.id).or_default() += 1;
        }
    }

    let (recent_hits, older_hits) =
        appearances
            .iter()
            .fold((0usize, 0usize), |(r, o), (id, hits)| {
                if recent.contains(id) {
                    (r + hits, o)
                } else {
                    (r, o + hits)
                }
            });
    let recent_rate = recent_hits as f64 / window as f64;
    let older_rate = older_hits as f64 / (pictures.len() - window) as f64;
    assert!(
        recent_rate > older_rate,
        "recent pictures should appear more often ({} vs {})",
        recent_rate,
        older_rate
    );
}

#[tokio::test]
async fn test_sample_batch_small_population_and_tag() {
    let (state, _temp) = create_test_app().await;
    let pictures = seed_pictures(&state, "c", 7).await;

    let batch = commands::sample_batch(
        &state,
        SampleBatchParams {
            category_id: "c".to_string(),
            limit: Some("50".to_string()),
            tag: Some("Animal".to_string()),
        },
    )
    .await
    .unwrap();
    let ids: HashSet<String> = batch.into_iter().map(|p| p.id).collect();
    let expected: HashSet<String> = pictures.into_iter().map(|p| p.id).collect();
    assert_eq!(ids, expected);

    let none = commands::sample_batch(
        &state,
        SampleBatchParams {
            category_id: "c".to_string(),
            limit: None,
            tag: Some("dog".to_string()),
        },
    )
    .await
    .unwrap();
    assert!(none.is_empty());

    assert!(matches!(
        commands::sample_batch(
            &state,
            SampleBatchParams {
                category_id: "c".to_string(),
                limit: Some("lots".to_string()),
                tag: None,
            },
        )
        .await,
        Err(AppError::MissingField(_))
    ));
}

#[tokio::test]
async fn test_reconcile_removes_orphans() {
    let (state, _temp) = create_test_app().await;
    let category = commands::create_category(&state, "Animals".to_string(), image("animals.png"))
        .await
        .unwrap();

    let staged = state.blob_store.store(b"orphan").await.unwrap();
    let orphan = state.blob_store.finalize(staged, "orphan.png").await.unwrap();

    let report = state
        .reconciler
        .sweep_at(Utc::now() + Duration::days(1))
        .await
        .unwrap();

    assert_eq!(report.removed, 1);
    assert!(!state.blob_store.exists(&orphan).await.unwrap());
    assert!(state.blob_store.exists(&category.image_url).await.unwrap());
}
