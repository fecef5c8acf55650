//! End-to-end pipeline tests: CSV store, sync orchestration, index and
//! query resolution wired together through the application context, with a
//! deterministic embedder standing in for the real model.

use tempfile::TempDir;

use crate::app::App;
use crate::config::IndexConfig;
use crate::descriptions::{CsvStore, DescriptionStore};
use crate::index::embeddings::testing::KeywordEmbedder;
use crate::index::IndexAdapter;
use crate::query::Delivery;

fn pipeline_app(dir: &TempDir) -> App<CsvStore> {
    let store = CsvStore::load(dir.path()).unwrap();
    let config = IndexConfig {
        similarity_threshold: 0.0,
        ..IndexConfig::default()
    };
    let adapter =
        IndexAdapter::with_embedder(config, dir.path().to_path_buf(), Box::new(KeywordEmbedder));

    let pictures_dir = dir.path().join("pictures");
    std::fs::create_dir_all(&pictures_dir).unwrap();

    App::new(store, adapter, dir.path().to_path_buf(), pictures_dir)
}

#[tokio::test]
async fn test_initial_sync_ledgers_every_description() {
    let dir = TempDir::new().unwrap();
    let app = pipeline_app(&dir);

    app.add("red_car.jpg", "a red car parked outside").await.unwrap();
    app.add("bike.jpg", "a blue bike leaning on a wall").await.unwrap();

    let outcome = app.sync().await.unwrap();
    assert_eq!(outcome.new_count, 2);
    assert_eq!(outcome.total_count, 2);

    let stats = app.stats().await.unwrap();
    assert_eq!(stats.total_in_store, 2);
    assert_eq!(stats.total_processed, 2);
    assert_eq!(stats.pending_count, 0);
    assert_eq!(stats.documents_in_index, 2);

    // The ledger, not the index, decides what counts as processed
    let store = CsvStore::load(dir.path()).unwrap();
    let processed = store.processed_ids().await.unwrap();
    assert!(processed.contains(&1));
    assert!(processed.contains(&2));
}

#[tokio::test]
async fn test_incremental_sync_picks_up_only_new_rows() {
    let dir = TempDir::new().unwrap();
    let app = pipeline_app(&dir);

    app.add("red_car.jpg", "a red car parked outside").await.unwrap();
    app.add("bike.jpg", "a blue bike leaning on a wall").await.unwrap();
    app.sync().await.unwrap();

    app.add("green_car.jpg", "a green car on the road").await.unwrap();

    let outcome = app.sync().await.unwrap();
    assert_eq!(outcome.new_count, 1);
    assert_eq!(outcome.total_count, 3);

    // Running again with nothing new is a no-op
    let repeat = app.sync().await.unwrap();
    assert_eq!(repeat.new_count, 0);
    assert_eq!(repeat.total_count, 3);
}

#[tokio::test]
async fn test_search_ranks_matching_descriptions_first() {
    let dir = TempDir::new().unwrap();
    let app = pipeline_app(&dir);

    app.add("red_car.jpg", "a red car parked outside").await.unwrap();
    app.add("bike.jpg", "a blue bike leaning on a wall").await.unwrap();
    app.add("green_car.jpg", "a green car on the road").await.unwrap();
    app.sync().await.unwrap();

    for name in ["red_car.jpg", "bike.jpg", "green_car.jpg"] {
        std::fs::write(dir.path().join("pictures").join(name), b"jpeg").unwrap();
    }

    let outcomes = app.search("car", 5).await;
    assert_eq!(outcomes.len(), 3);

    // Both car images outrank the bike; scores are descending
    assert!(outcomes[0].name.contains("car"));
    assert!(outcomes[1].name.contains("car"));
    assert_eq!(outcomes[2].name, "bike.jpg");
    assert!(outcomes[0].score >= outcomes[1].score);
    assert!(outcomes[1].score >= outcomes[2].score);

    for outcome in &outcomes {
        assert!(matches!(outcome.delivery, Delivery::Available { .. }));
    }

    let limited = app.search("car", 2).await;
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn test_index_survives_restart() {
    let dir = TempDir::new().unwrap();

    {
        let app = pipeline_app(&dir);
        app.add("red_car.jpg", "a red car parked outside").await.unwrap();
        app.sync().await.unwrap();
    }

    // A fresh context reloads the persisted index and ledger
    let app = pipeline_app(&dir);
    let stats = app.stats().await.unwrap();
    assert_eq!(stats.total_processed, 1);
    assert_eq!(stats.documents_in_index, 1);

    let outcome = app.sync().await.unwrap();
    assert_eq!(outcome.new_count, 0);

    let outcomes = app.search("red car", 5).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].name, "red_car.jpg");
}

#[tokio::test]
async fn test_clear_requires_resync_for_search() {
    let dir = TempDir::new().unwrap();
    let app = pipeline_app(&dir);

    app.add("red_car.jpg", "a red car parked outside").await.unwrap();
    app.sync().await.unwrap();
    app.clear_index().await.unwrap();

    assert!(app.search("red car", 5).await.is_empty());

    // The ledger still holds the identity, so sync finds nothing to do
    let outcome = app.sync().await.unwrap();
    assert_eq!(outcome.new_count, 0);

    let stats = app.stats().await.unwrap();
    assert_eq!(stats.documents_in_index, 0);
    assert_eq!(stats.total_processed, 1);
}
