//! Application context: the explicitly constructed object holding the
//! configured store, index engine, orchestrator and query service. Built once
//! at startup and handed to the dispatch layer. The layers below absorb their
//! own faults, so errors surfacing here are already summaries.

use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::descriptions::{DescriptionStore, ImageDescription};
use crate::index::IndexAdapter;
use crate::query::{QueryService, SearchOutcome};
use crate::sync::SyncOrchestrator;

/// Caller-facing summary of a sync run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SyncOutcome {
    /// Newly indexed and ledgered descriptions
    pub new_count: usize,
    /// Descriptions in the store at scan time
    pub total_count: usize,
}

/// Pipeline counters across the store, the ledger and the index.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Stats {
    pub total_in_store: usize,
    pub total_processed: usize,
    pub pending_count: usize,
    pub documents_in_index: usize,
}

pub struct App<S> {
    store: S,
    adapter: IndexAdapter,
    orchestrator: SyncOrchestrator<S>,
    query: QueryService,
}

impl<S: DescriptionStore + Clone> App<S> {
    pub fn new(store: S, adapter: IndexAdapter, base_path: PathBuf, pictures_dir: PathBuf) -> Self {
        let orchestrator = SyncOrchestrator::new(store.clone(), adapter.clone(), base_path);
        let query = QueryService::new(adapter.clone(), pictures_dir);

        Self {
            store,
            adapter,
            orchestrator,
            query,
        }
    }

    /// Synchronize the index with the description store.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let report = self.orchestrator.synchronize().await;

        if report.failed {
            bail!("synchronization made no progress; see logs for the cause");
        }

        Ok(SyncOutcome {
            new_count: report.indexed,
            total_count: report.attempted + report.skipped_existing,
        })
    }

    pub async fn stats(&self) -> Result<Stats> {
        let total_in_store = self.store.all_descriptions().await?.len();
        let total_processed = self.store.processed_ids().await?.len();
        let index_stats = self.adapter.stats().await;

        Ok(Stats {
            total_in_store,
            total_processed,
            pending_count: total_in_store.saturating_sub(total_processed),
            documents_in_index: index_stats.documents_count,
        })
    }

    /// Search indexed descriptions and resolve each hit to its artifact.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<SearchOutcome> {
        self.query.search_images(query, limit).await
    }

    /// Record a freshly captioned image. It enters the index on the next sync.
    pub async fn add(&self, name: &str, description: &str) -> Result<ImageDescription> {
        let record = self.store.add_description(name, description).await?;
        log::info!("Recorded description {} for {}", record.id, record.name);
        Ok(record)
    }

    /// Wipe the index collection. The ledger is left as-is, so processed
    /// counts no longer match the index until the operator resets it too.
    pub async fn clear_index(&self) -> Result<()> {
        if !self.adapter.clear().await {
            bail!("failed to clear the index collection");
        }

        let processed = self.store.processed_ids().await?.len();
        if processed > 0 {
            log::warn!(
                "Index cleared but the ledger still holds {} identities; \
                 they will not be re-indexed until the ledger is reset",
                processed
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::descriptions::testing::MemoryStore;
    use crate::index::embeddings::testing::KeywordEmbedder;
    use tempfile::TempDir;

    fn test_app(dir: &TempDir, store: MemoryStore) -> App<MemoryStore> {
        let config = IndexConfig {
            similarity_threshold: 0.0,
            ..IndexConfig::default()
        };
        let adapter =
            IndexAdapter::with_embedder(config, dir.path().to_path_buf(), Box::new(KeywordEmbedder));
        App::new(
            store,
            adapter,
            dir.path().to_path_buf(),
            dir.path().join("pictures"),
        )
    }

    #[tokio::test]
    async fn test_stats_reflect_pending_work() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        store.seed(1, "a.jpg", "a red car");
        store.seed(2, "b.jpg", "a blue bike");

        let app = test_app(&dir, store);

        let before = app.stats().await.unwrap();
        assert_eq!(before.total_in_store, 2);
        assert_eq!(before.total_processed, 0);
        assert_eq!(before.pending_count, 2);

        let outcome = app.sync().await.unwrap();
        assert_eq!(outcome.new_count, 2);
        assert_eq!(outcome.total_count, 2);

        let after = app.stats().await.unwrap();
        assert_eq!(after.total_processed, 2);
        assert_eq!(after.pending_count, 0);
        assert_eq!(after.documents_in_index, 2);
    }

    #[tokio::test]
    async fn test_add_is_visible_to_next_sync() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir, MemoryStore::new());

        app.add("c.jpg", "a green car").await.unwrap();
        let outcome = app.sync().await.unwrap();
        assert_eq!(outcome.new_count, 1);
    }

    #[tokio::test]
    async fn test_clear_empties_index_but_not_ledger() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        store.seed(1, "a.jpg", "a red car");

        let app = test_app(&dir, store.clone());
        app.sync().await.unwrap();
        app.clear_index().await.unwrap();

        let stats = app.stats().await.unwrap();
        assert_eq!(stats.documents_in_index, 0);
        assert_eq!(stats.total_processed, 1);
    }
}
