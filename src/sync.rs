//! Sync orchestration between the description store and the semantic index.
//!
//! Each run computes the delta (descriptions whose identity is absent from
//! the processed ledger), pushes the whole delta through the index adapter in
//! one batch, and only after that batch succeeds commits one ledger row per
//! delta item. An identity is therefore never marked processed without having
//! been part of a successful batch; a crash between batch success and ledger
//! commit only causes a duplicate-safe re-index on the next run.

use std::path::PathBuf;

use serde::Serialize;

use crate::descriptions::{DescriptionStore, ImageDescription};
use crate::index::{DocumentInput, IndexAdapter};
use crate::lock::SyncLock;

/// Outcome of one synchronize() run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyncReport {
    /// Size of the computed delta
    pub attempted: usize,
    /// Delta items indexed and committed to the ledger
    pub indexed: usize,
    /// Descriptions already in the ledger, left untouched
    pub skipped_existing: usize,
    /// True when the run made no progress (store read failure, lock
    /// contention, or batch indexing failure)
    pub failed: bool,
}

impl SyncReport {
    fn failure() -> Self {
        Self {
            failed: true,
            ..Self::default()
        }
    }
}

pub struct SyncOrchestrator<S> {
    store: S,
    adapter: IndexAdapter,
    base_path: PathBuf,
}

impl<S: DescriptionStore> SyncOrchestrator<S> {
    pub fn new(store: S, adapter: IndexAdapter, base_path: PathBuf) -> Self {
        Self {
            store,
            adapter,
            base_path,
        }
    }

    /// Push every un-ledgered description into the index.
    ///
    /// Single-flight: a concurrent run is rejected immediately rather than
    /// queued. All failures are absorbed into the report.
    pub async fn synchronize(&self) -> SyncReport {
        let _guard = match SyncLock::try_acquire(&self.base_path) {
            Ok(guard) => guard,
            Err(e) => {
                log::warn!("Synchronization rejected: {}", e);
                return SyncReport::failure();
            }
        };

        let all_descriptions = match self.store.all_descriptions().await {
            Ok(descriptions) => descriptions,
            Err(e) => {
                log::error!("Failed to read descriptions: {}", e);
                return SyncReport::failure();
            }
        };

        let processed = match self.store.processed_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                log::error!("Failed to read processed ledger: {}", e);
                return SyncReport::failure();
            }
        };

        // Set-based diff by identity; ordering is irrelevant
        let delta: Vec<&ImageDescription> = all_descriptions
            .iter()
            .filter(|desc| !processed.contains(&desc.id))
            .collect();
        let skipped_existing = all_descriptions.len() - delta.len();

        if delta.is_empty() {
            log::info!("Nothing to synchronize, {} already indexed", skipped_existing);
            return SyncReport {
                attempted: 0,
                indexed: 0,
                skipped_existing,
                failed: false,
            };
        }

        log::info!("Found {} new descriptions to index", delta.len());

        // One batch for the whole delta; the adapter reports success or
        // failure, never partial completion
        let documents: Vec<DocumentInput> = delta
            .iter()
            .map(|desc| DocumentInput {
                id: desc.id,
                name: desc.name.clone(),
                description: desc.description.clone(),
            })
            .collect();

        if !self.adapter.index_batch(documents).await {
            log::error!("Batch indexing failed, nothing committed to the ledger");
            return SyncReport {
                attempted: delta.len(),
                indexed: 0,
                skipped_existing,
                failed: true,
            };
        }

        // Ledger commits are per item: a failed commit leaves that identity
        // un-ledgered and it is retried on the next run
        let mut indexed = 0;
        for desc in &delta {
            match self.store.add_processed(desc).await {
                Ok(()) => indexed += 1,
                Err(e) => {
                    log::error!("Failed to ledger identity {}: {}", desc.id, e);
                }
            }
        }

        log::info!(
            "Synchronization complete: {} of {} committed",
            indexed,
            delta.len()
        );

        SyncReport {
            attempted: delta.len(),
            indexed,
            skipped_existing,
            failed: false,
        }
    }
}
