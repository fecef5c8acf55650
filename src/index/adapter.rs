//! Index adapter wrapping the embedding engine and document index.
//!
//! This is the boundary the rest of the pipeline talks to:
//! - `index_batch`: embed and upsert a batch of descriptions, persist on success
//! - `search`: top-K retrieval by query text
//! - `stats`: collection document count
//! - `clear`: wipe the collection
//!
//! Failure policy: engine-level faults (model errors, storage corruption,
//! malformed input) are caught here, logged, and surfaced as `false` or an
//! empty result. Callers treat any adapter failure as "no progress made",
//! never as partial completion.
//!
//! The embedding engine is synchronous and CPU heavy, so every operation runs
//! on the blocking thread pool; async callers observe a single suspend point.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::config::IndexConfig;
use crate::index::chunk::chunk_with;
use crate::index::embeddings::{Embedder, EmbeddingError, EmbeddingModel};
use crate::index::storage::{VectorStorage, VectorStorageError};
use crate::index::vector::{DocumentIndex, IndexError};
use crate::index::VECTORS_FILE;

/// One description to be indexed.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub id: u64,
    pub name: String,
    pub description: String,
}

/// A retrieval hit mapped back to its description.
#[derive(Debug, Clone, Serialize)]
pub struct IndexHit {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub score: f32,
}

/// Collection statistics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IndexStats {
    pub documents_count: usize,
}

#[derive(Debug, thiserror::Error)]
enum AdapterError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Loaded engine components.
struct EngineState {
    embedder: Box<dyn Embedder>,
    index: DocumentIndex,
    storage: VectorStorage,
}

enum AdapterState {
    /// Embedder will be built from config on first use.
    Uninit,
    /// Embedder injected up front, index not yet loaded.
    #[allow(dead_code)]
    Seeded(Box<dyn Embedder>),
    Ready(EngineState),
}

struct Inner {
    config: IndexConfig,
    base_path: PathBuf,
    /// Lazily-initialized engine. Uses Mutex<AdapterState> instead of OnceLock
    /// because get_or_try_init is unstable.
    state: Mutex<AdapterState>,
}

/// Cloneable handle to the index engine.
#[derive(Clone)]
pub struct IndexAdapter {
    inner: Arc<Inner>,
}

impl IndexAdapter {
    /// Create an adapter that lazily loads the configured fastembed model and
    /// the persisted collection under `base_path` on first use.
    pub fn new(config: IndexConfig, base_path: PathBuf) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                base_path,
                state: Mutex::new(AdapterState::Uninit),
            }),
        }
    }

    /// Create an adapter with a pre-built embedding engine.
    #[cfg(test)]
    pub fn with_embedder(
        config: IndexConfig,
        base_path: PathBuf,
        embedder: Box<dyn Embedder>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                base_path,
                state: Mutex::new(AdapterState::Seeded(embedder)),
            }),
        }
    }

    /// Index a batch of descriptions.
    ///
    /// Returns `true` only if every document was embedded, upserted and the
    /// collection persisted. An empty batch returns `false` so callers never
    /// ledger anything for a no-op. Re-indexing an identity overwrites its
    /// previous document.
    pub async fn index_batch(&self, documents: Vec<DocumentInput>) -> bool {
        let inner = self.inner.clone();
        let joined =
            tokio::task::spawn_blocking(move || inner.index_batch_blocking(&documents)).await;

        match joined {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => {
                log::error!("Batch indexing failed: {}", e);
                false
            }
            Err(e) => {
                log::error!("Indexing task failed: {}", e);
                false
            }
        }
    }

    /// Retrieve up to `limit` documents by similarity to `query`,
    /// highest-scoring first. Blank queries, an empty collection and engine
    /// faults all yield an empty result.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<IndexHit> {
        let inner = self.inner.clone();
        let query = query.to_string();
        let joined =
            tokio::task::spawn_blocking(move || inner.search_blocking(&query, limit)).await;

        match joined {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                log::error!("Search failed: {}", e);
                vec![]
            }
            Err(e) => {
                log::error!("Search task failed: {}", e);
                vec![]
            }
        }
    }

    /// Collection statistics. Returns a zero count on engine failure.
    pub async fn stats(&self) -> IndexStats {
        let inner = self.inner.clone();
        let joined = tokio::task::spawn_blocking(move || inner.stats_blocking()).await;

        match joined {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => {
                log::error!("Failed to read index stats: {}", e);
                IndexStats::default()
            }
            Err(e) => {
                log::error!("Stats task failed: {}", e);
                IndexStats::default()
            }
        }
    }

    /// Delete every indexed document and persist the empty collection.
    ///
    /// Does not touch the processed ledger: after a clear, the ledger still
    /// claims these identities are indexed until the operator resets it too.
    pub async fn clear(&self) -> bool {
        let inner = self.inner.clone();
        let joined = tokio::task::spawn_blocking(move || inner.clear_blocking()).await;

        match joined {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::error!("Failed to clear index: {}", e);
                false
            }
            Err(e) => {
                log::error!("Clear task failed: {}", e);
                false
            }
        }
    }
}

impl Inner {
    fn index_batch_blocking(&self, documents: &[DocumentInput]) -> Result<bool, AdapterError> {
        if documents.is_empty() {
            log::warn!("index_batch called with no documents");
            return Ok(false);
        }

        let mut guard = self.lock_state()?;
        let engine = self.ensure_initialized(&mut guard)?;

        for doc in documents {
            let chunks = chunk_with(
                &doc.description,
                self.config.chunk_size,
                self.config.chunk_overlap,
            );
            if chunks.is_empty() {
                log::warn!("Skipping document {} with blank description", doc.id);
                continue;
            }

            let embeddings = engine.embedder.embed_batch(&chunks)?;
            engine
                .index
                .upsert(doc.id, doc.name.clone(), doc.description.clone(), embeddings)?;
        }

        let model_id = engine.embedder.model_id_hash();
        engine.storage.save(&engine.index, &model_id)?;

        log::info!(
            "Indexed {} documents, collection now holds {}",
            documents.len(),
            engine.index.len()
        );

        Ok(true)
    }

    fn search_blocking(&self, query: &str, limit: usize) -> Result<Vec<IndexHit>, AdapterError> {
        if query.trim().is_empty() {
            return Ok(vec![]);
        }

        let mut guard = self.lock_state()?;
        let engine = self.ensure_initialized(&mut guard)?;

        if engine.index.is_empty() {
            return Ok(vec![]);
        }

        let query_embedding = engine.embedder.embed(query)?;
        let scored = engine.index.search(
            &query_embedding,
            self.config.similarity_threshold,
            limit,
        )?;

        let hits = scored
            .into_iter()
            .filter_map(|doc| {
                engine.index.get(doc.id).map(|entry| IndexHit {
                    id: doc.id,
                    name: entry.name.clone(),
                    description: entry.description.clone(),
                    score: doc.score,
                })
            })
            .collect();

        Ok(hits)
    }

    fn stats_blocking(&self) -> Result<IndexStats, AdapterError> {
        let mut guard = self.lock_state()?;
        let engine = self.ensure_initialized(&mut guard)?;

        Ok(IndexStats {
            documents_count: engine.index.len(),
        })
    }

    fn clear_blocking(&self) -> Result<(), AdapterError> {
        let mut guard = self.lock_state()?;
        let engine = self.ensure_initialized(&mut guard)?;

        engine.index.clear();
        let model_id = engine.embedder.model_id_hash();
        engine.storage.save(&engine.index, &model_id)?;

        log::info!("Index collection cleared");
        Ok(())
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, AdapterState>, AdapterError> {
        self.state
            .lock()
            .map_err(|e| AdapterError::Internal(format!("Lock poisoned: {}", e)))
    }

    /// Initialize the engine if needed, returning the ready state.
    fn ensure_initialized<'a>(
        &self,
        guard: &'a mut AdapterState,
    ) -> Result<&'a mut EngineState, AdapterError> {
        if !matches!(guard, AdapterState::Ready(_)) {
            let prev = std::mem::replace(guard, AdapterState::Uninit);
            let embedder: Box<dyn Embedder> = match prev {
                AdapterState::Seeded(embedder) => embedder,
                _ => {
                    log::info!("Initializing embedding model '{}'", self.config.model);
                    let timeout = Duration::from_secs(self.config.download_timeout_secs);
                    Box::new(EmbeddingModel::new(
                        &self.config.model,
                        self.base_path.clone(),
                        Some(timeout),
                    )?)
                }
            };
            let engine = self.load_engine(embedder)?;
            *guard = AdapterState::Ready(engine);
        }

        match guard {
            AdapterState::Ready(engine) => Ok(engine),
            _ => Err(AdapterError::Internal("engine init did not settle".into())),
        }
    }

    /// Load the persisted collection or start fresh.
    fn load_engine(&self, embedder: Box<dyn Embedder>) -> Result<EngineState, AdapterError> {
        let model_id = embedder.model_id_hash();
        let dimensions = embedder.dimensions();

        let vectors_path = self.base_path.join(VECTORS_FILE);
        let storage = VectorStorage::new(vectors_path);

        let index = if storage.exists() {
            match storage.load(&model_id, dimensions) {
                Ok(idx) => {
                    log::info!("Loaded {} documents from storage", idx.len());
                    idx
                }
                Err(VectorStorageError::ModelMismatch) => {
                    log::warn!("Model changed, creating fresh collection");
                    DocumentIndex::new(dimensions)
                }
                Err(VectorStorageError::VersionMismatch(file_ver, _)) => {
                    log::warn!(
                        "Storage version {} unsupported, creating fresh collection",
                        file_ver
                    );
                    DocumentIndex::new(dimensions)
                }
                Err(e) => {
                    log::error!("Failed to load collection: {}", e);
                    return Err(e.into());
                }
            }
        } else {
            log::info!("No existing collection, starting fresh");
            DocumentIndex::new(dimensions)
        };

        Ok(EngineState {
            embedder,
            index,
            storage,
        })
    }
}
