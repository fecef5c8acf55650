//! Query-time retrieval: free-text search mapped to deliverable artifacts.
//!
//! Each index hit is resolved to the image file under the pictures directory.
//! A missing file is reported on that hit alone; the rest of the result set
//! is unaffected. Searching has no side effects on the index or the ledger.

use std::path::PathBuf;

use serde::Serialize;

use crate::index::IndexAdapter;

/// Default number of results when the caller does not ask for more.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Whether the artifact behind a hit could be located on disk.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Delivery {
    /// Artifact found; path is under the pictures directory
    Available { path: PathBuf },
    /// The index knows this description but the file is gone
    Missing,
}

/// One search result with its delivery outcome.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub score: f32,
    pub delivery: Delivery,
}

pub struct QueryService {
    adapter: IndexAdapter,
    pictures_dir: PathBuf,
}

impl QueryService {
    pub fn new(adapter: IndexAdapter, pictures_dir: PathBuf) -> Self {
        Self {
            adapter,
            pictures_dir,
        }
    }

    /// Search descriptions by free text and resolve each hit to its artifact.
    ///
    /// Callers validate queries before dispatching here, but a blank query is
    /// tolerated anyway and yields no results. Hits come back ordered by
    /// descending similarity, truncated to `limit`.
    pub async fn search_images(&self, query: &str, limit: usize) -> Vec<SearchOutcome> {
        if query.trim().is_empty() {
            return vec![];
        }

        let hits = self.adapter.search(query, limit).await;

        hits.into_iter()
            .map(|hit| {
                let path = self.pictures_dir.join(&hit.name);
                let delivery = if path.is_file() {
                    Delivery::Available { path }
                } else {
                    log::warn!("Artifact {} not found in {}", hit.name, self.pictures_dir.display());
                    Delivery::Missing
                };

                SearchOutcome {
                    id: hit.id,
                    name: hit.name,
                    description: hit.description,
                    score: hit.score,
                    delivery,
                }
            })
            .collect()
    }
}
