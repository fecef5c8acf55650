//! In-memory document index with cosine similarity search.
//!
//! One entry per description identity. An entry carries the name, the full
//! description text and the embeddings of its chunks; a document scores as
//! well as its best-matching chunk. Inserting an identity that is already
//! present replaces the whole entry, so re-indexing never duplicates.

use std::collections::HashMap;

/// An indexed document: the description text plus its chunk embeddings.
#[derive(Debug, Clone)]
pub struct DocumentEntry {
    /// Artifact file name (e.g. "red_car.jpg")
    pub name: String,
    /// Full description text
    pub description: String,
    /// One embedding per chunk, all with the index dimensions
    pub chunks: Vec<Vec<f32>>,
}

/// A scored match from the index.
#[derive(Debug, Clone)]
pub struct ScoredDoc {
    /// Description identity
    pub id: u64,
    /// Best chunk cosine similarity (0.0 to 1.0)
    pub score: f32,
}

/// In-memory index of description documents keyed by identity.
pub struct DocumentIndex {
    entries: HashMap<u64, DocumentEntry>,
    /// Expected embedding dimensions
    dimensions: usize,
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store or search with zero-norm vector")]
    ZeroNormVector,

    #[error("Document has no chunks")]
    EmptyDocument,
}

impl DocumentIndex {
    /// Create a new empty index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: HashMap::new(),
            dimensions,
        }
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of indexed documents (identities, not chunks).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: u64) -> Option<&DocumentEntry> {
        self.entries.get(&id)
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &DocumentEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Insert or replace the document for an identity.
    ///
    /// Upsert semantics: any existing entry for `id` is replaced wholesale,
    /// including all its chunks. Rejects empty documents, dimension
    /// mismatches and zero-norm chunk vectors.
    pub fn upsert(
        &mut self,
        id: u64,
        name: String,
        description: String,
        chunks: Vec<Vec<f32>>,
    ) -> Result<(), IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyDocument);
        }

        for chunk in &chunks {
            if chunk.len() != self.dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimensions,
                    got: chunk.len(),
                });
            }
            if l2_norm(chunk) < f32::EPSILON {
                return Err(IndexError::ZeroNormVector);
            }
        }

        self.entries.insert(
            id,
            DocumentEntry {
                name,
                description,
                chunks,
            },
        );

        Ok(())
    }

    /// Search for similar documents using cosine similarity.
    ///
    /// A document's score is the maximum similarity over its chunks. Results
    /// are sorted by score descending and truncated to `limit`; documents
    /// below `threshold` are dropped.
    pub fn search(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredDoc>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let query_norm = l2_norm(query);
        if query_norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        let mut results: Vec<ScoredDoc> = self
            .entries
            .iter()
            .filter_map(|(id, entry)| {
                let score = entry
                    .chunks
                    .iter()
                    .map(|chunk| cosine_similarity(query, chunk, query_norm))
                    .fold(f32::NEG_INFINITY, f32::max);
                if score >= threshold {
                    Some(ScoredDoc { id: *id, score })
                } else {
                    None
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        Ok(results)
    }

    /// Bulk load entries, used when loading from storage.
    pub fn bulk_load(
        &mut self,
        entries: Vec<(u64, String, String, Vec<Vec<f32>>)>,
    ) -> Result<(), IndexError> {
        for (id, name, description, chunks) in entries {
            self.upsert(id, name, description, chunks)?;
        }
        Ok(())
    }

    /// Drop every document from the index.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity with a precomputed query norm.
fn cosine_similarity(query: &[f32], target: &[f32], query_norm: f32) -> f32 {
    let target_norm = l2_norm(target);
    if target_norm < f32::EPSILON {
        return 0.0;
    }

    let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
    dot_product / (query_norm * target_norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(v: Vec<f32>) -> Vec<Vec<f32>> {
        vec![v]
    }

    #[test]
    fn test_new_index() {
        let index = DocumentIndex::new(3);
        assert_eq!(index.dimensions(), 3);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_upsert_and_get() {
        let mut index = DocumentIndex::new(3);
        index
            .upsert(1, "a.jpg".into(), "a red car".into(), doc(vec![1.0, 0.0, 0.0]))
            .unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.contains(1));

        let entry = index.get(1).unwrap();
        assert_eq!(entry.name, "a.jpg");
        assert_eq!(entry.description, "a red car");
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let mut index = DocumentIndex::new(3);
        index
            .upsert(
                1,
                "a.jpg".into(),
                "old text".into(),
                vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
            )
            .unwrap();
        index
            .upsert(1, "a.jpg".into(), "new text".into(), doc(vec![0.0, 0.0, 1.0]))
            .unwrap();

        // Still exactly one document, carrying the latest text and chunks
        assert_eq!(index.len(), 1);
        let entry = index.get(1).unwrap();
        assert_eq!(entry.description, "new text");
        assert_eq!(entry.chunks.len(), 1);
    }

    #[test]
    fn test_upsert_dimension_mismatch() {
        let mut index = DocumentIndex::new(3);
        let result = index.upsert(1, "a".into(), "b".into(), doc(vec![1.0, 0.0, 0.0, 0.0]));
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_upsert_zero_norm_rejected() {
        let mut index = DocumentIndex::new(3);
        let result = index.upsert(1, "a".into(), "b".into(), doc(vec![0.0, 0.0, 0.0]));
        assert!(matches!(result, Err(IndexError::ZeroNormVector)));
    }

    #[test]
    fn test_upsert_empty_document_rejected() {
        let mut index = DocumentIndex::new(3);
        let result = index.upsert(1, "a".into(), "b".into(), vec![]);
        assert!(matches!(result, Err(IndexError::EmptyDocument)));
    }

    #[test]
    fn test_search_orders_by_score() {
        let mut index = DocumentIndex::new(3);
        index
            .upsert(1, "a".into(), "x".into(), doc(vec![1.0, 0.0, 0.0]))
            .unwrap();
        index
            .upsert(2, "b".into(), "y".into(), doc(vec![0.0, 1.0, 0.0]))
            .unwrap();

        let results = index.search(&[1.0, 0.1, 0.0], 0.0, 10).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 1);
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_search_scores_best_chunk() {
        let mut index = DocumentIndex::new(3);
        // Second chunk matches the query exactly
        index
            .upsert(
                1,
                "a".into(),
                "x".into(),
                vec![vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0]],
            )
            .unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 0.0, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_search_with_threshold() {
        let mut index = DocumentIndex::new(3);
        index
            .upsert(1, "a".into(), "x".into(), doc(vec![1.0, 0.0, 0.0]))
            .unwrap();
        index
            .upsert(2, "b".into(), "y".into(), doc(vec![0.0, 1.0, 0.0]))
            .unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 0.9, 10).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 1);
    }

    #[test]
    fn test_search_with_limit() {
        let mut index = DocumentIndex::new(3);
        for i in 0..10 {
            index
                .upsert(
                    i,
                    format!("{i}.jpg"),
                    "x".into(),
                    doc(vec![1.0, i as f32 * 0.1, 0.0]),
                )
                .unwrap();
        }

        let results = index.search(&[1.0, 0.0, 0.0], 0.0, 3).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_search_empty_index_returns_nothing() {
        let index = DocumentIndex::new(3);
        let results = index.search(&[1.0, 0.0, 0.0], 0.0, 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_zero_norm_query_rejected() {
        let index = DocumentIndex::new(3);
        let result = index.search(&[0.0, 0.0, 0.0], 0.0, 10);
        assert!(matches!(result, Err(IndexError::ZeroNormVector)));
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut index = DocumentIndex::new(3);
        index
            .upsert(1, "a".into(), "x".into(), doc(vec![1.0, 0.0, 0.0]))
            .unwrap();
        index
            .upsert(2, "b".into(), "y".into(), doc(vec![0.0, 1.0, 0.0]))
            .unwrap();

        index.clear();
        assert!(index.is_empty());
        assert!(!index.contains(1));
    }

    #[test]
    fn test_bulk_load() {
        let mut index = DocumentIndex::new(3);
        let entries = vec![
            (1, "a".to_string(), "x".to_string(), doc(vec![1.0, 0.0, 0.0])),
            (2, "b".to_string(), "y".to_string(), doc(vec![0.0, 1.0, 0.0])),
        ];

        index.bulk_load(entries).unwrap();
        assert_eq!(index.len(), 2);
    }
}
