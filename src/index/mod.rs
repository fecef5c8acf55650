//! Semantic index for image descriptions.
//!
//! # Architecture
//!
//! - `embeddings`: the `Embedder` seam and its fastembed implementation
//! - `chunk`: overlapping description chunking before embedding
//! - `vector`: in-memory per-identity document index with cosine search
//! - `storage`: binary vectors.bin persistence
//! - `adapter`: the `IndexAdapter` boundary the pipeline talks to

pub mod adapter;
pub mod chunk;
pub mod embeddings;
mod storage;
mod vector;

pub use adapter::{DocumentInput, IndexAdapter, IndexHit, IndexStats};

/// Default embedding model name (bge-base offers +13% accuracy vs MiniLM)
pub const DEFAULT_MODEL: &str = "bge-base-en-v1.5";

/// Default similarity threshold below which hits are dropped
pub const DEFAULT_THRESHOLD: f32 = 0.35;

/// Collection file name under the base directory
pub const VECTORS_FILE: &str = "vectors.bin";
