//! Embedding generation for description text.
//!
//! The `Embedder` trait is the seam between the index and the embedding
//! engine. Production uses fastembed's local models; tests inject a
//! deterministic stand-in so nothing needs a model download.

use fastembed::{InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Default download timeout for model files (5 minutes)
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

/// Turns text into vectors. Implementations must be cheap to call
/// repeatedly; model loading happens at construction time.
pub trait Embedder: Send {
    /// Identifier for the model, hashed into the storage header so a stale
    /// vectors file from a different model is never reused.
    fn name(&self) -> &str;

    /// Embedding dimensions produced by this model.
    fn dimensions(&self) -> usize;

    /// Generate embeddings for a batch of texts, one vector per input.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Generate an embedding for a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let texts = [text.to_string()];
        self.embed_batch(&texts)?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    /// SHA256 of the model name, used as the storage model id.
    fn model_id_hash(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.name().as_bytes());
        hasher.finalize().into()
    }
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Create a new embedding model with the given name.
    ///
    /// The model is downloaded on first use if not cached. Models are cached
    /// in the `models/` subdirectory of `cache_dir`.
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        download_timeout: Option<Duration>,
    ) -> Result<Self, EmbeddingError> {
        let model_enum = Self::parse_model_name(model_name)?;
        let _timeout = download_timeout.unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT);

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let dimensions = Self::probe_dimensions(&mut model)?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    /// Parse model name string to fastembed enum.
    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "all-minilm-l6-v2-q" | "allminiml6v2q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
            "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-small-en-v1.5-q" | "bgesmallenv15q" => Ok(fastembed::EmbeddingModel::BGESmallENV15Q),
            "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-base-en-v1.5-q" | "bgebaseenv15q" => Ok(fastembed::EmbeddingModel::BGEBaseENV15Q),
            "bge-large-en-v1.5" | "bgelargeenv15" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
            "bge-large-en-v1.5-q" | "bgelargeenv15q" => Ok(fastembed::EmbeddingModel::BGELargeENV15Q),
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5 (add -q suffix for quantized)",
                name
            ))),
        }
    }

    /// Probe the model to determine embedding dimensions.
    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl Embedder for EmbeddingModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))
    }
}

/// Deterministic test embedders. Vectors project text onto a small fixed
/// vocabulary so similarity behaves predictably without any model files.
#[cfg(test)]
pub mod testing {
    use super::{Embedder, EmbeddingError};

    const VOCAB: [&str; 8] = [
        "red", "blue", "green", "car", "bike", "sunset", "beach", "mountain",
    ];

    /// Projects text onto a fixed keyword vocabulary. The last dimension is a
    /// constant bias so no input ever produces a zero-norm vector.
    pub struct KeywordEmbedder;

    impl Embedder for KeywordEmbedder {
        fn name(&self) -> &str {
            "keyword-test-embedder"
        }

        fn dimensions(&self) -> usize {
            VOCAB.len() + 1
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|text| {
                    let lowered = text.to_lowercase();
                    let mut v: Vec<f32> = VOCAB
                        .iter()
                        .map(|word| lowered.matches(word).count() as f32)
                        .collect();
                    v.push(1.0);
                    v
                })
                .collect())
        }
    }

    /// Always fails; used to force batch indexing failures.
    pub struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn name(&self) -> &str {
            "failing-test-embedder"
        }

        fn dimensions(&self) -> usize {
            9
        }

        fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::EmbeddingFailed(
                "injected failure".to_string(),
            ))
        }
    }
}
