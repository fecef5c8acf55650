use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::index::chunk::{CHUNK_OVERLAP, CHUNK_SIZE};
use crate::index::{DEFAULT_MODEL, DEFAULT_THRESHOLD};

const CONFIG_FILE: &str = "config.yaml";

/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
/// Default directory (relative to the base path) holding the image files
const DEFAULT_PICTURES_DIR: &str = "pictures";

/// Configuration for the semantic index
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Similarity threshold below which hits are dropped [0.0, 1.0]
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f32,

    /// Chunk size in characters for long descriptions
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            similarity_threshold: DEFAULT_THRESHOLD,
            chunk_size: CHUNK_SIZE,
            chunk_overlap: CHUNK_OVERLAP,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_chunk_size() -> usize {
    CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    CHUNK_OVERLAP
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,

    /// Directory holding the image files, relative to the base path
    /// unless absolute
    #[serde(default = "default_pictures_dir")]
    pub pictures_dir: String,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            pictures_dir: DEFAULT_PICTURES_DIR.to_string(),
            base_path: String::new(),
        }
    }
}

fn default_pictures_dir() -> String {
    DEFAULT_PICTURES_DIR.to_string()
}

impl Config {
    fn validate(&self) {
        let index = &self.index;

        if !(0.0..=1.0).contains(&index.similarity_threshold) {
            panic!(
                "index.similarity_threshold must be between 0.0 and 1.0, got {}",
                index.similarity_threshold
            );
        }

        if index.chunk_size == 0 {
            panic!("index.chunk_size must be greater than 0");
        }

        if index.chunk_overlap >= index.chunk_size {
            panic!(
                "index.chunk_overlap ({}) must be smaller than index.chunk_size ({})",
                index.chunk_overlap, index.chunk_size
            );
        }

        if index.download_timeout_secs == 0 {
            panic!("index.download_timeout_secs must be greater than 0");
        }

        if self.pictures_dir.trim().is_empty() {
            panic!("pictures_dir must not be empty");
        }
    }

    pub fn load_with(base_path: &str) -> Self {
        let config_path = Path::new(base_path).join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            std::fs::create_dir_all(base_path).expect("cannot create base directory");
            std::fs::write(
                &config_path,
                serde_yml::to_string(&Self::default()).unwrap(),
            )
            .expect("cannot write default config");
        }

        let config_str =
            String::from_utf8(std::fs::read(&config_path).expect("cannot read config file"))
                .expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let config_path = Path::new(&self.base_path).join(CONFIG_FILE);
        let config_str = serde_yml::to_string(&self).unwrap();
        std::fs::write(config_path, config_str).expect("cannot write config file");
    }

    pub fn base_path(&self) -> &Path {
        Path::new(&self.base_path)
    }

    /// Absolute pictures directory; relative values resolve against the
    /// base path.
    pub fn pictures_path(&self) -> PathBuf {
        let dir = Path::new(&self.pictures_dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.base_path().join(dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.chunk_overlap, 32);
    }

    #[test]
    fn test_load_creates_default_config() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().to_str().unwrap();

        let config = Config::load_with(base);
        assert!(dir.path().join("config.yaml").exists());
        assert_eq!(config.pictures_dir, "pictures");
        assert_eq!(config.pictures_path(), dir.path().join("pictures"));
    }

    #[test]
    fn test_reload_preserves_edits() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().to_str().unwrap();

        Config::load_with(base);
        let yaml = std::fs::read_to_string(dir.path().join("config.yaml")).unwrap();
        let yaml = yaml.replace("pictures_dir: pictures", "pictures_dir: photos");
        std::fs::write(dir.path().join("config.yaml"), yaml).unwrap();

        let config = Config::load_with(base);
        assert_eq!(config.pictures_dir, "photos");
    }

    #[test]
    #[should_panic(expected = "chunk_overlap")]
    fn test_validate_rejects_overlap_ge_size() {
        let config = Config {
            index: IndexConfig {
                chunk_size: 32,
                chunk_overlap: 32,
                ..IndexConfig::default()
            },
            pictures_dir: "pictures".into(),
            base_path: String::new(),
        };
        config.validate();
    }
}
