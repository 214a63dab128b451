//! Configuration management for archivist
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Embedding configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Text refinement service configuration
    #[serde(default)]
    pub refiner: RefinerConfig,

    /// Ingestion pipeline configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum characters per chunk, including the overlap prefix
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap characters carried from the previous chunk
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

/// One configured embedding model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingModelConfig {
    /// Model key sent to the backend, also used to derive the vector table name
    pub key: String,

    /// Fixed output dimensionality of this model
    pub dimension: usize,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding backend URL
    #[serde(default = "default_embedding_backend_url")]
    pub backend_url: String,

    /// Configured models; each gets its own vector table
    #[serde(default = "default_embedding_models")]
    pub models: Vec<EmbeddingModelConfig>,

    /// Batch size when embedding on the accelerator
    #[serde(default = "default_accelerator_batch_size")]
    pub accelerator_batch_size: usize,

    /// Batch size when embedding on the general-purpose processor
    #[serde(default = "default_cpu_batch_size")]
    pub cpu_batch_size: usize,

    /// Chunk-count ceiling per model on the CPU; excess chunks are dropped
    #[serde(default = "default_cpu_chunk_cap")]
    pub cpu_chunk_cap: usize,

    /// Minimum free accelerator memory (MB) to use the accelerator at all
    #[serde(default = "default_min_free_memory_mb")]
    pub min_free_memory_mb: u64,
}

fn default_embedding_models() -> Vec<EmbeddingModelConfig> {
    vec![EmbeddingModelConfig {
        key: default_embedding_model(),
        dimension: default_embedding_dimension(),
    }]
}

/// Text refinement service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinerConfig {
    /// Refiner endpoint URL
    #[serde(default = "default_refiner_url")]
    pub url: String,

    /// Hard wall-clock timeout for a single refine call
    #[serde(default = "default_refiner_timeout_secs")]
    pub timeout_secs: u64,

    /// Target language; refined output in another language is suspect
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Minimum characters of content for foreign-language output to pass
    #[serde(default = "default_quality_min_chars")]
    pub quality_min_chars: usize,

    /// Template phrases that mark degenerate refinement output.
    /// Configurable policy rather than a fixed list.
    #[serde(default = "default_template_phrases")]
    pub template_phrases: Vec<String>,
}

/// Ingestion pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Bounded worker pool size; independent files run concurrently up to this
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Files larger than this are rejected before any side effect
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Delete existing embedding rows for a blob before re-inserting
    #[serde(default)]
    pub overwrite_embeddings: bool,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for archivist data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to the SQLite database
    pub db_file: PathBuf,

    /// Path to the persisted OCR settings document
    pub ocr_settings_file: PathBuf,

    /// Path to the persisted OCR presets document
    pub ocr_presets_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            embedding: EmbeddingConfig::default(),
            refiner: RefinerConfig::default(),
            ingest: IngestConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend_url: default_embedding_backend_url(),
            models: default_embedding_models(),
            accelerator_batch_size: default_accelerator_batch_size(),
            cpu_batch_size: default_cpu_batch_size(),
            cpu_chunk_cap: default_cpu_chunk_cap(),
            min_free_memory_mb: default_min_free_memory_mb(),
        }
    }
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            url: default_refiner_url(),
            timeout_secs: default_refiner_timeout_secs(),
            target_language: default_target_language(),
            quality_min_chars: default_quality_min_chars(),
            template_phrases: default_template_phrases(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            max_file_bytes: default_max_file_bytes(),
            overwrite_embeddings: false,
        }
    }
}

impl Config {
    /// Get the default base directory for archivist (~/.archivist)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".archivist")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("archive.db"),
            ocr_settings_file: base.join("ocr_settings.json"),
            ocr_presets_file: base.join("ocr_presets.json"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.init_paths(Some(base));
        config.paths.config_file = config_path.to_path_buf();

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk.chunk_size <= self.chunk.overlap {
            return Err(Error::Config(
                "chunk.chunk_size must be > chunk.overlap".to_string(),
            ));
        }

        if self.embedding.models.is_empty() {
            return Err(Error::Config(
                "embedding.models must list at least one model".to_string(),
            ));
        }

        if let Some(model) = self.embedding.models.iter().find(|m| m.dimension == 0) {
            return Err(Error::Config(format!(
                "embedding model '{}' has dimension 0",
                model.key
            )));
        }

        if self.ingest.pool_size == 0 {
            return Err(Error::Config(
                "ingest.pool_size must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Look up a configured embedding model by key
    pub fn embedding_model(&self, key: &str) -> Option<&EmbeddingModelConfig> {
        self.embedding.models.iter().find(|m| m.key == key)
    }
}
