//! Layered configuration.
//!
//! Sources, lowest precedence first:
//! - Default values
//! - TOML configuration file (`.ragvault/settings.toml`, found by walking up
//!   from the current directory, or an explicit path)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `RV_` and use double underscores
//! to separate nested levels:
//! - `RV_CHUNKING__CHUNK_SIZE=256` sets `chunking.chunk_size`
//! - `RV_VECTOR__NPROBE=16` sets `vector.nprobe`
//! - `RV_INDEX_BASE=/data/index` sets `index_base`

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::content::{ContentKind, TextSplitter};
use crate::error::{RagError, RagResult};
use crate::vector::IvfParams;

/// Directory holding the configuration file.
pub const CONFIG_DIR: &str = ".ragvault";

/// Configuration file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding one subdirectory per session
    #[serde(default = "default_index_base")]
    pub index_base: PathBuf,

    /// Global debug mode
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub vector: VectorConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VectorConfig {
    /// Embedding dimension every partition is built with
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Inverted lists scanned per query
    #[serde(default = "default_nprobe")]
    pub nprobe: usize,

    /// Vector count at which a partition switches from exhaustive search
    #[serde(default = "default_train_threshold")]
    pub train_threshold: usize,

    /// Growth factor that triggers retraining
    #[serde(default = "default_retrain_growth")]
    pub retrain_growth: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RetrievalConfig {
    /// Partitions searched when preparing a prompt
    #[serde(default = "default_retrieval_kinds")]
    pub kinds: Vec<ContentKind>,

    /// Results requested per recent upload (at least one upload is assumed)
    #[serde(default = "default_top_k_per_upload")]
    pub top_k_per_upload: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// fastembed model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Where models are downloaded; defaults to the user cache directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct LlmConfig {
    /// Weights file of the chat model; its file stem names the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
}

fn default_version() -> u32 {
    1
}

fn default_index_base() -> PathBuf {
    PathBuf::from("index")
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_dimension() -> usize {
    crate::vector::VECTOR_DIMENSION_384
}

fn default_nprobe() -> usize {
    IvfParams::default().nprobe
}

fn default_train_threshold() -> usize {
    IvfParams::default().train_threshold
}

fn default_retrain_growth() -> f32 {
    IvfParams::default().retrain_growth
}

fn default_retrieval_kinds() -> Vec<ContentKind> {
    vec![ContentKind::Document, ContentKind::Image]
}

fn default_top_k_per_upload() -> usize {
    5
}

fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_base: default_index_base(),
            debug: false,
            chunking: ChunkingConfig::default(),
            vector: VectorConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            nprobe: default_nprobe(),
            train_threshold: default_train_threshold(),
            retrain_growth: default_retrain_growth(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            kinds: default_retrieval_kinds(),
            top_k_per_upload: default_top_k_per_upload(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            cache_dir: None,
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration using a specific file in place of the discovered one
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores
            // stay part of the field name
            .merge(Env::prefixed("RV_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Finds `.ragvault/settings.toml` in the current directory or an ancestor
    pub fn find_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Rejects values the index cannot work with.
    pub fn validate(&self) -> RagResult<()> {
        let fail = |reason: String| Err(RagError::Config { reason });

        if self.chunking.chunk_size == 0 {
            return fail("chunking.chunk_size must be positive".to_string());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return fail(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            ));
        }
        if self.vector.dimension == 0 {
            return fail("vector.dimension must be positive".to_string());
        }
        if self.vector.nprobe == 0 {
            return fail("vector.nprobe must be at least 1".to_string());
        }
        if self.vector.retrain_growth <= 1.0 {
            return fail(format!(
                "vector.retrain_growth ({}) must be greater than 1",
                self.vector.retrain_growth
            ));
        }
        if self.retrieval.top_k_per_upload == 0 {
            return fail("retrieval.top_k_per_upload must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn ivf_params(&self) -> IvfParams {
        IvfParams {
            nprobe: self.vector.nprobe,
            train_threshold: self.vector.train_threshold,
            retrain_growth: self.vector.retrain_growth,
        }
    }

    pub fn splitter(&self) -> TextSplitter {
        TextSplitter::new(self.chunking.chunk_size, self.chunking.chunk_overlap)
    }

    /// Directory for downloaded embedding models
    pub fn models_dir(&self) -> PathBuf {
        self.embedding.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ragvault")
                .join("models")
        })
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(dir: &Path, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = dir.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = r#"# ragvault configuration

# Version of the configuration schema
version = 1

# Directory holding one subdirectory per session
index_base = "index"

# Global debug mode
debug = false

[chunking]
# Maximum characters per chunk and characters shared between neighbours
chunk_size = 512
chunk_overlap = 200

[vector]
# Must match the embedding model
dimension = 384
# Inverted lists scanned per query once a partition is trained
nprobe = 8
# Vectors needed before a partition leaves exhaustive search
train_threshold = 256
# Retrain after the partition grows by this factor
retrain_growth = 2.0

[retrieval]
# Partitions searched when preparing a prompt
kinds = ["document", "image"]
# Results per recently uploaded item
top_k_per_upload = 5

[embedding]
model = "AllMiniLML6V2"
# cache_dir = "/path/to/models"

[llm]
# model_path = "models/assistant.gguf"
"#;

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }
}
