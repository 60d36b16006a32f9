//! Configuration for the embedding model
//!
//! Maps the `[embedding]` section of `config.toml`.

use serde::{Deserialize, Serialize};

use crate::models::EmbeddingError;

/// Settings for the single model served by this process
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model name reported by `/health` and `/`
    pub name: String,

    /// ONNX export of the sentence transformer
    pub model_path: String,
    /// HuggingFace `tokenizer.json`
    pub tokenizer_path: String,

    /// Inputs longer than this many tokens are truncated
    pub max_sequence_length: usize,
    /// Number of texts fed to one inference run
    pub batch_size: usize,
    /// Intra-op threads for ONNX Runtime
    pub num_threads: usize,

    /// Path to the onnxruntime shared library (only used with `load-dynamic`)
    pub onnx_runtime_path: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "all-MiniLM-L6-v2".to_string(),
            model_path: "models/all-MiniLM-L6-v2/model.onnx".to_string(),
            tokenizer_path: "models/all-MiniLM-L6-v2/tokenizer.json".to_string(),
            max_sequence_length: 256,
            batch_size: 32,
            num_threads: 4,
            onnx_runtime_path: None,
        }
    }
}

/// Environment variable ort reads the shared library location from
pub const ORT_DYLIB_ENV: &str = "ORT_DYLIB_PATH";

impl ModelConfig {
    /// Environment assignment pointing ort at `onnx_runtime_path`, if set
    ///
    /// Must be applied before any thread is spawned; `main` does this ahead
    /// of building the tokio runtime.
    pub fn onnx_runtime_env(&self) -> Option<(&'static str, &str)> {
        self.onnx_runtime_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(|path| (ORT_DYLIB_ENV, path))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.name.trim().is_empty() {
            return Err(EmbeddingError::ConfigError {
                message: "Model name cannot be empty".to_string(),
            });
        }

        if self.max_sequence_length == 0 {
            return Err(EmbeddingError::ConfigError {
                message: format!("max_sequence_length must be positive for '{}'", self.name),
            });
        }

        if self.batch_size == 0 {
            return Err(EmbeddingError::ConfigError {
                message: format!("batch_size must be positive for '{}'", self.name),
            });
        }

        if self.num_threads == 0 {
            return Err(EmbeddingError::ConfigError {
                message: format!("num_threads must be positive for '{}'", self.name),
            });
        }

        Ok(())
    }
}
