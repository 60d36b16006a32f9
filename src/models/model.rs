//! Model definitions and traits
//!
//! [`EmbeddingModel`] is the only thing the HTTP layer knows about the model.
//! It is built once at start and shared read-only as an `Arc<dyn EmbeddingModel>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Embedding, EmbeddingResult};

/// Information about the loaded model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model name
    pub name: String,
    /// Embedding dimension
    pub dimension: usize,
    /// Maximum sequence length in tokens
    pub max_sequence_length: usize,
}

/// Core embedding model trait
///
/// Every returned vector has unit L2 norm and length `info().dimension`.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Get model information
    fn info(&self) -> &ModelInfo;

    /// Generate the embedding for a single text
    async fn embed_text(&self, text: &str) -> EmbeddingResult<Embedding>;

    /// Generate embeddings for a batch of texts, in input order
    ///
    /// An empty batch returns an empty result. One failing item fails the batch.
    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize {
        self.info().dimension
    }
}

/// ONNX-based embedding model implementation
pub mod onnx {
    use super::*;
    use crate::models::{EmbeddingError, ModelConfig};
    use crate::onnx::OnnxEmbeddingEngine;
    use std::sync::Arc;
    use tracing::info;

    /// ONNX embedding model
    ///
    /// Inference is CPU-bound and blocking, so it runs on tokio's blocking pool.
    #[derive(Debug, Clone)]
    pub struct OnnxEmbeddingModel {
        info: ModelInfo,
        engine: Arc<OnnxEmbeddingEngine>,
    }

    impl OnnxEmbeddingModel {
        /// Load the model described by `config`
        pub async fn load(config: &ModelConfig) -> EmbeddingResult<Self> {
            config.validate()?;

            let engine_config = config.clone();
            let engine = tokio::task::spawn_blocking(move || {
                OnnxEmbeddingEngine::new(&engine_config)
            })
            .await
            .map_err(|e| EmbeddingError::ModelLoadFailed {
                error: format!("Model loading task failed: {}", e),
            })??;

            let info = ModelInfo {
                name: config.name.clone(),
                dimension: engine.dimension(),
                max_sequence_length: engine.max_sequence_length(),
            };
            info!("✅ Model '{}' ready ({} dimensions)", info.name, info.dimension);

            Ok(Self {
                info,
                engine: Arc::new(engine),
            })
        }

        async fn encode(&self, texts: Vec<String>) -> EmbeddingResult<Vec<Embedding>> {
            let engine = Arc::clone(&self.engine);
            tokio::task::spawn_blocking(move || engine.encode(&texts))
                .await
                .map_err(|e| EmbeddingError::InferenceError {
                    model_name: self.info.name.clone(),
                    error: format!("Inference task failed: {}", e),
                })?
                .map_err(|e| EmbeddingError::InferenceError {
                    model_name: self.info.name.clone(),
                    error: e.to_string(),
                })
        }
    }

    #[async_trait]
    impl EmbeddingModel for OnnxEmbeddingModel {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        async fn embed_text(&self, text: &str) -> EmbeddingResult<Embedding> {
            self.encode(vec![text.to_string()])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| EmbeddingError::InferenceError {
                    model_name: self.info.name.clone(),
                    error: "No embedding returned".to_string(),
                })
        }

        async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            self.encode(texts.to_vec()).await
        }
    }

}
