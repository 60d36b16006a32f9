//! Embedding Service Library
//!
//! HTTP service serving sentence embeddings from a pretrained ONNX model

pub mod models;
pub mod onnx;
pub mod protocol;
pub mod server;

// Re-exports
pub use models::model::onnx::OnnxEmbeddingModel;
pub use models::{Embedding, EmbeddingError, EmbeddingModel, ModelConfig, ModelInfo};
pub use protocol::{EmbedBatchRequest, EmbedBatchResponse, EmbedRequest, EmbedResponse};
pub use server::{EmbeddingServer, ServerConfig};
