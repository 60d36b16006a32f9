//! ONNX Embedder Module
//!
//! Tokenization, inference, pooling and normalization on ONNX Runtime

pub mod onnx_engine;
pub use onnx_engine::OnnxEmbeddingEngine;
