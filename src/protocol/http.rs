//! HTTP REST API Protocol
//!
//! - `POST /embed`        `{"text": "..."}`         → `{"embedding": [...]}`
//! - `POST /embed_batch`  `{"texts": ["...", ...]}` → `{"embeddings": [[...], ...]}`
//!
//! Errors are `{"error": "...", "code": "...", "details": "..."}`.

use serde::{Deserialize, Serialize};

use crate::models::Embedding;
use crate::protocol::validation::ValidationError;

/// Single embedding request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedRequest {
    /// Text to embed; may be empty
    pub text: String,
}

/// Batch embedding request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedBatchRequest {
    /// Texts to embed, output follows the same order
    pub texts: Vec<String>,
}

/// Single embedding response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    /// The embedding vector
    pub embedding: Embedding,
}

impl EmbedResponse {
    pub fn new(embedding: Embedding) -> Self {
        Self { embedding }
    }
}

/// Batch embedding response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedBatchResponse {
    /// One vector per input text
    pub embeddings: Vec<Embedding>,
}

impl EmbedBatchResponse {
    pub fn new(embeddings: Vec<Embedding>) -> Self {
        Self { embeddings }
    }
}

/// HTTP Error Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpErrorResponse {
    /// Error message
    pub error: String,

    /// Error code (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Additional details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HttpErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            details: None,
        }
    }

    /// Create error with code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Create error with details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Request body failed the schema check
    pub fn validation(error: &ValidationError) -> Self {
        let response = Self::new(error.to_string()).with_code(error.code());
        match error.location() {
            Some(location) => response.with_details(location),
            None => response,
        }
    }

    /// Request body could not be read
    pub fn unreadable_body(details: impl Into<String>) -> Self {
        Self::new("Failed to read request body")
            .with_code("BAD_REQUEST")
            .with_details(details)
    }

    /// Create not found error
    pub fn not_found() -> Self {
        Self::new("Not Found").with_code("NOT_FOUND")
    }

    /// Known path, unsupported method
    pub fn method_not_allowed(method: &str, allowed: &str) -> Self {
        Self::new("Method Not Allowed")
            .with_code("METHOD_NOT_ALLOWED")
            .with_details(format!("{} is not supported here; use {}", method, allowed))
    }

    /// Create internal error
    pub fn internal_error(details: impl Into<String>) -> Self {
        Self {
            error: "Internal server error occurred during embedding generation".to_string(),
            code: Some("INTERNAL_ERROR".to_string()),
            details: Some(details.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub version: String,
    pub embedding_dimension: usize,
}

impl HealthResponse {
    pub fn healthy(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            status: "healthy".to_string(),
            model: model.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            embedding_dimension: dimension,
        }
    }
}
