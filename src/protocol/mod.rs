//! Wire protocol for the embedding endpoints
//!
//! JSON request/response types plus the explicit schema check run on every
//! request body before it reaches the model.

pub mod http;
pub mod validation;

pub use http::{
    EmbedBatchRequest, EmbedBatchResponse, EmbedRequest, EmbedResponse, HealthResponse,
    HttpErrorResponse,
};
pub use validation::{parse_embed_batch_request, parse_embed_request, ValidationError};
