//! # ONNX Embedding Engine
//!
//! Pure Rust sentence embeddings using ONNX Runtime and a HuggingFace
//! tokenizer, by default the all-MiniLM-L6-v2 export.
//!
//! ## Pipeline
//!
//! - tokenize with special tokens, truncated to `max_sequence_length`
//! - pad each chunk to its longest member
//! - run the graph, take the token-level output `[batch, seq, hidden]`
//! - mean-pool over real tokens (attention mask == 1)
//! - L2-normalize
//!
//! ## Usage
//!
//! ```ignore
//! let engine = OnnxEmbeddingEngine::new(&ModelConfig::default())?;
//! let embeddings = engine.encode(&["Hello world".to_string()])?;
//! assert_eq!(embeddings[0].len(), engine.dimension());
//! ```
//!
//! All calls block; async callers go through
//! [`crate::models::model::onnx::OnnxEmbeddingModel`].

use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array1, ArrayView2, ArrayView3};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};
use tracing::{debug, info, instrument};

use crate::models::{Embedding, EmbeddingError, ModelConfig};

const WARMUP_TEXT: &str = "validation test";

/// ONNX-based embedding engine for generating text embeddings
pub struct OnnxEmbeddingEngine {
    /// A session run needs exclusive access
    session: Mutex<Session>,
    /// HuggingFace tokenizer, truncation and padding already configured
    tokenizer: Tokenizer,
    /// BERT exports take `token_type_ids`, some others don't
    needs_token_type_ids: bool,
    batch_size: usize,
    max_seq_length: usize,
    /// Measured by a warmup run at load time
    dimension: usize,
}

impl std::fmt::Debug for OnnxEmbeddingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingEngine")
            .field("needs_token_type_ids", &self.needs_token_type_ids)
            .field("batch_size", &self.batch_size)
            .field("max_seq_length", &self.max_seq_length)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbeddingEngine {
    /// Load the model and tokenizer named by `config`
    ///
    /// Runs one warmup inference to learn the embedding dimension, so a model
    /// that cannot produce a vector fails here rather than on the first
    /// request.
    pub fn new(config: &ModelConfig) -> Result<Self, EmbeddingError> {
        info!("Initializing ONNX embedding engine with model: {}", config.model_path);

        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(EmbeddingError::ModelLoadFailed {
                error: format!("ONNX model file not found: {}", model_path.display()),
            });
        }
        let tokenizer_path = Path::new(&config.tokenizer_path);
        if !tokenizer_path.exists() {
            return Err(EmbeddingError::ModelLoadFailed {
                error: format!("Tokenizer file not found: {}", tokenizer_path.display()),
            });
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.num_threads)?
            .commit_from_file(model_path)
            .map_err(|e| EmbeddingError::ModelLoadFailed {
                error: format!("Failed to load ONNX model: {}", e),
            })?;

        let needs_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| EmbeddingError::ModelLoadFailed {
                error: format!("Failed to load tokenizer: {}", e),
            })?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_sequence_length,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::ModelLoadFailed {
                error: format!("Failed to configure truncation: {}", e),
            })?;
        tokenizer.with_padding(Some(PaddingParams::default()));

        let mut engine = Self {
            session: Mutex::new(session),
            tokenizer,
            needs_token_type_ids,
            batch_size: config.batch_size.max(1),
            max_seq_length: config.max_sequence_length,
            dimension: 0,
        };

        let warmup = engine.run_chunk(&[WARMUP_TEXT.to_string()])?;
        engine.dimension = warmup
            .first()
            .map(Vec::len)
            .filter(|&dimension| dimension > 0)
            .ok_or_else(|| EmbeddingError::ModelLoadFailed {
                error: "Warmup inference produced no embedding".to_string(),
            })?;

        info!(
            "ONNX embedding engine initialized: {} dimensions, {} threads",
            engine.dimension, config.num_threads
        );
        Ok(engine)
    }

    /// Embedding dimension, constant for the engine's lifetime
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Maximum number of tokens per input
    pub fn max_sequence_length(&self) -> usize {
        self.max_seq_length
    }

    /// Generate normalized embeddings, one per input, in input order
    ///
    /// Inputs are processed `batch_size` at a time. Any failure fails the
    /// whole call.
    #[instrument(skip(self, texts), fields(text_count = texts.len()))]
    pub fn encode(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        encode_in_chunks(texts, self.batch_size, self.dimension, |chunk| {
            self.run_chunk(chunk)
        })
    }

    /// Tokenize, run and mean-pool one chunk; no normalization
    fn run_chunk(&self, chunk: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let encodings = self
            .tokenizer
            .encode_batch(chunk.to_vec(), true)
            .map_err(|e| EmbeddingError::EmbeddingFailed {
                error: format!("Tokenization failed: {}", e),
            })?;

        let batch = encodings.len();
        let seq_len = encodings.first().map(|e| e.len()).unwrap_or(0);

        let mut input_ids = Vec::with_capacity(batch * seq_len);
        let mut attention_mask = Vec::with_capacity(batch * seq_len);
        let mut token_type_ids = Vec::with_capacity(batch * seq_len);
        for encoding in &encodings {
            if encoding.len() != seq_len {
                return Err(EmbeddingError::EmbeddingFailed {
                    error: format!(
                        "Ragged batch after padding: {} tokens (expected {})",
                        encoding.len(),
                        seq_len
                    ),
                });
            }
            input_ids.extend(encoding.get_ids().iter().map(|&x| x as i64));
            attention_mask.extend_from_slice(encoding.get_attention_mask());
            token_type_ids.extend(encoding.get_type_ids().iter().map(|&x| x as i64));
        }

        let shape = [batch as i64, seq_len as i64];
        let mask_i64: Vec<i64> = attention_mask.iter().map(|&x| x as i64).collect();

        let mut inputs = vec![
            ("input_ids", tensor(shape, input_ids, "input_ids")?),
            ("attention_mask", tensor(shape, mask_i64, "attention_mask")?),
        ];
        if self.needs_token_type_ids {
            inputs.push(("token_type_ids", tensor(shape, token_type_ids, "token_type_ids")?));
        }

        let mut session = self.session.lock().map_err(|_| EmbeddingError::EmbeddingFailed {
            error: "ONNX session lock poisoned".to_string(),
        })?;
        let outputs = session.run(inputs).map_err(|e| EmbeddingError::EmbeddingFailed {
            error: format!("ONNX inference failed: {}", e),
        })?;

        // First output is last_hidden_state for sentence-transformers exports
        let (out_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbeddingError::EmbeddingFailed {
                error: format!("Failed to extract output tensor: {}", e),
            })?;

        let dims: Vec<usize> = out_shape.iter().map(|&x| x as usize).collect();
        if dims.len() != 3 {
            return Err(EmbeddingError::EmbeddingFailed {
                error: format!("Expected 3D output tensor, got {}D", dims.len()),
            });
        }

        let hidden = ArrayView3::from_shape((dims[0], dims[1], dims[2]), data).map_err(|e| {
            EmbeddingError::EmbeddingFailed {
                error: format!("Failed to create output array view: {:?}", e),
            }
        })?;
        let mask = ArrayView2::from_shape((batch, seq_len), attention_mask.as_slice()).map_err(|e| {
            EmbeddingError::EmbeddingFailed {
                error: format!("Failed to create attention mask view: {:?}", e),
            }
        })?;

        mean_pooling(hidden, mask)
    }
}

/// Run `run_chunk` over `batch_size`-sized slices of `texts` and normalize
///
/// Output order follows input order. Every pooled vector must have
/// `dimension` entries and every chunk must yield one vector per text;
/// the first violation fails the whole call.
pub(crate) fn encode_in_chunks<F>(
    texts: &[String],
    batch_size: usize,
    dimension: usize,
    mut run_chunk: F,
) -> Result<Vec<Embedding>, EmbeddingError>
where
    F: FnMut(&[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>,
{
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    debug!("Generating embeddings for {} texts", texts.len());

    let mut embeddings = Vec::with_capacity(texts.len());
    for chunk in texts.chunks(batch_size.max(1)) {
        let pooled_chunk = run_chunk(chunk)?;
        if pooled_chunk.len() != chunk.len() {
            return Err(EmbeddingError::EmbeddingFailed {
                error: format!(
                    "Model returned {} vectors for {} texts",
                    pooled_chunk.len(),
                    chunk.len()
                ),
            });
        }

        for pooled in pooled_chunk {
            if pooled.len() != dimension {
                return Err(EmbeddingError::EmbeddingFailed {
                    error: format!(
                        "Unexpected embedding dimension: {} (expected {})",
                        pooled.len(),
                        dimension
                    ),
                });
            }
            embeddings.push(l2_normalize(&pooled)?);
        }
    }

    debug!("Successfully generated {} embeddings", embeddings.len());
    Ok(embeddings)
}

fn tensor(shape: [i64; 2], data: Vec<i64>, name: &str) -> Result<Tensor<i64>, EmbeddingError> {
    Tensor::from_array((shape, data)).map_err(|e| EmbeddingError::EmbeddingFailed {
        error: format!("Failed to create {} tensor: {}", name, e),
    })
}

/// Average token vectors over positions whose mask is non-zero
///
/// `hidden` is `[batch, seq, hidden]`, `mask` is `[batch, seq]`.
pub(crate) fn mean_pooling(
    hidden: ArrayView3<f32>,
    mask: ArrayView2<u32>,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let (batch, seq_len, hidden_size) = hidden.dim();
    if mask.dim() != (batch, seq_len) {
        return Err(EmbeddingError::EmbeddingFailed {
            error: format!(
                "Attention mask shape {:?} doesn't match output shape [{}, {}]",
                mask.dim(),
                batch,
                seq_len
            ),
        });
    }

    let mut pooled_batch = Vec::with_capacity(batch);
    for (tokens, item_mask) in hidden.outer_iter().zip(mask.outer_iter()) {
        let mut pooled = Array1::<f32>::zeros(hidden_size);
        let mut valid_tokens = 0usize;

        for (token, &m) in tokens.outer_iter().zip(item_mask.iter()) {
            if m == 0 {
                continue;
            }
            pooled += &token;
            valid_tokens += 1;
        }

        if valid_tokens == 0 {
            return Err(EmbeddingError::EmbeddingFailed {
                error: "No valid tokens found in attention mask".to_string(),
            });
        }

        pooled /= valid_tokens as f32;
        pooled_batch.push(pooled.to_vec());
    }

    Ok(pooled_batch)
}

/// Scale to unit Euclidean norm
pub(crate) fn l2_normalize(embedding: &[f32]) -> Result<Vec<f32>, EmbeddingError> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm == 0.0 || !norm.is_finite() {
        return Err(EmbeddingError::EmbeddingFailed {
            error: format!("Cannot normalize vector with norm {}", norm),
        });
    }

    Ok(embedding.iter().map(|x| x / norm).collect())
}
