//! Hyper request handling
//!
//! Plain Hyper routing: one match on (method, path), no middleware stack.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use hyper::body::to_bytes;
use hyper::header::{self, HeaderValue};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::models::{EmbeddingError, EmbeddingModel};
use crate::protocol::{
    parse_embed_batch_request, parse_embed_request, EmbedBatchResponse, EmbedResponse,
    HealthResponse, HttpErrorResponse, ValidationError,
};

/// Shared state handed to every request
#[derive(Clone)]
pub struct ServerState {
    pub model: Arc<dyn EmbeddingModel>,
    pub log_request_timings: bool,
}

impl ServerState {
    pub fn new(model: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            model,
            log_request_timings: false,
        }
    }

    /// Log per-request latency at info level
    pub fn with_request_timings(mut self, enabled: bool) -> Self {
        self.log_request_timings = enabled;
        self
    }
}

/// Main request handler
pub async fn handle_request(
    req: Request<Body>,
    state: ServerState,
) -> Result<Response<Body>, Infallible> {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"));

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let span = info_span!("request", id = %Uuid::new_v4(), method = %method, path = %path);

    let mut response = async {
        match (&method, path.as_str()) {
            (&Method::POST, "/embed") => handle_embed(req, &state).await,
            (&Method::POST, "/embed_batch") => handle_embed_batch(req, &state).await,
            (&Method::GET, "/health") => handle_health(&state),
            (&Method::GET, "/") => handle_root(&state),
            (&Method::OPTIONS, _) => handle_options(),
            _ => match allowed_methods(&path) {
                Some(allowed) => {
                    debug!("{} not allowed on {}", method, path);
                    let mut response = json_response(
                        StatusCode::METHOD_NOT_ALLOWED,
                        &HttpErrorResponse::method_not_allowed(method.as_str(), allowed),
                    );
                    response
                        .headers_mut()
                        .insert(header::ALLOW, HeaderValue::from_static(allowed));
                    response
                }
                None => {
                    debug!("No route for {} {}", method, path);
                    json_response(StatusCode::NOT_FOUND, &HttpErrorResponse::not_found())
                }
            },
        }
    }
    .instrument(span)
    .await;

    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );

    Ok(response)
}

/// Methods served on a known path, `None` for unknown paths
fn allowed_methods(path: &str) -> Option<&'static str> {
    match path {
        "/embed" | "/embed_batch" => Some("POST, OPTIONS"),
        "/health" | "/" => Some("GET, OPTIONS"),
        _ => None,
    }
}

/// OPTIONS handler for CORS preflight
fn handle_options() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

/// Root endpoint - server info
fn handle_root(state: &ServerState) -> Response<Body> {
    let info = serde_json::json!({
        "name": "Sentence Embedding Service",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "embed": {
                "method": "POST",
                "path": "/embed",
                "description": "Embed one text: {\"text\": string}"
            },
            "embed_batch": {
                "method": "POST",
                "path": "/embed_batch",
                "description": "Embed many texts in order: {\"texts\": [string]}"
            },
            "health": {
                "method": "GET",
                "path": "/health",
                "description": "Health check endpoint"
            }
        },
        "model": state.model.info()
    });

    json_response(StatusCode::OK, &info)
}

/// Health check endpoint
fn handle_health(state: &ServerState) -> Response<Body> {
    debug!("🏥 Health check requested");
    json_response(
        StatusCode::OK,
        &HealthResponse::healthy(state.model.info().name.as_str(), state.model.dimension()),
    )
}

/// `POST /embed`
async fn handle_embed(req: Request<Body>, state: &ServerState) -> Response<Body> {
    let start_time = Instant::now();

    let body = match read_body(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };

    let request = match parse_embed_request(&body) {
        Ok(request) => request,
        Err(e) => return validation_failed(e),
    };

    debug!("🔤 Embedding request for text length: {}", request.text.len());

    match state.model.embed_text(&request.text).await {
        Ok(embedding) => {
            log_timing(state, "embed", 1, start_time);
            json_response(StatusCode::OK, &EmbedResponse::new(embedding))
        }
        Err(e) => model_failed(e),
    }
}

/// `POST /embed_batch`
async fn handle_embed_batch(req: Request<Body>, state: &ServerState) -> Response<Body> {
    let start_time = Instant::now();

    let body = match read_body(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };

    let request = match parse_embed_batch_request(&body) {
        Ok(request) => request,
        Err(e) => return validation_failed(e),
    };

    debug!("🔤 Batch embedding request for {} texts", request.texts.len());

    match state.model.embed_batch(&request.texts).await {
        Ok(embeddings) if embeddings.len() == request.texts.len() => {
            log_timing(state, "embed_batch", embeddings.len(), start_time);
            json_response(StatusCode::OK, &EmbedBatchResponse::new(embeddings))
        }
        Ok(embeddings) => model_failed(EmbeddingError::EmbeddingFailed {
            error: format!(
                "Model returned {} embeddings for {} texts",
                embeddings.len(),
                request.texts.len()
            ),
        }),
        Err(e) => model_failed(e),
    }
}

async fn read_body(req: Request<Body>) -> Result<hyper::body::Bytes, Response<Body>> {
    to_bytes(req.into_body()).await.map_err(|e| {
        warn!("Failed to read request body: {}", e);
        json_response(
            StatusCode::BAD_REQUEST,
            &HttpErrorResponse::unreadable_body(e.to_string()),
        )
    })
}

fn validation_failed(error: ValidationError) -> Response<Body> {
    debug!("Request rejected: {}", error);
    json_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        &HttpErrorResponse::validation(&error),
    )
}

fn model_failed(error: EmbeddingError) -> Response<Body> {
    error!("❌ Embedding generation failed: {}", error);
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &HttpErrorResponse::internal_error(error.to_string()),
    )
}

fn log_timing(state: &ServerState, endpoint: &str, count: usize, start_time: Instant) {
    if state.log_request_timings {
        info!("⏱️  /{} ({} texts) took {:?}", endpoint, count, start_time.elapsed());
    } else {
        debug!("⏱️  /{} ({} texts) took {:?}", endpoint, count, start_time.elapsed());
    }
}

/// Serialize `body` as a JSON response
fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let (status, bytes) = match serde_json::to_vec(body) {
        Ok(bytes) => (status, bytes),
        Err(e) => {
            error!("❌ Failed to serialize response: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"error":"Failed to serialize response","code":"INTERNAL_ERROR"}"#.to_vec(),
            )
        }
    };

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Embedding, EmbeddingResult, ModelInfo};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    const DIMENSION: usize = 8;

    /// Deterministic text → unit vector, derived from the bytes of the text
    struct HashModel {
        info: ModelInfo,
    }

    impl HashModel {
        fn new() -> Self {
            Self {
                info: ModelInfo {
                    name: "hash-model".to_string(),
                    dimension: DIMENSION,
                    max_sequence_length: 256,
                },
            }
        }

        fn vector(text: &str) -> Embedding {
            let mut v = vec![1.0f32; DIMENSION];
            for (i, b) in text.bytes().enumerate() {
                v[i % DIMENSION] += b as f32 * (i + 1) as f32;
            }
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            v.into_iter().map(|x| x / norm).collect()
        }
    }

    #[async_trait]
    impl EmbeddingModel for HashModel {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        async fn embed_text(&self, text: &str) -> EmbeddingResult<Embedding> {
            Ok(Self::vector(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>> {
            Ok(texts.iter().map(|t| Self::vector(t)).collect())
        }
    }

    /// Every encode fails
    struct BrokenModel {
        info: ModelInfo,
    }

    #[async_trait]
    impl EmbeddingModel for BrokenModel {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        async fn embed_text(&self, _text: &str) -> EmbeddingResult<Embedding> {
            Err(EmbeddingError::InferenceError {
                model_name: self.info.name.clone(),
                error: "runtime exploded".to_string(),
            })
        }

        async fn embed_batch(&self, _texts: &[String]) -> EmbeddingResult<Vec<Embedding>> {
            Err(EmbeddingError::InferenceError {
                model_name: self.info.name.clone(),
                error: "runtime exploded".to_string(),
            })
        }
    }

    fn state() -> ServerState {
        ServerState::new(Arc::new(HashModel::new()))
    }

    fn broken_state() -> ServerState {
        ServerState::new(Arc::new(BrokenModel {
            info: HashModel::new().info,
        }))
    }

    async fn call(state: ServerState, method: Method, path: &str, body: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = handle_request(req, state).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn as_vector(value: &Value) -> Vec<f32> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|x| x.as_f64().unwrap() as f32)
            .collect()
    }

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn test_embed_returns_unit_vector() {
        let (status, body) = call(state(), Method::POST, "/embed", r#"{"text":"hello world"}"#).await;
        assert_eq!(status, StatusCode::OK);

        let embedding = as_vector(&body["embedding"]);
        assert_eq!(embedding.len(), DIMENSION);
        assert!((norm(&embedding) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_embed_is_deterministic_with_fixed_length() {
        let (_, first) = call(state(), Method::POST, "/embed", r#"{"text":"same"}"#).await;
        let (_, second) = call(state(), Method::POST, "/embed", r#"{"text":"same"}"#).await;
        let (_, other) = call(state(), Method::POST, "/embed", r#"{"text":"a much longer text"}"#).await;

        assert_eq!(first, second);
        assert_eq!(
            first["embedding"].as_array().unwrap().len(),
            other["embedding"].as_array().unwrap().len()
        );
    }

    #[tokio::test]
    async fn test_embed_empty_text_is_valid() {
        let (status, body) = call(state(), Method::POST, "/embed", r#"{"text":""}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["embedding"].as_array().unwrap().len(), DIMENSION);
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_order() {
        let (status, body) = call(
            state(),
            Method::POST,
            "/embed_batch",
            r#"{"texts":["a","b","a"]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let embeddings = body["embeddings"].as_array().unwrap();
        assert_eq!(embeddings.len(), 3);
        assert_eq!(embeddings[0], embeddings[2]);
        assert_ne!(embeddings[0], embeddings[1]);

        let (_, single) = call(state(), Method::POST, "/embed", r#"{"text":"a"}"#).await;
        assert_eq!(embeddings[0], single["embedding"]);
        let (_, single) = call(state(), Method::POST, "/embed", r#"{"text":"b"}"#).await;
        assert_eq!(embeddings[1], single["embedding"]);
    }

    #[tokio::test]
    async fn test_embed_batch_empty() {
        let (status, body) = call(state(), Method::POST, "/embed_batch", r#"{"texts":[]}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "embeddings": [] }));
    }

    #[tokio::test]
    async fn test_missing_field_is_client_error() {
        let (status, body) = call(state(), Method::POST, "/embed", r#"{}"#).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "MISSING_FIELD");
        assert_eq!(body["details"], "text");

        let (status, body) = call(state(), Method::POST, "/embed_batch", r#"{"text":"a"}"#).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["details"], "texts");
    }

    #[tokio::test]
    async fn test_wrong_type_is_client_error() {
        let (status, body) = call(state(), Method::POST, "/embed", r#"{"text":1}"#).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "INVALID_TYPE");

        let (status, body) =
            call(state(), Method::POST, "/embed_batch", r#"{"texts":["a",null]}"#).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["details"], "texts[1]");
    }

    #[tokio::test]
    async fn test_invalid_json_is_client_error() {
        let (status, body) = call(state(), Method::POST, "/embed", "text=hello").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "INVALID_JSON");
    }

    #[tokio::test]
    async fn test_model_failure_is_server_error() {
        let (status, body) = call(broken_state(), Method::POST, "/embed", r#"{"text":"x"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "INTERNAL_ERROR");

        let (status, _) =
            call(broken_state(), Method::POST, "/embed_batch", r#"{"texts":["x","y"]}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_validation_runs_before_model() {
        // the broken model would answer 500 if it were reached
        let (status, _) = call(broken_state(), Method::POST, "/embed", r#"{"txt":"x"}"#).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_state_request_timings() {
        let model: Arc<dyn EmbeddingModel> = Arc::new(HashModel::new());
        assert!(!ServerState::new(model.clone()).log_request_timings);
        let state = ServerState::new(model).with_request_timings(true);
        assert!(state.log_request_timings);
        assert_eq!(state.model.dimension(), DIMENSION);
    }

    #[tokio::test]
    async fn test_health_and_root() {
        let (status, body) = call(state(), Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model"], "hash-model");
        assert_eq!(body["embedding_dimension"], DIMENSION);

        let (status, body) = call(state(), Method::GET, "/", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model"]["dimension"], DIMENSION);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, body) = call(state(), Method::GET, "/nope", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not Found");

        let (status, _) = call(state(), Method::POST, "/embed/extra", "{}").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wrong_method_on_known_route() {
        for (method, path, allowed) in [
            (Method::GET, "/embed", "POST, OPTIONS"),
            (Method::PUT, "/embed_batch", "POST, OPTIONS"),
            (Method::POST, "/health", "GET, OPTIONS"),
            (Method::DELETE, "/", "GET, OPTIONS"),
        ] {
            let req = Request::builder()
                .method(method.clone())
                .uri(path)
                .body(Body::empty())
                .unwrap();
            let response = handle_request(req, state()).await.unwrap();
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{} {}", method, path);
            assert_eq!(response.headers()["allow"], allowed);
            assert!(response.headers().contains_key("access-control-allow-origin"));

            let bytes = to_bytes(response.into_body()).await.unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["code"], "METHOD_NOT_ALLOWED");
        }
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/embed")
            .header("origin", "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let response = handle_request(req, state()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:5173"
        );
    }
}
