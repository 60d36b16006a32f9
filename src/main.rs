//! Embedding Service Main
//!
//! Usage: `embedding_service [config.toml]`

use std::path::Path;
use std::sync::Arc;

use embedding_service::models::config::ORT_DYLIB_ENV;
use embedding_service::server::ServerResult;
use embedding_service::{EmbeddingServer, OnnxEmbeddingModel, ServerConfig};
use tracing::{info, warn};

fn main() -> ServerResult<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config_found = Path::new(&config_path).exists();
    let config = if config_found {
        ServerConfig::from_file(&config_path)?
    } else {
        ServerConfig::default()
    };

    // Still single-threaded here, so the environment can be modified safely
    if let Some((key, value)) = config.embedding.onnx_runtime_env() {
        std::env::set_var(key, value);
    }

    // RUST_LOG wins over the config file
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .init();

    if !config_found {
        warn!("⚠️  Config file '{}' not found, using defaults", config_path);
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(config))
}

async fn run(config: ServerConfig) -> ServerResult<()> {
    config.validate()?;

    println!("🚀 Sentence Embedding Service");
    println!("📊 Log Level: {}", config.monitoring.log_level);
    println!("🧠 Model: {}", config.embedding.name);
    if let Ok(library) = std::env::var(ORT_DYLIB_ENV) {
        println!("📦 ONNX Runtime: {}", library);
    }
    println!("===============================");

    info!("⏳ Loading model from {}", config.embedding.model_path);
    let model = OnnxEmbeddingModel::load(&config.embedding).await?;

    let server = EmbeddingServer::bind(config, Arc::new(model)).await?;

    println!("✅ Server listening on {}", server.local_addr());
    println!("🛑 Press Ctrl+C to stop");

    server.serve().await
}
