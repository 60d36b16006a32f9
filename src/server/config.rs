//! Embedding Server Configuration
//!
//! Loaded from `config.toml`; every section and field is optional.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::models::{EmbeddingError, ModelConfig};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub embedding: ModelConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    /// Pending connection queue length
    pub backlog: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    /// Log per-stage timings of every embedding request at info level
    pub log_request_timings: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            backlog: 1024,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_request_timings: false,
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EmbeddingError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, EmbeddingError> {
        let config: ServerConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Parsed bind address
    pub fn bind_addr(&self) -> Result<SocketAddr, EmbeddingError> {
        self.network
            .bind_address
            .parse()
            .map_err(|e| EmbeddingError::ConfigError {
                message: format!("Invalid bind_address '{}': {}", self.network.bind_address, e),
            })
    }

    pub fn validate(&self) -> Result<(), EmbeddingError> {
        self.bind_addr()?;
        self.embedding.validate()
    }

    /// Default tracing filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> String {
        let level = match self.monitoring.log_level.to_lowercase().as_str() {
            level @ ("trace" | "debug" | "info" | "warn" | "error") => level.to_string(),
            _ => "info".to_string(),
        };
        format!("embedding_service={level},{level}")
    }
}
