//! Embedding Server
//!
//! Binds the listening socket and runs the Hyper service until shutdown.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use tokio::net::TcpSocket;
use tracing::{info, warn};

use crate::models::EmbeddingModel;
use crate::server::config::ServerConfig;
use crate::server::hyper_server::{handle_request, ServerState};

pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub struct EmbeddingServer {
    config: Arc<ServerConfig>,
    model: Arc<dyn EmbeddingModel>,
    listener: std::net::TcpListener,
    local_addr: SocketAddr,
}

impl EmbeddingServer {
    /// Bind the configured address; the model must already be loaded
    pub async fn bind(config: ServerConfig, model: Arc<dyn EmbeddingModel>) -> ServerResult<Self> {
        let addr = config.bind_addr()?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        // Small JSON responses, don't let Nagle hold them back
        socket.set_nodelay(true)?;
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(config.network.backlog)?;
        let local_addr = listener.local_addr()?;

        info!("📡 Server bound to {}", local_addr);

        Ok(Self {
            config: Arc::new(config),
            model,
            listener: listener.into_std()?,
            local_addr,
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until Ctrl+C
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("⚠️  Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("🛑 Shutdown signal received");
        })
        .await
    }

    /// Serve until `shutdown` completes, then drain in-flight requests
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = ServerState::new(Arc::clone(&self.model))
            .with_request_timings(self.config.monitoring.log_request_timings);

        let make_svc = make_service_fn(move |_| {
            let state = state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| handle_request(req, state.clone())))
            }
        });

        let server = Server::from_tcp(self.listener)?
            .http1_keepalive(true)
            .tcp_nodelay(true)
            .tcp_sleep_on_accept_errors(true)
            .serve(make_svc)
            .with_graceful_shutdown(shutdown);

        let info = self.model.info();
        info!("✅ Serving model '{}' ({} dimensions) on {}", info.name, info.dimension, self.local_addr);
        info!("📍 Endpoints:");
        info!("   POST /embed        - Embed one text");
        info!("   POST /embed_batch  - Embed many texts");
        info!("   GET  /health       - Health check");
        info!("   GET  /             - Server info");

        server.await?;

        info!("👋 Server stopped");
        Ok(())
    }
}
