//! API server lifecycle: bind → spawn background task → return a handle
//! with a shutdown channel.

use std::net::SocketAddr;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::api_router;
use crate::api::types::ApiContext;

/// Handle to a running API server.
pub struct ApiServer {
    pub addr: SocketAddr,
    pub started_at: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ApiServer {
    /// Signal shutdown without waiting. Safe to call more than once.
    pub fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }

    /// Shut down gracefully: stop accepting, let open requests finish.
    pub async fn shutdown(mut self) {
        self.signal_shutdown();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "API server task ended abnormally");
            }
        }
    }
}

/// Bind `bind` and serve the API router in a background tokio task.
pub async fn start_api_server(ctx: ApiContext, bind: SocketAddr) -> std::io::Result<ApiServer> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;
    let app = api_router(ctx);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%addr, "API server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("API server error: {e}");
        }

        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        addr,
        started_at: chrono::Utc::now().to_rfc3339(),
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::broadcast::TenantBroadcaster;
    use crate::config::EngineConfig;
    use crate::engine::RiskEngine;
    use crate::persistence::{MemoryAssessmentStore, MemoryAuditTrail};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_ctx() -> ApiContext {
        let notifications = Arc::new(TenantBroadcaster::default());
        let engine = Arc::new(RiskEngine::new(
            Arc::new(MemoryAssessmentStore::new()),
            Arc::new(MemoryAuditTrail::new()),
            notifications.clone(),
            EngineConfig::default(),
        ));
        ApiContext::new(engine, notifications)
    }

    async fn raw_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn start_serve_and_stop() {
        let server = start_api_server(test_ctx(), "127.0.0.1:0".parse().unwrap())
            .await
            .expect("server should start");
        assert!(server.addr.port() > 0);
        assert!(!server.started_at.is_empty());

        let response = raw_get(server.addr, "/api/health").await;
        assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
        assert!(response.contains("\"status\":\"ok\""));

        let missing = raw_get(server.addr, "/nonexistent").await;
        assert!(missing.starts_with("HTTP/1.1 404"));

        let addr = server.addr;
        server.shutdown().await;
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn signal_shutdown_is_idempotent() {
        let mut server = start_api_server(test_ctx(), "127.0.0.1:0".parse().unwrap())
            .await
            .expect("server should start");
        server.signal_shutdown();
        server.signal_shutdown();
        server.shutdown().await;
    }

    #[tokio::test]
    async fn bind_conflict_is_an_error() {
        let first = start_api_server(test_ctx(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert!(start_api_server(test_ctx(), first.addr).await.is_err());
        first.shutdown().await;
    }
}
