//! HTTP server setup and graceful shutdown

use crate::routes::{router, ApiState};
use gigdesk_core::store::RecordStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: ([127, 0, 0, 1], 8787).into(),
        }
    }
}

/// Serve the API until interrupted, flushing the store on shutdown
pub async fn serve(
    config: ServerConfig,
    state: ApiState,
    store: Arc<RecordStore>,
) -> anyhow::Result<()> {
    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.flush().await?;
    info!("Record store flushed, shutting down");
    Ok(())
}

async fn shutdown_signal() {
    // Errors here mean no signal handler could be installed; run until killed
    let _ = tokio::signal::ctrl_c().await;
}
