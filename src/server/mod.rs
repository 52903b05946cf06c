//! Thin HTTP surface over the sync manager.
//!
//! The core exposes three outward entry points: submit a batch, poll its
//! progress, cancel it. Everything interesting happens in the
//! orchestrator; these routes only translate HTTP.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::orchestrator::{BatchProgress, SyncBatchHandle, SyncManager, SyncRequest};

/// Daemon status payload.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Number of batches the manager is tracking.
    pub batches: usize,
}

/// Cancel response payload.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

async fn submit_batch(
    State(manager): State<Arc<SyncManager>>,
    Json(request): Json<SyncRequest>,
) -> Json<SyncBatchHandle> {
    Json(manager.submit(request).await)
}

async fn batch_progress(
    State(manager): State<Arc<SyncManager>>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchProgress>, StatusCode> {
    manager
        .progress(&batch_id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn cancel_batch(
    State(manager): State<Arc<SyncManager>>,
    Path(batch_id): Path<String>,
) -> Result<Json<CancelResponse>, StatusCode> {
    if manager.cancel(&batch_id).await {
        Ok(Json(CancelResponse { cancelled: true }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn status(State(manager): State<Arc<SyncManager>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        batches: manager.batch_count().await,
    })
}

/// Build the router.
pub fn build_router(manager: Arc<SyncManager>) -> Router {
    Router::new()
        .route("/sync", post(submit_batch))
        .route("/sync/{batch_id}", get(batch_progress))
        .route("/sync/{batch_id}/cancel", post(cancel_batch))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(manager)
}

/// Serve until the shutdown token fires.
pub async fn run_server(
    manager: Arc<SyncManager>,
    port: u16,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = build_router(manager);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}
