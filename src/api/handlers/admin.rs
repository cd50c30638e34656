use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::manager::{RemovalReport, SweepReport};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Trigger a purge of trash past its retention period. Meant for an external scheduler.
pub async fn purge_expired_trash(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<RemovalReport>>, ApiError> {
    let report = state.files.purge_expired_trash(Utc::now()).await?;
    Ok(JSend::success(report))
}

/// Remove blobs left without a file record. Meant for an external scheduler.
pub async fn sweep_orphaned_blobs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<SweepReport>>, ApiError> {
    let report = state.files.sweep_orphaned_blobs(Utc::now()).await?;
    Ok(JSend::success(report))
}
