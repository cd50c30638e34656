use axum::extract::State;
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::files::{file_to_response, FileResponse};
use crate::api::response::{ApiError, AppQuery, Caller, JSend};
use crate::manager::RemovalReport;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ExpiringParams {
    #[serde(default = "default_within_days")]
    pub within_days: u32,
}

fn default_within_days() -> u32 {
    7
}

#[derive(Debug, Serialize)]
pub struct ExpiringFileResponse {
    #[serde(flatten)]
    pub file: FileResponse,
    pub purge_at: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn expiring_trash(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    AppQuery(params): AppQuery<ExpiringParams>,
) -> Result<Json<JSend<Vec<ExpiringFileResponse>>>, ApiError> {
    let within = Duration::days(i64::from(params.within_days));
    let expiring = state.files.expiring_trash(&caller, within, Utc::now())?;

    Ok(JSend::success(
        expiring
            .iter()
            .map(|e| ExpiringFileResponse {
                file: file_to_response(&e.file),
                purge_at: e.purge_at.to_rfc3339(),
            })
            .collect(),
    ))
}

pub async fn empty_trash(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<JSend<RemovalReport>>, ApiError> {
    let report = state.files.empty_trash(&caller).await?;
    if report.failed > 0 {
        tracing::warn!(
            owner_id = %caller,
            deleted = report.deleted,
            failed = report.failed,
            "Emptied trash with failures"
        );
    }
    Ok(JSend::success(report))
}
