use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::files::content_response;
use crate::api::response::{ApiError, AppJson, Caller, JSend};
use crate::manager::ShareOptions;
use crate::storage::models::{FileType, ShareGrant};
use crate::AppState;

/// Header carrying the password for a protected share link.
pub const SHARE_PASSWORD_HEADER: &str = "x-share-password";

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub access_token: String,
    pub created_at: String,
    pub expires_at: Option<String>,
    pub file_id: String,
    pub is_active: bool,
    pub is_password_protected: bool,
    pub updated_at: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// What a share link reveals about the file. Deliberately omits the owner.
#[derive(Debug, Serialize)]
pub struct SharedFileResponse {
    pub byte_size: u64,
    pub created_at: String,
    pub file_type: FileType,
    pub filename: String,
    pub mime_type: String,
}

// ============================================================================
// Owner handlers
// ============================================================================

pub async fn get_share(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<Option<ShareResponse>>>, ApiError> {
    let grant = state.shares.grant_for(&caller, &id)?;
    Ok(JSend::success(
        grant.map(|g| share_to_response(&state, &g)),
    ))
}

pub async fn put_share(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    AppJson(req): AppJson<ShareRequest>,
) -> Result<Json<JSend<ShareResponse>>, ApiError> {
    let options = ShareOptions {
        password: req.password,
        expires_at: req.expires_at,
    };
    let grant = state.shares.create_or_replace(&caller, &id, options)?;
    Ok(JSend::success(share_to_response(&state, &grant)))
}

pub async fn revoke_share(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    state.shares.revoke(&caller, &id)?;
    Ok(JSend::success(()))
}

// ============================================================================
// Public handlers
// ============================================================================

pub async fn resolve_share(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Json<JSend<SharedFileResponse>>, ApiError> {
    let file = state.shares.resolve(&token, share_password(&headers))?;
    Ok(JSend::success(SharedFileResponse {
        byte_size: file.byte_size,
        created_at: file.created_at.to_rfc3339(),
        file_type: file.file_type,
        filename: file.filename,
        mime_type: file.mime_type,
    }))
}

pub async fn download_share(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (file, data) = state
        .shares
        .resolve_content(&token, share_password(&headers))
        .await?;
    Ok(content_response(&file, data, "private, no-cache"))
}

// ============================================================================
// Helpers
// ============================================================================

fn share_password(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SHARE_PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn share_to_response(state: &AppState, grant: &ShareGrant) -> ShareResponse {
    ShareResponse {
        access_token: grant.access_token.clone(),
        created_at: grant.created_at.to_rfc3339(),
        expires_at: grant.expires_at.map(|at| at.to_rfc3339()),
        file_id: grant.file_id.clone(),
        is_active: grant.is_active,
        is_password_protected: grant.is_password_protected(),
        updated_at: grant.updated_at.to_rfc3339(),
        url: state.config.share_url(&grant.access_token),
    }
}
