use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{
    ApiError, AppJson, AppQuery, Caller, JSend, JSendPaginated, Pagination,
};
use crate::storage::models::{
    FileQuery, FileRecord, FileState, FileType, FileView, SortField, SortOrder, StorageUsage,
};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub byte_size: u64,
    pub created_at: String,
    pub deleted_at: Option<String>,
    pub file_type: FileType,
    pub filename: String,
    pub id: String,
    pub is_shared: bool,
    pub is_starred: bool,
    pub mime_type: String,
    pub state: FileState,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub file: FileResponse,
    /// Present when the bytes were stored but the file could not be cataloged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct StarRequest {
    pub starred: bool,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    #[serde(flatten)]
    pub usage: StorageUsage,
    pub total_bytes: u64,
}

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub view: FileView,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub search: Option<String>,
}

fn default_limit() -> u32 {
    50
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_file(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    mut multipart: Multipart,
) -> Result<Json<JSend<UploadResponse>>, ApiError> {
    let mut file_data: Option<Bytes> = None;
    let mut file_name: Option<String> = None;
    let mut file_content_type: Option<String> = None;
    let mut filename_override: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                file_content_type = field.content_type().map(|s| s.to_string());
                file_data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::new(e.status(), format!("Failed to read file: {e}")))?,
                );
            }
            "filename" => {
                filename_override = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid filename: {e}")))?,
                );
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let file_data = file_data.ok_or_else(|| ApiError::bad_request("file field is required"))?;
    let filename = filename_override
        .or(file_name)
        .ok_or_else(|| ApiError::bad_request("filename is required"))?;

    let outcome = state
        .files
        .create(&caller, &filename, file_content_type.as_deref(), file_data)
        .await?;

    Ok(JSend::success(UploadResponse {
        file: file_to_response(&outcome.file),
        warning: outcome
            .metadata_error
            .map(|_| "File stored but could not be added to your library yet".to_string()),
    }))
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = state.files.get(&caller, &id)?;
    Ok(JSend::success(file_to_response(&file)))
}

pub async fn rename_file(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    AppJson(req): AppJson<RenameRequest>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = state.files.rename(&caller, &id, &req.filename)?;
    Ok(JSend::success(file_to_response(&file)))
}

pub async fn star_file(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    AppJson(req): AppJson<StarRequest>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = state.files.star(&caller, &id, req.starred)?;
    Ok(JSend::success(file_to_response(&file)))
}

pub async fn trash_file(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = state.files.trash(&caller, &id)?;
    Ok(JSend::success(file_to_response(&file)))
}

pub async fn restore_file(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = state.files.restore(&caller, &id)?;
    Ok(JSend::success(file_to_response(&file)))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    state.files.permanently_delete(&caller, &id).await?;
    Ok(JSend::success(()))
}

pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (file, data) = state.files.download(&caller, &id).await?;
    Ok(content_response(&file, data, "private, no-store"))
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSendPaginated<FileResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let query = FileQuery {
        view: params.view,
        search: params.search,
        sort: params.sort,
        order: params.order,
    };
    let files = state.files.list(&caller, &query)?;

    let total = files.len() as u64;
    let items: Vec<FileResponse> = files
        .iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
        .map(file_to_response)
        .collect();

    Ok(JSendPaginated::page(
        items,
        Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    ))
}

pub async fn storage_usage(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<JSend<UsageResponse>>, ApiError> {
    let usage = state.files.usage(&caller)?;
    Ok(JSend::success(UsageResponse {
        total_bytes: usage.total_bytes(),
        usage,
    }))
}

// ============================================================================
// Helpers
// ============================================================================

pub(super) fn file_to_response(file: &FileRecord) -> FileResponse {
    FileResponse {
        byte_size: file.byte_size,
        created_at: file.created_at.to_rfc3339(),
        deleted_at: file.deleted_at.map(|at| at.to_rfc3339()),
        file_type: file.file_type,
        filename: file.filename.clone(),
        id: file.id.clone(),
        is_shared: file.is_shared,
        is_starred: file.is_starred,
        mime_type: file.mime_type.clone(),
        state: file.state(),
        updated_at: file.updated_at.to_rfc3339(),
    }
}

/// Raw file bytes with type, length, and download filename headers.
pub(super) fn content_response(
    file: &FileRecord,
    data: Bytes,
    cache_control: &'static str,
) -> Response {
    let len = data.len();
    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        file.mime_type
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        header::HeaderValue::from(len),
    );

    // Quotes and control characters would break the header value
    let safe_name: String = file
        .filename
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();
    if let Ok(value) = format!("attachment; filename=\"{safe_name}\"").parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static(cache_control),
    );

    response
}
