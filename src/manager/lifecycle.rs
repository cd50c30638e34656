//! File lifecycle: upload, rename, star, trash, restore, and permanent deletion.
//!
//! A file moves `Active <-> Trashed` and leaves the catalog only from `Trashed`. Operations
//! that touch both stores order their writes so a failure between them leaves at worst an
//! orphaned blob or a file still sitting in the trash, never a record pointing at a missing
//! blob.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::ServiceError;
use crate::config::LifecycleConfig;
use crate::object_store::ObjectStore;
use crate::storage::models::{
    FileQuery, FileRecord, FileType, FileUpdate, FileView, Patch, StorageUsage,
};
use crate::storage::Database;

const OCTET_STREAM: &str = "application/octet-stream";

/// Unreferenced blobs younger than this may belong to an upload whose record is not written yet.
const ORPHAN_GRACE_HOURS: i64 = 1;

/// MIME types accepted for upload besides `image/*`.
const ALLOWED_DOCUMENT_TYPES: &[&str] = &[
    "application/pdf",
    "text/plain",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
];

/// Result of an upload whose blob was stored.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub file: FileRecord,
    /// Set when the blob was written but its catalog row was not.
    pub metadata_error: Option<String>,
}

/// Per-file accounting for bulk removal from the trash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    pub deleted: u64,
    pub failed: u64,
    /// Ids of files that are still in the trash after the run
    pub failed_ids: Vec<String>,
}

/// Outcome of an orphaned-blob sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: u64,
    pub removed: u64,
    /// Keys whose deletion failed
    pub failed_keys: Vec<String>,
}

/// A trashed file and the moment it becomes eligible for purge.
#[derive(Debug, Clone)]
pub struct ExpiringFile {
    pub file: FileRecord,
    pub purge_at: DateTime<Utc>,
}

pub struct LifecycleManager {
    db: Database,
    object_store: Arc<dyn ObjectStore>,
    max_upload_size: u64,
    trash_retention: Duration,
}

impl LifecycleManager {
    pub fn new(db: Database, object_store: Arc<dyn ObjectStore>, config: &LifecycleConfig) -> Self {
        Self {
            db,
            object_store,
            max_upload_size: config.max_upload_size,
            trash_retention: Duration::days(i64::from(config.trash_retention_days)),
        }
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Upload a new file for `owner_id`.
    ///
    /// The blob is written first. If that fails nothing is created. If the catalog write
    /// fails afterwards the upload still succeeds and the failure is reported on the
    /// outcome, leaving the blob for a reconciliation sweep.
    pub async fn create(
        &self,
        owner_id: &str,
        filename: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> Result<UploadOutcome, ServiceError> {
        if owner_id.trim().is_empty() {
            return Err(ServiceError::invalid_argument("owner id must not be empty"));
        }

        let filename = filename.trim();
        if filename.is_empty() {
            return Err(ServiceError::invalid_argument("filename must not be empty"));
        }

        let byte_size = data.len() as u64;
        if byte_size > self.max_upload_size {
            return Err(ServiceError::PayloadTooLarge {
                limit: self.max_upload_size,
            });
        }

        let mime_type = resolve_mime_type(filename, content_type);
        if !is_allowed_type(&mime_type) {
            return Err(ServiceError::invalid_argument("file type is not supported"));
        }

        let now = Utc::now();
        let storage_path = storage_path_for(owner_id, filename, &mime_type, now);

        self.object_store
            .put(&storage_path, data)
            .await
            .map_err(|e| ServiceError::UploadFailed(e.to_string()))?;

        let file = FileRecord {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            filename: filename.to_string(),
            storage_path,
            file_type: FileType::from_mime(&mime_type),
            mime_type,
            byte_size,
            created_at: now,
            updated_at: now,
            is_starred: false,
            is_deleted: false,
            deleted_at: None,
            is_shared: false,
        };

        let metadata_error = match self.db.put_file(&file) {
            Ok(()) => {
                tracing::debug!(file_id = %file.id, owner_id = %owner_id, "Created file");
                None
            }
            Err(e) => {
                tracing::error!(
                    owner_id = %owner_id,
                    storage_path = %file.storage_path,
                    error = %e,
                    "Stored blob but failed to write file record; blob is orphaned"
                );
                Some(e.to_string())
            }
        };

        Ok(UploadOutcome {
            file,
            metadata_error,
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Fetch one of the caller's files, in any state.
    pub fn get(&self, caller_id: &str, file_id: &str) -> Result<FileRecord, ServiceError> {
        let file = self.db.get_file(file_id)?.ok_or(ServiceError::NotFound)?;
        if file.owner_id != caller_id {
            return Err(ServiceError::Forbidden);
        }
        Ok(file)
    }

    pub fn list(&self, caller_id: &str, query: &FileQuery) -> Result<Vec<FileRecord>, ServiceError> {
        Ok(self.db.list_files(caller_id, query)?)
    }

    pub fn usage(&self, caller_id: &str) -> Result<StorageUsage, ServiceError> {
        Ok(self.db.storage_usage(caller_id)?)
    }

    /// Read a file's bytes. Allowed in any state; never mutates the record.
    pub async fn download(
        &self,
        caller_id: &str,
        file_id: &str,
    ) -> Result<(FileRecord, Bytes), ServiceError> {
        let file = self.get(caller_id, file_id)?;
        let data = self.object_store.get(&file.storage_path).await?;
        Ok((file, data))
    }

    // ========================================================================
    // Metadata transitions
    // ========================================================================

    pub fn rename(
        &self,
        caller_id: &str,
        file_id: &str,
        new_filename: &str,
    ) -> Result<FileRecord, ServiceError> {
        let file = self.get(caller_id, file_id)?;

        let new_filename = new_filename.trim();
        if new_filename.is_empty() {
            return Err(ServiceError::invalid_argument("filename must not be empty"));
        }
        if new_filename == file.filename {
            return Ok(file);
        }

        let update = FileUpdate {
            filename: Some(new_filename.to_string()),
            ..Default::default()
        };
        let file = self.apply(file_id, &update)?;
        tracing::debug!(file_id = %file_id, "Renamed file");
        Ok(file)
    }

    /// Set the starred flag. Starring is not available while the file is in the trash.
    pub fn star(
        &self,
        caller_id: &str,
        file_id: &str,
        starred: bool,
    ) -> Result<FileRecord, ServiceError> {
        let file = self.get(caller_id, file_id)?;
        if file.is_trashed() {
            return Err(ServiceError::invalid_state(
                "files in the trash cannot be starred",
            ));
        }
        if file.is_starred == starred {
            return Ok(file);
        }

        let update = FileUpdate {
            is_starred: Some(starred),
            ..Default::default()
        };
        self.apply(file_id, &update)
    }

    /// Move a file to the trash. Trashing a trashed file returns it unchanged.
    pub fn trash(&self, caller_id: &str, file_id: &str) -> Result<FileRecord, ServiceError> {
        let file = self.get(caller_id, file_id)?;
        if file.is_trashed() {
            return Ok(file);
        }

        let update = FileUpdate {
            deleted_at: Patch::Value(Utc::now()),
            ..Default::default()
        };
        let file = self.apply(file_id, &update)?;
        tracing::debug!(file_id = %file_id, "Moved file to trash");
        Ok(file)
    }

    /// Bring a file back from the trash. Restoring a file that is not trashed returns it
    /// unchanged.
    pub fn restore(&self, caller_id: &str, file_id: &str) -> Result<FileRecord, ServiceError> {
        let file = self.get(caller_id, file_id)?;
        if !file.is_trashed() {
            return Ok(file);
        }

        let update = FileUpdate {
            deleted_at: Patch::Null,
            ..Default::default()
        };
        let file = self.apply(file_id, &update)?;
        tracing::debug!(file_id = %file_id, "Restored file from trash");
        Ok(file)
    }

    fn apply(&self, file_id: &str, update: &FileUpdate) -> Result<FileRecord, ServiceError> {
        self.db
            .update_file(file_id, update)?
            .ok_or(ServiceError::NotFound)
    }

    // ========================================================================
    // Destruction
    // ========================================================================

    /// Remove a trashed file for good: blob first, then the record.
    ///
    /// If the blob cannot be deleted the record stays in the trash and the error is
    /// returned; calling again is safe.
    pub async fn permanently_delete(
        &self,
        caller_id: &str,
        file_id: &str,
    ) -> Result<(), ServiceError> {
        let file = self.get(caller_id, file_id)?;
        if !file.is_trashed() {
            return Err(ServiceError::invalid_state(
                "files must be moved to the trash before they can be deleted",
            ));
        }

        self.object_store.delete(&file.storage_path).await.map_err(|e| {
            tracing::warn!(file_id = %file_id, error = %e, "Failed to delete blob; file kept in trash");
            ServiceError::StorageUnavailable(e.to_string())
        })?;

        self.db.delete_file(file_id)?;
        tracing::debug!(file_id = %file_id, "Permanently deleted file");
        Ok(())
    }

    /// Permanently delete everything in the caller's trash.
    pub async fn empty_trash(&self, caller_id: &str) -> Result<RemovalReport, ServiceError> {
        let query = FileQuery {
            view: FileView::Trash,
            ..Default::default()
        };
        let trashed = self.db.list_files(caller_id, &query)?;
        Ok(self.remove_files(trashed).await)
    }

    /// Trashed files of the caller that become eligible for purge within `within`.
    pub fn expiring_trash(
        &self,
        caller_id: &str,
        within: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiringFile>, ServiceError> {
        let query = FileQuery {
            view: FileView::Trash,
            ..Default::default()
        };
        let horizon = now + within;

        let mut expiring: Vec<ExpiringFile> = self
            .db
            .list_files(caller_id, &query)?
            .into_iter()
            .filter_map(|file| {
                let purge_at = self.purge_at(&file)?;
                (purge_at <= horizon).then_some(ExpiringFile { file, purge_at })
            })
            .collect();
        expiring.sort_by_key(|e| e.purge_at);

        Ok(expiring)
    }

    /// Permanently delete every trashed file, across owners, whose retention has lapsed.
    pub async fn purge_expired_trash(
        &self,
        now: DateTime<Utc>,
    ) -> Result<RemovalReport, ServiceError> {
        let expired: Vec<FileRecord> = self
            .db
            .get_all_files()?
            .into_iter()
            .filter(|file| self.purge_at(file).is_some_and(|at| at <= now))
            .collect();

        let report = self.remove_files(expired).await;
        if report.deleted > 0 || report.failed > 0 {
            tracing::info!(
                deleted = report.deleted,
                failed = report.failed,
                "Purged expired trash"
            );
        }
        Ok(report)
    }

    /// Delete blobs that no file record points at, such as the leftovers of an upload whose
    /// record write failed. Blobs written within the grace period are left alone.
    pub async fn sweep_orphaned_blobs(
        &self,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, ServiceError> {
        let referenced: HashSet<String> = self
            .db
            .get_all_files()?
            .into_iter()
            .map(|f| f.storage_path)
            .collect();
        let cutoff = now - Duration::hours(ORPHAN_GRACE_HOURS);

        let keys = self.object_store.list("").await?;
        let mut report = SweepReport {
            scanned: keys.len() as u64,
            ..Default::default()
        };

        let orphans: Vec<String> = keys
            .into_iter()
            .filter(|key| !referenced.contains(key))
            .filter(|key| blob_written_at(key).is_some_and(|at| at <= cutoff))
            .collect();

        for (key, result) in self.object_store.delete_many(&orphans).await {
            match result {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    tracing::warn!(storage_path = %key, error = %e, "Failed to delete orphaned blob");
                    report.failed_keys.push(key);
                }
            }
        }

        if report.removed > 0 || !report.failed_keys.is_empty() {
            tracing::info!(
                scanned = report.scanned,
                removed = report.removed,
                failed = report.failed_keys.len(),
                "Swept orphaned blobs"
            );
        }
        Ok(report)
    }

    fn purge_at(&self, file: &FileRecord) -> Option<DateTime<Utc>> {
        file.deleted_at.map(|at| at + self.trash_retention)
    }

    /// Batch-delete blobs, then the records whose blob deletion is confirmed.
    ///
    /// Never fails as a whole: every file is counted as deleted or failed, and a failed
    /// file stays in the trash so the run can be repeated.
    async fn remove_files(&self, files: Vec<FileRecord>) -> RemovalReport {
        let mut report = RemovalReport::default();
        if files.is_empty() {
            return report;
        }

        let paths: Vec<String> = files.iter().map(|f| f.storage_path.clone()).collect();
        let results = self.object_store.delete_many(&paths).await;

        let mut confirmed = Vec::with_capacity(files.len());
        for (file, (path, result)) in files.into_iter().zip(results) {
            match result {
                Ok(()) => confirmed.push(file.id),
                Err(e) => {
                    tracing::warn!(
                        file_id = %file.id,
                        storage_path = %path,
                        error = %e,
                        "Failed to delete blob; file kept in trash"
                    );
                    report.failed_ids.push(file.id);
                }
            }
        }

        match self.db.delete_files(&confirmed) {
            Ok(_) => report.deleted = confirmed.len() as u64,
            Err(e) => {
                tracing::warn!(
                    count = confirmed.len(),
                    error = %e,
                    "Blobs deleted but file records were not; retry will finish them"
                );
                report.failed_ids.extend(confirmed);
            }
        }

        report.failed = report.failed_ids.len() as u64;
        report
    }
}

// ============================================================================
// Upload helpers
// ============================================================================

/// Pick the MIME type: the declared one unless it is generic, then a guess from the name.
fn resolve_mime_type(filename: &str, content_type: Option<&str>) -> String {
    content_type
        .map(str::trim)
        .filter(|ct| !ct.is_empty() && *ct != OCTET_STREAM)
        .map(|ct| ct.to_string())
        .or_else(|| mime_guess::from_path(filename).first().map(|m| m.to_string()))
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

/// Upload time encoded in a storage path's `{unix_millis}-` prefix. `None` for keys not
/// written by [`storage_path_for`].
fn blob_written_at(key: &str) -> Option<DateTime<Utc>> {
    let name = key.rsplit('/').next()?;
    let millis = name.split('-').next()?.parse::<i64>().ok()?;
    DateTime::from_timestamp_millis(millis)
}

fn is_allowed_type(mime_type: &str) -> bool {
    // Ignore parameters such as "; charset=utf-8"
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or(mime_type)
        .trim()
        .to_ascii_lowercase();

    essence.starts_with("image/") || ALLOWED_DOCUMENT_TYPES.contains(&essence.as_str())
}

/// `{owner_id}/{unix_millis}-{uuid}.{ext}`, unique even for concurrent uploads of the same
/// filename.
fn storage_path_for(owner_id: &str, filename: &str, mime_type: &str, now: DateTime<Utc>) -> String {
    let unique = format!(
        "{}-{}",
        now.timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    );

    let from_name = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase());
    let extension = from_name.or_else(|| {
        if mime_type == OCTET_STREAM {
            return None;
        }
        mime_guess::get_mime_extensions_str(mime_type)
            .and_then(|exts| exts.first())
            .map(|e| e.to_string())
    });

    match extension {
        Some(ext) => format!("{owner_id}/{unique}.{ext}"),
        None => format!("{owner_id}/{unique}"),
    }
}
