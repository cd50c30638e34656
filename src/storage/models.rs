use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Three-state patch value for partial updates.
/// Unlike `Option<Option<T>>`, each variant says exactly what happens to the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Patch<T> {
    /// Field is left unchanged.
    #[default]
    Absent,
    /// Field is cleared.
    Null,
    /// Field is set to a new value.
    Value(T),
}

/// Classification of a file derived from its MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Audio,
    Binary,
    Document,
    Image,
    Video,
}

impl FileType {
    /// Derive a file type classification from a MIME type string.
    pub fn from_mime(mime_type: &str) -> Self {
        let (primary, sub) = mime_type.split_once('/').unwrap_or((mime_type, ""));
        match primary {
            "audio" => FileType::Audio,
            "image" => FileType::Image,
            "video" => FileType::Video,
            "text" => FileType::Document,
            "application" if is_office_or_pdf(sub) => FileType::Document,
            _ => FileType::Binary,
        }
    }
}

fn is_office_or_pdf(sub: &str) -> bool {
    matches!(
        sub,
        "pdf"
            | "msword"
            | "rtf"
            | "vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "vnd.openxmlformats-officedocument.presentationml.presentation"
            | "vnd.ms-excel"
            | "vnd.ms-powerpoint"
    )
}

/// Lifecycle state of a file. Trashed dominates starred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Active,
    Starred,
    Trashed,
}

/// A file's catalog row.
///
/// `is_deleted` and `deleted_at` always move together; see [`FileUpdate::deleted_at`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub owner_id: String,
    pub filename: String,
    pub storage_path: String,
    pub mime_type: String,
    pub file_type: FileType,
    pub byte_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub is_starred: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_shared: bool,
}

impl FileRecord {
    pub fn state(&self) -> FileState {
        if self.is_deleted {
            FileState::Trashed
        } else if self.is_starred {
            FileState::Starred
        } else {
            FileState::Active
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.is_deleted
    }
}

/// Mutable fields of a [`FileRecord`]. Immutable fields (owner, storage path, size,
/// creation time) have no counterpart here.
#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    pub filename: Option<String>,
    pub is_starred: Option<bool>,
    /// `Value` moves the file to the trash, `Null` restores it.
    pub deleted_at: Patch<DateTime<Utc>>,
}

/// Which slice of an owner's files a listing returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileView {
    /// Everything not in the trash
    #[default]
    All,
    Starred,
    Trash,
    Shared,
}

impl FileView {
    pub fn matches(&self, file: &FileRecord) -> bool {
        match self {
            FileView::All => !file.is_deleted,
            FileView::Starred => !file.is_deleted && file.is_starred,
            FileView::Trash => file.is_deleted,
            FileView::Shared => !file.is_deleted && file.is_shared,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    Filename,
    Size,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filter and ordering for an owner's file listing.
#[derive(Debug, Clone, Default)]
pub struct FileQuery {
    pub view: FileView,
    /// Case-insensitive filename substring
    pub search: Option<String>,
    pub sort: SortField,
    pub order: SortOrder,
}

/// Totals for an owner's stored bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    pub active_bytes: u64,
    pub active_files: u64,
    pub trashed_bytes: u64,
    pub trashed_files: u64,
}

impl StorageUsage {
    pub fn total_bytes(&self) -> u64 {
        self.active_bytes + self.trashed_bytes
    }
}

/// A time/password-limited access grant for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareGrant {
    pub id: String,
    pub file_id: String,
    pub owner_id: String,
    pub access_token: String,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShareGrant {
    pub fn is_password_protected(&self) -> bool {
        self.password_hash.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}
