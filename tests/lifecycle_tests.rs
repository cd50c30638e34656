use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use fileo::config::LifecycleConfig;
use fileo::manager::{LifecycleManager, RemovalReport, ServiceError};
use fileo::storage::OWNER_FILES;
use redb::TableDefinition;
use fileo::object_store::{LocalStore, ObjectStore, ObjectStoreError};
use fileo::storage::models::{FileQuery, FileState, FileView};
use fileo::storage::Database;

/// Local store whose writes, or deletes of chosen keys, can be made to fail.
struct FlakyStore {
    inner: LocalStore,
    failing_puts: AtomicBool,
    failing_deletes: Mutex<HashSet<String>>,
}

impl FlakyStore {
    fn fail_puts(&self) {
        self.failing_puts.store(true, Ordering::SeqCst);
    }

    fn fail_delete(&self, key: &str) {
        self.failing_deletes.lock().unwrap().insert(key.to_string());
    }

    fn heal(&self) {
        self.failing_deletes.lock().unwrap().clear();
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        if self.failing_puts.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Backend("simulated outage".to_string()));
        }
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        if self.failing_deletes.lock().unwrap().contains(key) {
            return Err(ObjectStoreError::Backend("simulated outage".to_string()));
        }
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        self.inner.list(prefix).await
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    db: Database,
    store: Arc<FlakyStore>,
    files: LifecycleManager,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    let store = Arc::new(FlakyStore {
        inner: LocalStore::new(dir.path().join("files")).unwrap(),
        failing_puts: AtomicBool::new(false),
        failing_deletes: Mutex::new(HashSet::new()),
    });
    let config = LifecycleConfig {
        max_upload_size: 10 * 1024 * 1024,
        trash_retention_days: 30,
    };
    let files = LifecycleManager::new(db.clone(), store.clone(), &config);
    Fixture {
        _dir: dir,
        db,
        store,
        files,
    }
}

async fn upload(fx: &Fixture, owner: &str, filename: &str, size: usize) -> String {
    let outcome = fx
        .files
        .create(owner, filename, None, Bytes::from(vec![b'x'; size]))
        .await
        .unwrap();
    assert!(outcome.metadata_error.is_none());
    outcome.file.id
}

async fn has_blob(fx: &Fixture, key: &str) -> bool {
    match fx.store.get(key).await {
        Ok(_) => true,
        Err(ObjectStoreError::NotFound(_)) => false,
        Err(e) => panic!("unexpected store error: {e}"),
    }
}

fn trash_query() -> FileQuery {
    FileQuery {
        view: FileView::Trash,
        ..Default::default()
    }
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_stores_blob_then_record() {
    let fx = fixture();
    let outcome = fx
        .files
        .create("u1", " report.pdf ", None, Bytes::from_static(b"%PDF"))
        .await
        .unwrap();
    let file = outcome.file;

    assert_eq!(file.owner_id, "u1");
    assert_eq!(file.filename, "report.pdf");
    assert_eq!(file.mime_type, "application/pdf");
    assert_eq!(file.byte_size, 4);
    assert_eq!(file.state(), FileState::Active);
    assert!(!file.is_starred && !file.is_shared && file.deleted_at.is_none());
    assert!(file.storage_path.starts_with("u1/"));
    assert!(file.storage_path.ends_with(".pdf"));

    assert_eq!(fx.db.get_file(&file.id).unwrap(), Some(file.clone()));
    assert_eq!(
        fx.store.get(&file.storage_path).await.unwrap(),
        Bytes::from_static(b"%PDF")
    );
}

#[tokio::test]
async fn test_same_filename_gets_distinct_paths() {
    let fx = fixture();
    let a = upload(&fx, "u1", "photo.png", 8).await;
    let b = upload(&fx, "u1", "photo.png", 8).await;

    let a = fx.db.get_file(&a).unwrap().unwrap();
    let b = fx.db.get_file(&b).unwrap().unwrap();
    assert_ne!(a.storage_path, b.storage_path);
}

#[tokio::test]
async fn test_create_validates_before_writing() {
    let fx = fixture();

    let too_big = fx
        .files
        .create(
            "u1",
            "big.pdf",
            None,
            Bytes::from(vec![0u8; 10 * 1024 * 1024 + 1]),
        )
        .await;
    assert!(matches!(
        too_big,
        Err(ServiceError::PayloadTooLarge { limit }) if limit == 10 * 1024 * 1024
    ));

    let bad_type = fx
        .files
        .create("u1", "tool.exe", Some("application/x-msdownload"), Bytes::from_static(b"MZ"))
        .await;
    assert!(matches!(bad_type, Err(ServiceError::InvalidArgument(_))));

    let no_name = fx
        .files
        .create("u1", "   ", Some("text/plain"), Bytes::from_static(b"hi"))
        .await;
    assert!(matches!(no_name, Err(ServiceError::InvalidArgument(_))));

    assert!(fx.db.get_files_by_owner("u1").unwrap().is_empty());
}

#[tokio::test]
async fn test_create_blob_failure_creates_nothing() {
    let fx = fixture();
    fx.store.fail_puts();

    let result = fx
        .files
        .create("u1", "report.pdf", None, Bytes::from_static(b"%PDF"))
        .await;
    assert!(matches!(result, Err(ServiceError::UploadFailed(_))));

    assert!(fx.db.get_files_by_owner("u1").unwrap().is_empty());
    assert!(fx.db.get_all_files().unwrap().is_empty());
    assert!(fx.store.list("").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_record_failure_still_succeeds() {
    let fx = fixture();

    // Swap the owner index for a table of another type so the record write fails
    let txn = fx.db.begin_write().unwrap();
    txn.delete_table(OWNER_FILES).unwrap();
    txn.open_table(TableDefinition::<&str, u64>::new("owner_files"))
        .unwrap();
    txn.commit().unwrap();

    let outcome = fx
        .files
        .create("u1", "report.pdf", None, Bytes::from_static(b"%PDF"))
        .await
        .unwrap();

    assert!(outcome.metadata_error.is_some());
    assert_eq!(outcome.file.owner_id, "u1");
    assert!(fx.db.get_file(&outcome.file.id).unwrap().is_none());
    assert_eq!(
        fx.store.get(&outcome.file.storage_path).await.unwrap(),
        Bytes::from_static(b"%PDF")
    );
}

#[tokio::test]
async fn test_create_accepts_exact_size_limit() {
    let fx = fixture();
    let id = upload(&fx, "u1", "limit.txt", 10 * 1024 * 1024).await;
    assert_eq!(
        fx.db.get_file(&id).unwrap().unwrap().byte_size,
        10 * 1024 * 1024
    );
}

// ============================================================================
// Ownership
// ============================================================================

#[tokio::test]
async fn test_cross_owner_access_is_forbidden() {
    let fx = fixture();
    let id = upload(&fx, "u1", "mine.pdf", 16).await;

    assert!(matches!(fx.files.get("u2", &id), Err(ServiceError::Forbidden)));
    assert!(matches!(
        fx.files.rename("u2", &id, "x.pdf"),
        Err(ServiceError::Forbidden)
    ));
    assert!(matches!(
        fx.files.star("u2", &id, true),
        Err(ServiceError::Forbidden)
    ));
    assert!(matches!(fx.files.trash("u2", &id), Err(ServiceError::Forbidden)));
    assert!(matches!(
        fx.files.download("u2", &id).await,
        Err(ServiceError::Forbidden)
    ));

    assert!(matches!(
        fx.files.get("u1", "no-such-id"),
        Err(ServiceError::NotFound)
    ));
    assert!(fx.files.list("u2", &FileQuery::default()).unwrap().is_empty());
}

// ============================================================================
// Transitions
// ============================================================================

#[tokio::test]
async fn test_rename_is_metadata_only() {
    let fx = fixture();
    let id = upload(&fx, "u1", "draft.txt", 16).await;
    let before = fx.db.get_file(&id).unwrap().unwrap();

    let renamed = fx.files.rename("u1", &id, "final.txt").unwrap();
    assert_eq!(renamed.filename, "final.txt");
    assert_eq!(renamed.storage_path, before.storage_path);
    assert_eq!(renamed.byte_size, before.byte_size);

    assert!(matches!(
        fx.files.rename("u1", &id, "  "),
        Err(ServiceError::InvalidArgument(_))
    ));
    assert!(matches!(
        fx.files.rename("u1", "missing", "x"),
        Err(ServiceError::NotFound)
    ));
}

#[tokio::test]
async fn test_star_is_idempotent() {
    let fx = fixture();
    let id = upload(&fx, "u1", "a.png", 16).await;

    let once = fx.files.star("u1", &id, true).unwrap();
    let twice = fx.files.star("u1", &id, true).unwrap();
    assert!(once.is_starred && twice.is_starred);
    assert_eq!(once, twice);

    let off = fx.files.star("u1", &id, false).unwrap();
    assert_eq!(off.state(), FileState::Active);
}

#[tokio::test]
async fn test_trash_and_restore_are_idempotent() {
    let fx = fixture();
    let id = upload(&fx, "u1", "a.png", 16).await;

    let trashed = fx.files.trash("u1", &id).unwrap();
    assert_eq!(trashed.state(), FileState::Trashed);
    assert!(trashed.deleted_at.is_some());

    let again = fx.files.trash("u1", &id).unwrap();
    assert_eq!(again, trashed);

    let restored = fx.files.restore("u1", &id).unwrap();
    assert_eq!(restored.state(), FileState::Active);
    assert!(restored.deleted_at.is_none());

    let again = fx.files.restore("u1", &id).unwrap();
    assert_eq!(again, restored);
}

#[tokio::test]
async fn test_deleted_at_tracks_trash_state() {
    let fx = fixture();
    let id = upload(&fx, "u1", "a.png", 16).await;

    let check = |fx: &Fixture| {
        let f = fx.db.get_file(&id).unwrap().unwrap();
        assert_eq!(f.deleted_at.is_some(), f.state() == FileState::Trashed);
    };

    check(&fx);
    fx.files.star("u1", &id, true).unwrap();
    check(&fx);
    fx.files.trash("u1", &id).unwrap();
    check(&fx);
    fx.files.restore("u1", &id).unwrap();
    check(&fx);
}

#[tokio::test]
async fn test_report_scenario() {
    let fx = fixture();
    let outcome = fx
        .files
        .create("U1", "report.pdf", None, Bytes::from(vec![7u8; 2_000_000]))
        .await
        .unwrap();
    let f = outcome.file;
    assert_eq!(f.state(), FileState::Active);
    assert!(!f.is_starred);

    let starred = fx.files.star("U1", &f.id, true).unwrap();
    assert!(starred.is_starred);

    let trashed = fx.files.trash("U1", &f.id).unwrap();
    assert_eq!(trashed.state(), FileState::Trashed);
    assert!(trashed.is_starred, "trash leaves the star untouched");
    assert!(trashed.deleted_at.is_some());

    assert!(matches!(
        fx.files.star("U1", &f.id, true),
        Err(ServiceError::InvalidState(_))
    ));

    let restored = fx.files.restore("U1", &f.id).unwrap();
    assert_eq!(restored.deleted_at, None);
    assert!(!restored.is_trashed());

    assert!(matches!(
        fx.files.permanently_delete("U1", &f.id).await,
        Err(ServiceError::InvalidState(_))
    ));
    assert!(has_blob(&fx, &f.storage_path).await);

    fx.files.trash("U1", &f.id).unwrap();
    fx.files.permanently_delete("U1", &f.id).await.unwrap();

    assert!(matches!(
        fx.files.download("U1", &f.id).await,
        Err(ServiceError::NotFound)
    ));
    assert!(!has_blob(&fx, &f.storage_path).await);
}

#[tokio::test]
async fn test_download_works_in_any_state() {
    let fx = fixture();
    let id = upload(&fx, "u1", "notes.txt", 5).await;

    let (file, data) = fx.files.download("u1", &id).await.unwrap();
    assert_eq!(data.len(), 5);
    assert_eq!(file.id, id);

    fx.files.trash("u1", &id).unwrap();
    let (file, _) = fx.files.download("u1", &id).await.unwrap();
    assert!(file.is_trashed());
}

// ============================================================================
// Permanent deletion
// ============================================================================

#[tokio::test]
async fn test_permanent_delete_keeps_record_when_blob_delete_fails() {
    let fx = fixture();
    let id = upload(&fx, "u1", "stuck.pdf", 16).await;
    let path = fx.db.get_file(&id).unwrap().unwrap().storage_path;
    fx.files.trash("u1", &id).unwrap();

    fx.store.fail_delete(&path);
    assert!(matches!(
        fx.files.permanently_delete("u1", &id).await,
        Err(ServiceError::StorageUnavailable(_))
    ));
    let kept = fx.db.get_file(&id).unwrap().unwrap();
    assert!(kept.is_trashed());

    // Retry after the outage succeeds
    fx.store.heal();
    fx.files.permanently_delete("u1", &id).await.unwrap();
    assert!(fx.db.get_file(&id).unwrap().is_none());
}

#[tokio::test]
async fn test_permanent_delete_tolerates_already_missing_blob() {
    let fx = fixture();
    let id = upload(&fx, "u1", "gone.pdf", 16).await;
    let path = fx.db.get_file(&id).unwrap().unwrap().storage_path;
    fx.files.trash("u1", &id).unwrap();

    fx.store.delete(&path).await.unwrap();
    fx.files.permanently_delete("u1", &id).await.unwrap();
    assert!(fx.db.get_file(&id).unwrap().is_none());
}

#[tokio::test]
async fn test_empty_trash_reports_partial_failure() {
    let fx = fixture();
    let a = upload(&fx, "u1", "a.pdf", 16).await;
    let b = upload(&fx, "u1", "b.pdf", 16).await;
    let c = upload(&fx, "u1", "c.pdf", 16).await;
    let kept = upload(&fx, "u1", "kept.pdf", 16).await;
    let other = upload(&fx, "u2", "other.pdf", 16).await;

    for id in [&a, &b, &c] {
        fx.files.trash("u1", id).unwrap();
    }
    fx.files.trash("u2", &other).unwrap();

    let b_path = fx.db.get_file(&b).unwrap().unwrap().storage_path;
    fx.store.fail_delete(&b_path);

    let report = fx.files.empty_trash("u1").await.unwrap();
    assert_eq!(report.deleted, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_ids, vec![b.clone()]);

    let remaining = fx.files.list("u1", &trash_query()).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, b);
    assert!(has_blob(&fx, &b_path).await);

    assert!(fx.db.get_file(&kept).unwrap().is_some());
    assert!(fx.db.get_file(&other).unwrap().is_some());

    // Re-running after the outage finishes the job
    fx.store.heal();
    let report = fx.files.empty_trash("u1").await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.failed, 0);

    let report = fx.files.empty_trash("u1").await.unwrap();
    assert_eq!(report, RemovalReport::default());
}

// ============================================================================
// Retention
// ============================================================================

#[tokio::test]
async fn test_expiring_trash_window() {
    let fx = fixture();
    let id = upload(&fx, "u1", "old.pdf", 16).await;
    upload(&fx, "u1", "active.pdf", 16).await;
    let trashed = fx.files.trash("u1", &id).unwrap();
    let deleted_at = trashed.deleted_at.unwrap();

    // Purge date is 30 days after trashing
    let soon = fx
        .files
        .expiring_trash("u1", Duration::days(3), deleted_at + Duration::days(28))
        .unwrap();
    assert_eq!(soon.len(), 1);
    assert_eq!(soon[0].file.id, id);
    assert_eq!(soon[0].purge_at, deleted_at + Duration::days(30));

    let not_yet = fx
        .files
        .expiring_trash("u1", Duration::days(3), deleted_at + Duration::days(10))
        .unwrap();
    assert!(not_yet.is_empty());
}

#[tokio::test]
async fn test_purge_expired_trash_across_owners() {
    let fx = fixture();
    let a = upload(&fx, "u1", "a.pdf", 16).await;
    let b = upload(&fx, "u2", "b.pdf", 16).await;
    let active = upload(&fx, "u1", "active.pdf", 16).await;
    fx.files.trash("u1", &a).unwrap();
    fx.files.trash("u2", &b).unwrap();

    let report = fx.files.purge_expired_trash(Utc::now()).await.unwrap();
    assert_eq!(report.deleted, 0, "nothing has passed retention yet");

    let later = Utc::now() + Duration::days(31);
    let report = fx.files.purge_expired_trash(later).await.unwrap();
    assert_eq!(report.deleted, 2);
    assert!(fx.db.get_file(&a).unwrap().is_none());
    assert!(fx.db.get_file(&b).unwrap().is_none());
    assert!(fx.db.get_file(&active).unwrap().is_some());
}

#[tokio::test]
async fn test_usage_counts_trash_separately() {
    let fx = fixture();
    let a = upload(&fx, "u1", "a.pdf", 100).await;
    upload(&fx, "u1", "b.pdf", 50).await;
    fx.files.trash("u1", &a).unwrap();

    let usage = fx.files.usage("u1").unwrap();
    assert_eq!(usage.active_bytes, 50);
    assert_eq!(usage.trashed_bytes, 100);
    assert_eq!(usage.total_bytes(), 150);
}

#[tokio::test]
async fn test_sweep_removes_only_stale_orphans() {
    let fx = fixture();
    let kept = upload(&fx, "u1", "kept.pdf", 16).await;
    let kept_path = fx.db.get_file(&kept).unwrap().unwrap().storage_path;

    let now = Utc::now();
    let stale = format!("u1/{}-orphan.pdf", (now - Duration::hours(2)).timestamp_millis());
    let fresh = format!("u1/{}-inflight.pdf", now.timestamp_millis());
    for key in [&stale, &fresh] {
        fx.store.put(key, Bytes::from_static(b"x")).await.unwrap();
    }
    fx.store
        .put("u1/handmade.pdf", Bytes::from_static(b"x"))
        .await
        .unwrap();

    let report = fx.files.sweep_orphaned_blobs(now).await.unwrap();
    assert_eq!(report.scanned, 4);
    assert_eq!(report.removed, 1);
    assert!(report.failed_keys.is_empty());

    assert!(!has_blob(&fx, &stale).await);
    assert!(has_blob(&fx, &fresh).await);
    assert!(has_blob(&fx, &kept_path).await);
    assert!(has_blob(&fx, "u1/handmade.pdf").await);

    // Once past the grace period the in-flight orphan goes too; trashed files keep their blobs
    fx.files.trash("u1", &kept).unwrap();
    let report = fx
        .files
        .sweep_orphaned_blobs(now + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(report.removed, 1, "only the formerly fresh orphan goes");
    assert!(has_blob(&fx, &kept_path).await);
}
