//! Shared test helpers for in-crate tests.

use std::sync::Arc;

use crate::config::{Config, LifecycleConfig, ServerConfig, StorageConfig};
use crate::manager::{LifecycleManager, ShareManager};
use crate::object_store::{LocalStore, ObjectStore};
use crate::storage::Database;
use crate::AppState;

/// Create a test AppState with a temporary database and local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    test_state_with(temp_dir, |_| {})
}

/// Like [`test_state`], with a hook to adjust the config first.
pub fn test_state_with(
    temp_dir: &tempfile::TempDir,
    adjust: impl FnOnce(&mut Config),
) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("files");

    let mut config = Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        storage: StorageConfig {
            local_storage_path: files_dir.to_string_lossy().to_string(),
        },
        lifecycle: LifecycleConfig {
            max_upload_size: 1024 * 1024, // 1MiB for tests
            trash_retention_days: 30,
        },
        share_base_url: Some("https://fileo.test".to_string()),
        maintenance_routes: true,
    };
    adjust(&mut config);

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let object_store: Arc<dyn ObjectStore> =
        Arc::new(LocalStore::new(&files_dir).expect("Failed to create test object store"));

    Arc::new(AppState {
        files: LifecycleManager::new(db.clone(), Arc::clone(&object_store), &config.lifecycle),
        shares: ShareManager::new(db, object_store),
        config,
    })
}
