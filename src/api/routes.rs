use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.lifecycle.max_upload_size as usize + MULTIPART_OVERHEAD;

    let mut router = Router::new()
        // Files
        .route("/files", get(handlers::list_files))
        .route(
            "/files",
            post(handlers::create_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/files/:id", get(handlers::get_file))
        .route("/files/:id", put(handlers::rename_file))
        .route("/files/:id", delete(handlers::delete_file))
        .route("/files/:id/content", get(handlers::download_file))
        .route("/files/:id/star", put(handlers::star_file))
        .route("/files/:id/trash", post(handlers::trash_file))
        .route("/files/:id/restore", post(handlers::restore_file))
        // Sharing (owner)
        .route("/files/:id/share", get(handlers::get_share))
        .route("/files/:id/share", put(handlers::put_share))
        .route("/files/:id/share", delete(handlers::revoke_share))
        // Trash
        .route("/trash", delete(handlers::empty_trash))
        .route("/trash/expiring", get(handlers::expiring_trash))
        .route("/usage", get(handlers::storage_usage))
        // Sharing (public)
        .route("/share/:token", get(handlers::resolve_share))
        .route("/share/:token/content", get(handlers::download_share))
        // Internal
        .route("/_internal/health", get(handlers::health));

    if state.config.maintenance_routes {
        tracing::info!("Maintenance routes enabled under /_internal");
        router = router
            .route(
                "/_internal/trash/purge",
                post(handlers::purge_expired_trash),
            )
            .route(
                "/_internal/blobs/sweep",
                post(handlers::sweep_orphaned_blobs),
            );
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
