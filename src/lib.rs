//! fileo - file storage and sharing service
//!
//! This crate provides the file lifecycle behind a personal file locker:
//! - Uploads stored as blobs under a per-owner path, cataloged in redb
//! - Star, rename, trash, restore, and permanent deletion with write ordering that never
//!   leaves a record pointing at a missing blob
//! - Share links with rotating tokens, optional password, and lazy expiry
//! - REST API for the presentation layer

pub mod api;
pub mod config;
pub mod manager;
pub mod object_store;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use config::Config;
use manager::{LifecycleManager, ShareManager};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub files: LifecycleManager,
    pub shares: ShareManager,
}
