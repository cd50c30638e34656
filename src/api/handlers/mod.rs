mod admin;
mod files;
mod shares;
mod trash;

pub use admin::{health, purge_expired_trash, sweep_orphaned_blobs};
pub use files::{
    create_file, delete_file, download_file, get_file, list_files, rename_file, restore_file,
    star_file, storage_usage, trash_file,
};
pub use shares::{download_share, get_share, put_share, resolve_share, revoke_share};
pub use shares::SHARE_PASSWORD_HEADER;
pub use trash::{empty_trash, expiring_trash};
