//! The file lifecycle and sharing rules, layered over the catalog and the object store.

mod error;
pub mod lifecycle;
pub mod secret;
pub mod sharing;

pub use error::ServiceError;
pub use lifecycle::{ExpiringFile, LifecycleManager, RemovalReport, SweepReport, UploadOutcome};
pub use sharing::{ShareManager, ShareOptions};
