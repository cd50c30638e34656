//! Share links: one grant per file, bound to an unguessable token with an optional password
//! and an optional expiry.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::secret::{generate_token, hash_password, verify_password};
use super::ServiceError;
use crate::object_store::ObjectStore;
use crate::storage::models::{FileRecord, ShareGrant};
use crate::storage::Database;

/// Settings for a new or replacement grant.
#[derive(Debug, Clone, Default)]
pub struct ShareOptions {
    pub password: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct ShareManager {
    db: Database,
    object_store: Arc<dyn ObjectStore>,
}

impl ShareManager {
    pub fn new(db: Database, object_store: Arc<dyn ObjectStore>) -> Self {
        Self { db, object_store }
    }

    /// Look up a file and check the caller owns it.
    fn owned_file(&self, caller_id: &str, file_id: &str) -> Result<FileRecord, ServiceError> {
        let file = self.db.get_file(file_id)?.ok_or(ServiceError::NotFound)?;
        if file.owner_id != caller_id {
            return Err(ServiceError::Forbidden);
        }
        Ok(file)
    }

    pub fn create_or_replace(
        &self,
        caller_id: &str,
        file_id: &str,
        options: ShareOptions,
    ) -> Result<ShareGrant, ServiceError> {
        self.create_or_replace_at(caller_id, file_id, options, Utc::now())
    }

    /// Issue a grant for a file, replacing any existing one.
    ///
    /// The replacement keeps the grant id but always gets a fresh token, so links handed out
    /// for the previous grant stop resolving.
    pub fn create_or_replace_at(
        &self,
        caller_id: &str,
        file_id: &str,
        options: ShareOptions,
        now: DateTime<Utc>,
    ) -> Result<ShareGrant, ServiceError> {
        let file = self.owned_file(caller_id, file_id)?;
        if file.is_trashed() {
            return Err(ServiceError::invalid_state(
                "files in the trash cannot be shared",
            ));
        }

        let password_hash = match options.password {
            Some(ref password) if password.is_empty() => {
                return Err(ServiceError::invalid_argument(
                    "share password must not be empty",
                ));
            }
            Some(ref password) => Some(hash_password(password)?),
            None => None,
        };

        if let Some(expires_at) = options.expires_at {
            if expires_at <= now {
                return Err(ServiceError::invalid_argument(
                    "share expiry must be in the future",
                ));
            }
        }

        let previous = self.db.get_share_for_file(file_id)?;
        let grant = ShareGrant {
            id: previous
                .as_ref()
                .map(|g| g.id.clone())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            file_id: file.id.clone(),
            owner_id: file.owner_id.clone(),
            access_token: generate_token()?,
            password_hash,
            expires_at: options.expires_at,
            is_active: true,
            created_at: previous.as_ref().map(|g| g.created_at).unwrap_or(now),
            updated_at: now,
        };

        self.db.put_share(&grant)?;
        tracing::debug!(
            file_id = %file_id,
            replaced = previous.is_some(),
            protected = grant.is_password_protected(),
            "Issued share grant"
        );
        Ok(grant)
    }

    /// The file's current grant, if it has ever been shared.
    pub fn grant_for(
        &self,
        caller_id: &str,
        file_id: &str,
    ) -> Result<Option<ShareGrant>, ServiceError> {
        self.owned_file(caller_id, file_id)?;
        Ok(self.db.get_share_for_file(file_id)?)
    }

    pub fn resolve(
        &self,
        token: &str,
        password: Option<&str>,
    ) -> Result<FileRecord, ServiceError> {
        self.resolve_at(token, password, Utc::now())
    }

    /// Resolve a public token to the shared file. No ownership is required.
    ///
    /// An expired grant is deactivated on first discovery, so it never resolves again.
    pub fn resolve_at(
        &self,
        token: &str,
        password: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<FileRecord, ServiceError> {
        let grant = self
            .db
            .get_share_by_token(token)?
            .filter(|g| g.is_active)
            .ok_or(ServiceError::NotFound)?;

        if grant.is_expired_at(now) {
            // Matched on the token so a replacement issued meanwhile stays active
            self.db.deactivate_share_if_token(&grant.id, token)?;
            tracing::debug!(file_id = %grant.file_id, "Share grant expired");
            return Err(ServiceError::Expired);
        }

        if let Some(ref hash) = grant.password_hash {
            let supplied = password.ok_or(ServiceError::PasswordRequired)?;
            if !verify_password(supplied, hash) {
                return Err(ServiceError::Forbidden);
            }
        }

        // A trashed file keeps its grant but is not served until restored
        self.db
            .get_file(&grant.file_id)?
            .filter(|f| !f.is_trashed())
            .ok_or(ServiceError::NotFound)
    }

    /// Resolve a token and read the shared file's bytes.
    pub async fn resolve_content(
        &self,
        token: &str,
        password: Option<&str>,
    ) -> Result<(FileRecord, Bytes), ServiceError> {
        let file = self.resolve(token, password)?;
        let data = self.object_store.get(&file.storage_path).await?;
        Ok((file, data))
    }

    /// Deactivate the file's grant, if any, and clear its shared flag.
    pub fn revoke(&self, caller_id: &str, file_id: &str) -> Result<(), ServiceError> {
        self.owned_file(caller_id, file_id)?;

        match self.db.get_share_for_file(file_id)? {
            Some(grant) if grant.is_active => {
                self.db.deactivate_share(&grant.id)?;
                tracing::debug!(file_id = %file_id, "Revoked share grant");
            }
            _ => {}
        }
        Ok(())
    }
}
