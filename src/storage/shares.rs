use chrono::Utc;
use redb::{ReadableTable, WriteTransaction};

use super::db::{read_row, write_row, Database, DatabaseError};
use super::models::{FileRecord, ShareGrant};
use super::tables::*;

impl Database {
    // ========================================================================
    // Share operations
    // ========================================================================

    /// Store a grant as the file's only grant.
    ///
    /// Any previous grant for the same file is replaced: its token stops resolving, and the
    /// file's `is_shared` flag is set to the new grant's `is_active`, all in one transaction.
    pub fn put_share(&self, grant: &ShareGrant) -> Result<(), DatabaseError> {
        debug_assert!(!grant.access_token.is_empty(), "access token must not be empty");

        let write_txn = self.begin_write()?;
        {
            let previous_id: Option<String> = {
                let file_shares = write_txn.open_table(FILE_SHARES)?;
                let result = file_shares
                    .get(grant.file_id.as_str())?
                    .map(|v| v.value().to_string());
                result
            };

            if let Some(previous_id) = previous_id {
                let mut shares = write_txn.open_table(SHARES)?;
                let previous: Option<ShareGrant> = read_row(&shares, &previous_id)?;
                if previous_id != grant.id {
                    shares.remove(previous_id.as_str())?;
                }
                drop(shares);

                if let Some(previous) = previous {
                    if previous.access_token != grant.access_token {
                        let mut tokens = write_txn.open_table(SHARE_TOKENS)?;
                        tokens.remove(previous.access_token.as_str())?;
                    }
                }
            }

            let mut shares = write_txn.open_table(SHARES)?;
            write_row(&mut shares, &grant.id, grant)?;

            let mut tokens = write_txn.open_table(SHARE_TOKENS)?;
            tokens.insert(grant.access_token.as_str(), grant.id.as_str())?;

            let mut file_shares = write_txn.open_table(FILE_SHARES)?;
            file_shares.insert(grant.file_id.as_str(), grant.id.as_str())?;
        }
        set_file_shared(&write_txn, &grant.file_id, grant.is_active)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Get a grant by its access token (resolves token -> uuid -> grant)
    pub fn get_share_by_token(&self, token: &str) -> Result<Option<ShareGrant>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let tokens = read_txn.open_table(SHARE_TOKENS)?;

        let id = match tokens.get(token)? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let shares = read_txn.open_table(SHARES)?;
        read_row(&shares, &id)
    }

    /// Get the grant attached to a file, active or not
    pub fn get_share_for_file(&self, file_id: &str) -> Result<Option<ShareGrant>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let file_shares = read_txn.open_table(FILE_SHARES)?;

        let id = match file_shares.get(file_id)? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let shares = read_txn.open_table(SHARES)?;
        read_row(&shares, &id)
    }

    /// Mark a grant inactive and clear its file's `is_shared` flag.
    ///
    /// Returns the deactivated grant, or `None` if it does not exist.
    pub fn deactivate_share(&self, id: &str) -> Result<Option<ShareGrant>, DatabaseError> {
        self.deactivate_matching(id, None)
    }

    /// Deactivate a grant only while it still carries `token`.
    ///
    /// A grant replaced after `token` was looked up keeps its new token active, and `None`
    /// is returned.
    pub fn deactivate_share_if_token(
        &self,
        id: &str,
        token: &str,
    ) -> Result<Option<ShareGrant>, DatabaseError> {
        self.deactivate_matching(id, Some(token))
    }

    fn deactivate_matching(
        &self,
        id: &str,
        token: Option<&str>,
    ) -> Result<Option<ShareGrant>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let deactivated = {
            let mut shares = write_txn.open_table(SHARES)?;
            let existing: Option<ShareGrant> = read_row(&shares, id)?;
            match existing {
                Some(mut grant) if token.map_or(true, |t| grant.access_token == t) => {
                    grant.is_active = false;
                    grant.updated_at = Utc::now();
                    write_row(&mut shares, id, &grant)?;
                    Some(grant)
                }
                _ => None,
            }
        };

        if let Some(ref grant) = deactivated {
            set_file_shared(&write_txn, &grant.file_id, false)?;
        }

        write_txn.commit()?;
        Ok(deactivated)
    }
}

/// Remove a file's grant and its token entry. Used when the file itself is deleted.
pub(super) fn remove_share_for_file(
    write_txn: &WriteTransaction,
    file_id: &str,
) -> Result<(), DatabaseError> {
    let grant_id = {
        let mut file_shares = write_txn.open_table(FILE_SHARES)?;
        let removed = file_shares.remove(file_id)?.map(|v| v.value().to_string());
        removed
    };

    let Some(grant_id) = grant_id else {
        return Ok(());
    };

    let grant: Option<ShareGrant> = {
        let mut shares = write_txn.open_table(SHARES)?;
        let grant = read_row(&shares, &grant_id)?;
        shares.remove(grant_id.as_str())?;
        grant
    };

    if let Some(grant) = grant {
        let mut tokens = write_txn.open_table(SHARE_TOKENS)?;
        tokens.remove(grant.access_token.as_str())?;
    }

    Ok(())
}

fn set_file_shared(
    write_txn: &WriteTransaction,
    file_id: &str,
    shared: bool,
) -> Result<(), DatabaseError> {
    let mut files = write_txn.open_table(FILES)?;
    let existing: Option<FileRecord> = read_row(&files, file_id)?;
    if let Some(mut file) = existing {
        if file.is_shared != shared {
            file.is_shared = shared;
            file.updated_at = Utc::now();
            write_row(&mut files, file_id, &file)?;
        }
    }
    Ok(())
}
