use std::cmp::Ordering;

use redb::ReadableTable;

use super::db::{index_add, index_remove, read_row, write_row, Database, DatabaseError};
use super::models::{FileQuery, FileRecord, FileUpdate, Patch, SortField, SortOrder, StorageUsage};
use super::shares::remove_share_for_file;
use super::tables::*;

impl Database {
    // ========================================================================
    // File operations
    // ========================================================================

    /// Store a file record and update the owner index
    pub fn put_file(&self, file: &FileRecord) -> Result<(), DatabaseError> {
        debug_assert!(!file.id.is_empty(), "file id must not be empty");
        debug_assert!(!file.owner_id.is_empty(), "file owner must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(FILES)?;
            write_row(&mut table, &file.id, file)?;

            let mut owner_table = write_txn.open_table(OWNER_FILES)?;
            index_add(&mut owner_table, &file.owner_id, &file.id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a file by its UUID
    pub fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;
        read_row(&table, id)
    }

    /// Get all files belonging to an owner, in no particular order
    pub fn get_files_by_owner(&self, owner_id: &str) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let owner_table = read_txn.open_table(OWNER_FILES)?;
        let files_table = read_txn.open_table(FILES)?;

        let file_ids: Vec<String> = match read_row(&owner_table, owner_id)? {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };

        let mut files = Vec::with_capacity(file_ids.len());
        for file_id in file_ids {
            if let Some(file) = read_row(&files_table, &file_id)? {
                files.push(file);
            }
        }

        Ok(files)
    }

    /// Apply a partial update to a file's mutable fields.
    ///
    /// Returns the updated record, or `None` if the file does not exist. The read and the
    /// write share one transaction, so concurrent updates resolve as last write wins.
    pub fn update_file(
        &self,
        id: &str,
        update: &FileUpdate,
    ) -> Result<Option<FileRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let updated = {
            let mut table = write_txn.open_table(FILES)?;
            let existing: Option<FileRecord> = read_row(&table, id)?;

            match existing {
                Some(mut file) => {
                    if let Some(ref filename) = update.filename {
                        file.filename = filename.clone();
                    }
                    if let Some(starred) = update.is_starred {
                        file.is_starred = starred;
                    }
                    match update.deleted_at {
                        Patch::Absent => {}
                        Patch::Null => {
                            file.is_deleted = false;
                            file.deleted_at = None;
                        }
                        Patch::Value(at) => {
                            file.is_deleted = true;
                            file.deleted_at = Some(at);
                        }
                    }
                    file.updated_at = chrono::Utc::now();

                    write_row(&mut table, id, &file)?;
                    Some(file)
                }
                None => None,
            }
        };

        write_txn.commit()?;
        Ok(updated)
    }

    /// Delete a file by its UUID, cleaning up the owner index and any share grant
    pub fn delete_file(&self, id: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let deleted = delete_file_in(&write_txn, id)?;
        write_txn.commit()?;
        Ok(deleted)
    }

    /// Delete a set of files in one transaction. Ids that no longer exist are skipped.
    /// Returns how many records were removed.
    pub fn delete_files(&self, ids: &[String]) -> Result<u64, DatabaseError> {
        let write_txn = self.begin_write()?;
        let mut deleted = 0;
        for id in ids {
            if delete_file_in(&write_txn, id)? {
                deleted += 1;
            }
        }
        write_txn.commit()?;
        Ok(deleted)
    }

    /// Get all files across owners
    pub fn get_all_files(&self) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        let mut files = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let file: FileRecord = rmp_serde::from_slice(value.value())?;
            files.push(file);
        }

        Ok(files)
    }

    /// List an owner's files filtered and ordered by `query`
    pub fn list_files(
        &self,
        owner_id: &str,
        query: &FileQuery,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut files: Vec<FileRecord> = self
            .get_files_by_owner(owner_id)?
            .into_iter()
            .filter(|f| query.view.matches(f))
            .filter(|f| match needle {
                Some(ref n) => f.filename.to_lowercase().contains(n.as_str()),
                None => true,
            })
            .collect();

        files.sort_by(|a, b| {
            let ordering = compare_by(query.sort, a, b);
            match query.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        Ok(files)
    }

    /// Sum an owner's stored bytes, split by trash state
    pub fn storage_usage(&self, owner_id: &str) -> Result<StorageUsage, DatabaseError> {
        let mut usage = StorageUsage::default();
        for file in self.get_files_by_owner(owner_id)? {
            if file.is_deleted {
                usage.trashed_files += 1;
                usage.trashed_bytes += file.byte_size;
            } else {
                usage.active_files += 1;
                usage.active_bytes += file.byte_size;
            }
        }
        Ok(usage)
    }
}

fn compare_by(sort: SortField, a: &FileRecord, b: &FileRecord) -> Ordering {
    let primary = match sort {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::Filename => a
            .filename
            .to_lowercase()
            .cmp(&b.filename.to_lowercase()),
        SortField::Size => a.byte_size.cmp(&b.byte_size),
    };
    // Tie-break on id so listings are stable between requests
    primary.then_with(|| a.id.cmp(&b.id))
}

fn delete_file_in(write_txn: &redb::WriteTransaction, id: &str) -> Result<bool, DatabaseError> {
    let owner_id = {
        let mut table = write_txn.open_table(FILES)?;
        let existing: Option<FileRecord> = read_row(&table, id)?;
        match existing {
            Some(file) => {
                table.remove(id)?;
                file.owner_id
            }
            None => return Ok(false),
        }
    };

    {
        let mut owner_table = write_txn.open_table(OWNER_FILES)?;
        index_remove(&mut owner_table, &owner_id, id)?;
    }

    remove_share_for_file(write_txn, id)?;
    Ok(true)
}
