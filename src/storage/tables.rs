use redb::TableDefinition;

/// File records: uuid -> FileRecord (msgpack)
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Owner index: owner_id -> msgpack Vec of file UUIDs
pub const OWNER_FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("owner_files");

/// Share grants: grant uuid -> ShareGrant (msgpack)
pub const SHARES: TableDefinition<&str, &[u8]> = TableDefinition::new("shares");

/// Token index: access token -> grant uuid (for public share lookups)
pub const SHARE_TOKENS: TableDefinition<&str, &str> = TableDefinition::new("share_tokens");

/// File index: file uuid -> grant uuid (one grant per file)
pub const FILE_SHARES: TableDefinition<&str, &str> = TableDefinition::new("file_shares");
