pub const FIELDSYNC_REDB_FILENAME: &str = "fieldsync.redb";
pub const CURRENT_SCHEMA: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbState {
    Missing,
    Valid,
    Busy,
    Corrupt,
    NewerSchema { found: u32, supported: u32 },
}

/// String-valued key/value storage. Values are serialized JSON.
///
/// Implementations must make each call atomic on its own; callers that need a
/// read-modify-write across calls serialize it themselves.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, crate::StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), crate::StorageError>;
    fn remove(&self, key: &str) -> Result<(), crate::StorageError>;
    /// All keys currently stored, sorted.
    fn keys(&self) -> Result<Vec<String>, crate::StorageError>;
}
