use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::StorageError;

/// Every queue and cache value is a single JSON array.
pub fn encode_array<T: Serialize>(items: &[T]) -> Result<String, StorageError> {
    Ok(serde_json::to_string(items)?)
}

/// A missing value decodes to an empty array.
pub fn decode_array<T: DeserializeOwned>(raw: Option<&str>) -> Result<Vec<T>, StorageError> {
    match raw {
        None => Ok(Vec::new()),
        Some(s) if s.trim().is_empty() => Ok(Vec::new()),
        Some(s) => Ok(serde_json::from_str(s)?),
    }
}
