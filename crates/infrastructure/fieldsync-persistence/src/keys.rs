pub fn validate_key(key: &str) -> Result<(), crate::StorageError> {
    if key.is_empty() || key.trim() != key || key.chars().any(char::is_control) {
        return Err(crate::StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
