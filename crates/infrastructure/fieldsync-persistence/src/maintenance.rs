use camino::Utf8Path;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{KeyValueStore, StorageError};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn quarantine_suffix() -> String {
    let ts = Utc::now().format("%Y%m%dT%H%M%S%.f").to_string();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("corrupt.{ts}.{}.{n}", std::process::id())
}

pub fn quarantine_corrupt_file(path: &Utf8Path) -> std::io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let new_name = format!(
        "{}.{}",
        path.file_name().unwrap_or(crate::FIELDSYNC_REDB_FILENAME),
        quarantine_suffix()
    );
    let new_path = path.with_file_name(new_name);
    tracing::warn!("persistence invalid/corrupt, quarantining to {}", new_path);
    std::fs::rename(path, &new_path)?;
    Ok(())
}

/// Copies `raw` to a fresh `<key>.corrupt.*` key and leaves `key` alone.
pub fn set_aside(
    store: &dyn KeyValueStore,
    key: &str,
    raw: &str,
) -> Result<String, StorageError> {
    let new_key = format!("{key}.{}", quarantine_suffix());
    store.set(&new_key, raw)?;
    Ok(new_key)
}

/// Moves an unreadable value aside so the key can start over empty.
///
/// Returns the key the raw value now lives under.
pub fn quarantine_value(
    store: &dyn KeyValueStore,
    key: &str,
    raw: &str,
) -> Result<String, StorageError> {
    let new_key = set_aside(store, key, raw)?;
    tracing::warn!("value under {key} is unreadable, quarantined to {new_key}");
    store.remove(key)?;
    Ok(new_key)
}
