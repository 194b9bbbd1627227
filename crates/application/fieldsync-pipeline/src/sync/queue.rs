//! Per-kind FIFO queues of records waiting for the remote store.
//!
//! Each queue is one JSON array under the kind's key. Entries are kept as raw
//! JSON so a record written by a newer build is carried along untouched
//! instead of being lost on the next rewrite. Entries that are simply broken
//! are moved aside to a `<key>.corrupt.*` key and dropped from the queue.

use std::sync::Arc;

use fieldsync_core::{PendingRecord, RecordKind, RECORD_SCHEMA_VERSION};
use fieldsync_persistence::{
    decode_array, encode_array, quarantine_value, set_aside, KeyValueStore, StorageError,
};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum QueueEntry {
    Ready(PendingRecord),
    /// Written by a newer build and not decodable by this one.
    Foreign {
        id: Option<String>,
        schema_version: Option<u64>,
        error: String,
    },
}

impl QueueEntry {
    fn from_value(value: Value) -> Self {
        let id = value.get("id").and_then(Value::as_str).map(str::to_string);
        let schema_version = schema_version_of(&value);
        match serde_json::from_value::<PendingRecord>(value) {
            Ok(record) => QueueEntry::Ready(record),
            Err(e) => QueueEntry::Foreign {
                id,
                schema_version,
                error: e.to_string(),
            },
        }
    }
}

fn schema_version_of(value: &Value) -> Option<u64> {
    value.get("schemaVersion").and_then(Value::as_u64)
}

/// Whether `value` can stay in a queue: either this build reads it, or a newer
/// build wrote it.
fn check_entry(value: &Value) -> Result<(), serde_json::Error> {
    match serde_json::from_value::<PendingRecord>(value.clone()) {
        Ok(_) => Ok(()),
        Err(_) if schema_version_of(value) > Some(u64::from(RECORD_SCHEMA_VERSION)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Local queue store shared by the submit path and the drain path.
///
/// Every read-modify-write of a key runs under that key's async mutex, so an
/// append racing a removal cannot drop either change.
pub struct LocalQueue {
    store: Arc<dyn KeyValueStore>,
    inspections: Mutex<()>,
    equipment: Mutex<()>,
}

impl LocalQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            inspections: Mutex::new(()),
            equipment: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    fn lock_for(&self, kind: RecordKind) -> &Mutex<()> {
        match kind {
            RecordKind::Inspection => &self.inspections,
            RecordKind::Equipment => &self.equipment,
        }
    }

    // Callers must hold the key's lock.
    fn load(&self, kind: RecordKind) -> Result<Vec<Value>, StorageError> {
        let key = kind.queue_key();
        let raw = self.store.get(key)?;
        let items = match decode_array::<Value>(raw.as_deref()) {
            Ok(items) => items,
            Err(StorageError::Serde(e)) => {
                tracing::warn!("pending {kind} queue is unreadable: {e}");
                if let Some(raw) = raw.as_deref() {
                    quarantine_value(self.store.as_ref(), key, raw)?;
                }
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let before = items.len();
        let mut kept = Vec::with_capacity(before);
        for item in items {
            match check_entry(&item) {
                Ok(()) => kept.push(item),
                Err(e) => {
                    let moved_to =
                        set_aside(self.store.as_ref(), key, &serde_json::to_string(&item)?)?;
                    tracing::warn!(
                        "dropped malformed {kind} queue entry {:?} ({e}), kept under {moved_to}",
                        item.get("id").and_then(serde_json::Value::as_str)
                    );
                }
            }
        }
        if kept.len() != before {
            self.save(kind, &kept)?;
        }
        Ok(kept)
    }

    fn save(&self, kind: RecordKind, items: &[Value]) -> Result<(), StorageError> {
        let key = kind.queue_key();
        if items.is_empty() {
            return self.store.remove(key);
        }
        self.store.set(key, &encode_array(items)?)
    }

    /// Appends `record` to the end of its kind's queue.
    pub async fn append(&self, record: &PendingRecord) -> Result<(), StorageError> {
        let kind = record.kind();
        let _guard = self.lock_for(kind).lock().await;
        let mut items = self.load(kind)?;
        items.push(serde_json::to_value(record)?);
        self.save(kind, &items)?;
        tracing::debug!("queued {kind} record {} ({} pending)", record.id, items.len());
        Ok(())
    }

    /// Current queue contents in append order.
    pub async fn snapshot(&self, kind: RecordKind) -> Result<Vec<QueueEntry>, StorageError> {
        let _guard = self.lock_for(kind).lock().await;
        Ok(self
            .load(kind)?
            .into_iter()
            .map(QueueEntry::from_value)
            .collect())
    }

    /// Records this build can read, in append order.
    pub async fn records(&self, kind: RecordKind) -> Result<Vec<PendingRecord>, StorageError> {
        Ok(self
            .snapshot(kind)
            .await?
            .into_iter()
            .filter_map(|entry| match entry {
                QueueEntry::Ready(record) => Some(record),
                QueueEntry::Foreign { .. } => None,
            })
            .collect())
    }

    /// Removes the record with `id`. Returns false when it was not queued.
    pub async fn remove(&self, kind: RecordKind, id: Uuid) -> Result<bool, StorageError> {
        let _guard = self.lock_for(kind).lock().await;
        let mut items = self.load(kind)?;
        let id = id.to_string();
        let before = items.len();
        items.retain(|item| item.get("id").and_then(Value::as_str) != Some(id.as_str()));
        if items.len() == before {
            return Ok(false);
        }
        self.save(kind, &items)?;
        Ok(true)
    }

    pub async fn len(&self, kind: RecordKind) -> Result<usize, StorageError> {
        let _guard = self.lock_for(kind).lock().await;
        Ok(self.load(kind)?.len())
    }

    pub async fn is_empty(&self, kind: RecordKind) -> Result<bool, StorageError> {
        Ok(self.len(kind).await? == 0)
    }

    pub async fn clear(&self, kind: RecordKind) -> Result<(), StorageError> {
        let _guard = self.lock_for(kind).lock().await;
        self.store.remove(kind.queue_key())
    }
}
