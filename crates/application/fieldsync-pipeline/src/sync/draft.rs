//! The inspection form in progress, kept locally until it is submitted.

use std::sync::Arc;

use fieldsync_core::{Inspection, DRAFT_INSPECTION_KEY};
use fieldsync_persistence::{quarantine_value, KeyValueStore, StorageError};

use crate::sync::SyncError;

pub struct DraftStore {
    store: Arc<dyn KeyValueStore>,
}

impl DraftStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The saved form, or `None` when nothing is in progress.
    ///
    /// An unreadable draft is quarantined and reads as `None`.
    pub fn load(&self) -> Result<Option<Inspection>, SyncError> {
        let Some(raw) = self.store.get(DRAFT_INSPECTION_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(draft) => Ok(Some(draft)),
            Err(e) => {
                tracing::warn!("saved inspection draft is unreadable: {e}");
                quarantine_value(self.store.as_ref(), DRAFT_INSPECTION_KEY, &raw)?;
                Ok(None)
            }
        }
    }

    pub fn save(&self, draft: &Inspection) -> Result<(), SyncError> {
        let raw = serde_json::to_string(draft).map_err(StorageError::from)?;
        self.store.set(DRAFT_INSPECTION_KEY, &raw)?;
        tracing::debug!("inspection draft saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), SyncError> {
        self.store.remove(DRAFT_INSPECTION_KEY)?;
        Ok(())
    }
}
