//! Read-through mirror of reference collections.

use std::sync::Arc;
use std::time::Duration;

use fieldsync_core::ReferenceKind;
use fieldsync_infra::{ConnectivityProvider, RemoteError, RemoteReader};
use fieldsync_persistence::{
    decode_array, encode_array, quarantine_value, KeyValueStore, StorageError,
};
use serde_json::Value;

use crate::sync::{SyncError, DEFAULT_READ_TIMEOUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// Fetched just now and written to the local mirror.
    Fresh,
    /// Served from the local mirror, possibly empty.
    Cached,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSnapshot {
    pub kind: ReferenceKind,
    pub documents: Vec<Value>,
    pub source: CacheSource,
}

pub struct ReferenceCache {
    store: Arc<dyn KeyValueStore>,
    reader: Arc<dyn RemoteReader>,
    connectivity: Arc<dyn ConnectivityProvider>,
    read_timeout: Duration,
}

impl ReferenceCache {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        reader: Arc<dyn RemoteReader>,
        connectivity: Arc<dyn ConnectivityProvider>,
    ) -> Self {
        Self {
            store,
            reader,
            connectivity,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Local mirror only. Never touches the network.
    pub fn cached(&self, kind: ReferenceKind) -> Result<Vec<Value>, SyncError> {
        let key = kind.cache_key();
        let raw = self.store.get(key)?;
        match decode_array::<Value>(raw.as_deref()) {
            Ok(docs) => Ok(docs),
            Err(StorageError::Serde(e)) => {
                tracing::warn!("cached {kind} snapshot is unreadable: {e}");
                if let Some(raw) = raw.as_deref() {
                    quarantine_value(self.store.as_ref(), key, raw)?;
                }
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch(&self, kind: ReferenceKind) -> Result<Vec<Value>, RemoteError> {
        match tokio::time::timeout(self.read_timeout, self.reader.list_all(kind.collection()))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        }
    }

    /// Fetches `kind` from the remote store and replaces the local mirror.
    ///
    /// Offline or on any remote failure the last mirrored copy is returned
    /// unchanged.
    pub async fn refresh(&self, kind: ReferenceKind) -> Result<ReferenceSnapshot, SyncError> {
        if self.connectivity.is_connected() {
            match self.fetch(kind).await {
                Ok(documents) => {
                    // Fresh data is still usable when the mirror cannot be updated.
                    if let Err(e) = encode_array(&documents)
                        .and_then(|raw| self.store.set(kind.cache_key(), &raw))
                    {
                        tracing::warn!("failed to update cached {kind}: {e}");
                    }
                    tracing::debug!("refreshed {kind}: {} document(s)", documents.len());
                    return Ok(ReferenceSnapshot {
                        kind,
                        documents,
                        source: CacheSource::Fresh,
                    });
                }
                Err(e) => {
                    tracing::warn!("refresh of {kind} failed, using cached copy: {e}");
                }
            }
        }

        Ok(ReferenceSnapshot {
            kind,
            documents: self.cached(kind)?,
            source: CacheSource::Cached,
        })
    }

    pub async fn refresh_all(&self) -> Result<Vec<ReferenceSnapshot>, SyncError> {
        let mut out = Vec::with_capacity(ReferenceKind::ALL.len());
        for kind in ReferenceKind::ALL {
            out.push(self.refresh(kind).await?);
        }
        Ok(out)
    }
}
