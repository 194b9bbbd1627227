use std::time::Duration;

use fieldsync_core::{PendingRecord, RecordKind, ValidationError};
use fieldsync_infra::RemoteError;
use fieldsync_persistence::StorageError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod cache;
pub mod draft;
pub mod engine;
pub mod queue;

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Upper bound for one remote write. Elapsing counts as a retryable failure.
    pub write_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Where a submitted record ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Acknowledged by the remote store; nothing kept locally.
    Delivered { id: Uuid },
    /// Offline at submit time.
    QueuedOffline { id: Uuid },
    /// The remote write failed in a way that may succeed later.
    QueuedAfterFailure { id: Uuid, reason: String },
}

impl SubmitOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            SubmitOutcome::Delivered { id }
            | SubmitOutcome::QueuedOffline { id }
            | SubmitOutcome::QueuedAfterFailure { id, .. } => *id,
        }
    }

    pub fn is_queued(&self) -> bool {
        !matches!(self, SubmitOutcome::Delivered { .. })
    }

    /// Confirmation shown to the user. Queuing is not an error.
    pub fn notice(&self) -> &'static str {
        match self {
            SubmitOutcome::Delivered { .. } => "saved",
            SubmitOutcome::QueuedOffline { .. } | SubmitOutcome::QueuedAfterFailure { .. } => {
                "saved locally, will sync"
            }
        }
    }
}

/// Record dropped from a queue because the remote store will never accept it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedRecord {
    pub id: Uuid,
    pub status: Option<u16>,
    pub reason: String,
}

/// Why a drain stopped before reaching the end of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrainHalt {
    Offline,
    /// Retryable remote failure; this record and everything after it stay queued.
    Retryable { id: Uuid, reason: String },
    /// Entry written by a newer build; left in place.
    Unsupported { id: Option<String>, schema_version: Option<u64> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub kind: RecordKind,
    pub attempted: usize,
    pub delivered: usize,
    pub remaining: usize,
    pub dropped: Vec<DroppedRecord>,
    /// Another drain of the same queue was already running; nothing was done.
    pub busy: bool,
    pub halted: Option<DrainHalt>,
}

impl DrainReport {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            attempted: 0,
            delivered: 0,
            remaining: 0,
            dropped: Vec::new(),
            busy: false,
            halted: None,
        }
    }

    pub fn busy(kind: RecordKind) -> Self {
        Self {
            busy: true,
            ..Self::new(kind)
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.busy && self.halted.is_none() && self.remaining == 0
    }

    /// Optional notice for the user. Retryable failures stay silent.
    pub fn notice(&self) -> Option<String> {
        let mut parts = Vec::new();
        if self.delivered > 0 {
            parts.push(format!("{} {} record(s) synced", self.delivered, self.kind));
        }
        if !self.dropped.is_empty() {
            parts.push(format!(
                "{} {} record(s) rejected by the server and discarded",
                self.dropped.len(),
                self.kind
            ));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("local storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("invalid record: {0}")]
    Invalid(#[from] ValidationError),
    #[error("remote store rejected record {}: {source}", record.id)]
    Rejected {
        record: Box<PendingRecord>,
        source: RemoteError,
    },
    #[error("only admins may {0}")]
    Forbidden(&'static str),
    #[error("no pending {kind} record with id {id}")]
    NotFound { kind: RecordKind, id: Uuid },
    #[error("remote error: {0}")]
    Remote(RemoteError),
}

pub use cache::{CacheSource, ReferenceCache, ReferenceSnapshot};
pub use draft::DraftStore;
pub use engine::SyncEngine;
pub use queue::{LocalQueue, QueueEntry};
