use std::sync::Arc;

use fieldsync_core::validate::{validate_payload, validate_session};
use fieldsync_core::{PendingRecord, RecordKind, RecordPayload, SessionContext};
use fieldsync_infra::{ConnectivityProvider, RemoteError, RemoteWriter};
use fieldsync_persistence::KeyValueStore;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::sync::queue::{LocalQueue, QueueEntry};
use crate::sync::{DrainHalt, DrainReport, DroppedRecord, SubmitOutcome, SyncError, SyncOptions};

/// Decides where new records go and replays queued ones.
pub struct SyncEngine {
    queue: LocalQueue,
    writer: Arc<dyn RemoteWriter>,
    connectivity: Arc<dyn ConnectivityProvider>,
    options: SyncOptions,
    // Held for the whole of a drain; at most one drain per queue.
    inspection_drain: Mutex<()>,
    equipment_drain: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        writer: Arc<dyn RemoteWriter>,
        connectivity: Arc<dyn ConnectivityProvider>,
    ) -> Self {
        Self::with_options(store, writer, connectivity, SyncOptions::default())
    }

    pub fn with_options(
        store: Arc<dyn KeyValueStore>,
        writer: Arc<dyn RemoteWriter>,
        connectivity: Arc<dyn ConnectivityProvider>,
        options: SyncOptions,
    ) -> Self {
        Self {
            queue: LocalQueue::new(store),
            writer,
            connectivity,
            options,
            inspection_drain: Mutex::new(()),
            equipment_drain: Mutex::new(()),
        }
    }

    pub fn queue(&self) -> &LocalQueue {
        &self.queue
    }

    pub fn connectivity(&self) -> &Arc<dyn ConnectivityProvider> {
        &self.connectivity
    }

    fn drain_guard(&self, kind: RecordKind) -> &Mutex<()> {
        match kind {
            RecordKind::Inspection => &self.inspection_drain,
            RecordKind::Equipment => &self.equipment_drain,
        }
    }

    async fn write(&self, record: &PendingRecord) -> Result<(), RemoteError> {
        let document = record.to_document();
        match tokio::time::timeout(
            self.options.write_timeout,
            self.writer.write(&record.collection, &document),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        }
    }

    /// Validates and stores a new record, remotely when possible.
    ///
    /// Offline submissions and retryable remote failures are queued and
    /// reported as success. A terminal rejection hands the record back.
    pub async fn submit(
        &self,
        session: &SessionContext,
        payload: RecordPayload,
    ) -> Result<SubmitOutcome, SyncError> {
        validate_session(session)?;
        validate_payload(&payload)?;
        let record = PendingRecord::new(session, payload);
        let id = record.id;
        let kind = record.kind();

        if !self.connectivity.is_connected() {
            self.queue.append(&record.into_pending()).await?;
            tracing::info!("offline, {kind} record {id} saved locally");
            return Ok(SubmitOutcome::QueuedOffline { id });
        }

        match self.write(&record).await {
            Ok(()) => {
                tracing::info!("{kind} record {id} written to {}", record.collection);
                Ok(SubmitOutcome::Delivered { id })
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!("remote write of {kind} record {id} failed, queueing: {e}");
                self.queue.append(&record.into_pending()).await?;
                Ok(SubmitOutcome::QueuedAfterFailure {
                    id,
                    reason: e.to_string(),
                })
            }
            Err(e) => {
                tracing::error!("remote store rejected {kind} record {id}: {e}");
                Err(SyncError::Rejected {
                    record: Box::new(record),
                    source: e,
                })
            }
        }
    }

    /// Replays the queue for `kind` in append order.
    ///
    /// Each acknowledged record leaves the queue right away. The first
    /// retryable failure stops the replay so later records never overtake an
    /// earlier one. Remote failures end up in the report, only local storage
    /// errors are returned.
    pub async fn drain(&self, kind: RecordKind) -> Result<DrainReport, SyncError> {
        let Ok(_guard) = self.drain_guard(kind).try_lock() else {
            tracing::debug!("drain of {kind} queue already running");
            return Ok(DrainReport::busy(kind));
        };

        let entries = self.queue.snapshot(kind).await?;
        let mut report = DrainReport::new(kind);
        if entries.is_empty() {
            return Ok(report);
        }
        if !self.connectivity.is_connected() {
            report.remaining = entries.len();
            report.halted = Some(DrainHalt::Offline);
            return Ok(report);
        }

        tracing::info!("draining {} pending {kind} record(s)", entries.len());
        for entry in entries {
            let record = match entry {
                QueueEntry::Ready(record) if record.is_supported_schema() => record,
                QueueEntry::Ready(record) => {
                    tracing::warn!(
                        "{kind} record {} has schema version {}, leaving it queued",
                        record.id,
                        record.schema_version
                    );
                    report.halted = Some(DrainHalt::Unsupported {
                        id: Some(record.id.to_string()),
                        schema_version: Some(u64::from(record.schema_version)),
                    });
                    break;
                }
                QueueEntry::Foreign {
                    id,
                    schema_version,
                    error,
                } => {
                    tracing::warn!(
                        "{kind} queue entry {id:?} is from a newer build, leaving it queued: {error}"
                    );
                    report.halted = Some(DrainHalt::Unsupported { id, schema_version });
                    break;
                }
            };

            report.attempted += 1;
            match self.write(&record).await {
                Ok(()) => {
                    self.queue.remove(kind, record.id).await?;
                    report.delivered += 1;
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!("sync of {kind} record {} failed, will retry: {e}", record.id);
                    report.halted = Some(DrainHalt::Retryable {
                        id: record.id,
                        reason: e.to_string(),
                    });
                    break;
                }
                Err(e) => {
                    tracing::error!(
                        "remote store rejected {kind} record {}, discarding it: {e}",
                        record.id
                    );
                    self.queue.remove(kind, record.id).await?;
                    report.dropped.push(DroppedRecord {
                        id: record.id,
                        status: match &e {
                            RemoteError::Rejected { status, .. } => Some(*status),
                            _ => None,
                        },
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.remaining = self.queue.len(kind).await?;
        if report.delivered > 0 {
            tracing::info!(
                "synced {} {kind} record(s), {} still pending",
                report.delivered,
                report.remaining
            );
        }
        Ok(report)
    }

    /// Drains every queue, one after the other.
    pub async fn drain_all(&self) -> Result<Vec<DrainReport>, SyncError> {
        let mut reports = Vec::with_capacity(RecordKind::ALL.len());
        for kind in RecordKind::ALL {
            reports.push(self.drain(kind).await?);
        }
        Ok(reports)
    }

    /// Records still waiting for the remote store.
    pub async fn pending(&self, kind: RecordKind) -> Result<Vec<PendingRecord>, SyncError> {
        Ok(self.queue.records(kind).await?)
    }

    async fn find_pending_equipment(&self, id: Uuid) -> Result<PendingRecord, SyncError> {
        self.queue
            .records(RecordKind::Equipment)
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or(SyncError::NotFound {
                kind: RecordKind::Equipment,
                id,
            })
    }

    /// Writes a queued equipment registration to the approved collection and
    /// drops it from the queue.
    pub async fn approve_pending(
        &self,
        session: &SessionContext,
        id: Uuid,
    ) -> Result<PendingRecord, SyncError> {
        validate_session(session)?;
        if !session.is_admin {
            return Err(SyncError::Forbidden("approve equipment"));
        }
        // Waits out a running drain so the record cannot go out twice.
        let _guard = self.drain_guard(RecordKind::Equipment).lock().await;
        let record = self.find_pending_equipment(id).await?;
        let approved = record.approved_by(session).ok_or(SyncError::NotFound {
            kind: RecordKind::Equipment,
            id,
        })?;

        self.write(&approved).await.map_err(SyncError::Remote)?;
        self.queue.remove(RecordKind::Equipment, id).await?;
        tracing::info!("equipment {id} approved by {}", session.email);
        Ok(approved)
    }

    /// Drops a queued equipment registration without sending it.
    pub async fn reject_pending(
        &self,
        session: &SessionContext,
        id: Uuid,
    ) -> Result<PendingRecord, SyncError> {
        validate_session(session)?;
        if !session.is_admin {
            return Err(SyncError::Forbidden("reject equipment"));
        }
        let _guard = self.drain_guard(RecordKind::Equipment).lock().await;
        let record = self.find_pending_equipment(id).await?;
        self.queue.remove(RecordKind::Equipment, id).await?;
        tracing::info!("equipment {id} rejected by {}", session.email);
        Ok(record)
    }
}
