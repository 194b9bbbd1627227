use std::sync::Arc;

use fieldsync_infra::wait_until_connected;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::sync::{DrainReport, ReferenceCache, SyncEngine};

/// Background task that drains every queue at start and again each time
/// connectivity comes back.
///
/// A drain cut short by cancellation simply resumes from the persisted queue
/// next time.
pub struct SyncDriver {
    engine: Arc<SyncEngine>,
    cache: Option<Arc<ReferenceCache>>,
    reports: Option<Sender<DrainReport>>,
}

impl SyncDriver {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            cache: None,
            reports: None,
        }
    }

    /// Also refresh reference data on every reconnect.
    pub fn with_cache(mut self, cache: Arc<ReferenceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Reports are sent without waiting; a full channel drops them.
    pub fn with_reports(mut self, tx: Sender<DrainReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    async fn run_once(&self) {
        match self.engine.drain_all().await {
            Ok(reports) => {
                if let Some(tx) = &self.reports {
                    for report in reports {
                        if let Err(e) = tx.try_send(report) {
                            tracing::debug!("drain report not delivered: {e}");
                        }
                    }
                }
            }
            Err(e) => tracing::error!("drain failed: {e}"),
        }
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.refresh_all().await {
                tracing::warn!("reference refresh failed: {e}");
            }
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            // Subscribe first so a reconnect during the start-up drain is not missed.
            let mut rx = self.engine.connectivity().subscribe();

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = self.run_once() => {}
            }

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    connected = wait_until_connected(&mut rx) => {
                        if !connected {
                            tracing::debug!("connectivity source closed");
                            break;
                        }
                        tracing::info!("connectivity restored, draining queues");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = self.run_once() => {}
                        }
                    }
                }
            }
            tracing::debug!("sync driver stopped");
        })
    }
}
