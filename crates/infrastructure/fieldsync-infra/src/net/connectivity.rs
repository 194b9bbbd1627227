//! Network reachability as a point-in-time flag plus a change feed.
//!
//! "No network" and "network up but the backend unreachable" are the same
//! thing here. Callers use the flag only to skip writes that are bound to
//! fail; the outcome of the write itself stays authoritative.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub trait ConnectivityProvider: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Change feed. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Connectivity state held in a watch channel.
///
/// Subscribers are only woken when the value actually flips.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_connected: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_connected);
        Self { tx: Arc::new(tx) }
    }

    /// Returns true when this call changed the state.
    pub fn set_connected(&self, connected: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == connected {
                return false;
            }
            *current = connected;
            true
        });
        if changed {
            tracing::info!(connected, "connectivity changed");
        }
        changed
    }

    /// Polls `url` every `interval` and feeds the result into this monitor.
    ///
    /// Any HTTP response counts as connected, only transport failures count
    /// as offline.
    pub fn spawn_probe(
        &self,
        client: Client,
        url: Url,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let reachable = probe_once(&client, &url).await;
                        monitor.set_connected(reachable);
                    }
                }
            }
            tracing::debug!("connectivity probe for {url} stopped");
        })
    }
}

impl ConnectivityProvider for ConnectivityMonitor {
    fn is_connected(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

pub async fn probe_once(client: &Client, url: &Url) -> bool {
    match client.head(url.clone()).send().await {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!("connectivity probe to {url} failed: {e}");
            false
        }
    }
}

/// Waits for the next transition into the connected state.
///
/// Returns false once the sending side is gone.
pub async fn wait_until_connected(rx: &mut watch::Receiver<bool>) -> bool {
    loop {
        if rx.changed().await.is_err() {
            return false;
        }
        if *rx.borrow_and_update() {
            return true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_the_same_value_is_not_a_change() {
        let monitor = ConnectivityMonitor::new(false);
        assert!(!monitor.set_connected(false));
        assert!(monitor.set_connected(true));
        assert!(!monitor.set_connected(true));
        assert!(monitor.is_connected());
    }

    #[tokio::test]
    async fn reconnect_fires_once_per_transition() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        let waiter = tokio::spawn(async move {
            let first = wait_until_connected(&mut rx).await;
            (first, rx)
        });
        monitor.set_connected(true);
        let (first, mut rx) = waiter.await.unwrap();
        assert!(first);

        monitor.set_connected(false);
        assert!(tokio::time::timeout(Duration::from_millis(50), wait_until_connected(&mut rx))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn reconnect_ends_when_monitor_is_dropped() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();
        drop(monitor);
        assert!(!wait_until_connected(&mut rx).await);
    }
}
