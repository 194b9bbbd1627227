use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fieldsync_config::{clamp_probe_interval, clamp_write_timeout, Settings};
use fieldsync_infra::{
    default_http_client, probe_once, ConnectivityMonitor, HttpDocumentStore, RemoteError,
    RemoteReader, RemoteWriter,
};
use fieldsync_persistence::RedbKeyValueStore;
use fieldsync_pipeline::{DraftStore, ReferenceCache, SyncEngine, SyncOptions};
use reqwest::Url;
use serde_json::Value;

/// Stand-in remote when no URL is configured. Every write fails as retryable,
/// so records simply stay queued.
struct Unconfigured;

#[async_trait::async_trait]
impl RemoteWriter for Unconfigured {
    async fn write(&self, _collection: &str, _document: &Value) -> Result<(), RemoteError> {
        Err(RemoteError::Network("no remote configured".into()))
    }
}

#[async_trait::async_trait]
impl RemoteReader for Unconfigured {
    async fn list_all(&self, _collection: &str) -> Result<Vec<Value>, RemoteError> {
        Err(RemoteError::Network("no remote configured".into()))
    }
}

/// Everything a command needs, wired from settings.
pub struct AppContext {
    pub settings: Settings,
    pub data_dir: Utf8PathBuf,
    pub client: reqwest::Client,
    pub store: Arc<RedbKeyValueStore>,
    pub monitor: ConnectivityMonitor,
    pub engine: Arc<SyncEngine>,
    pub cache: Arc<ReferenceCache>,
    pub drafts: DraftStore,
    pub probe_url: Option<Url>,
}

impl AppContext {
    /// Opens the local store and probes the remote once to seed connectivity.
    pub async fn open(settings: Settings, data_dir: &Utf8Path) -> Result<Self> {
        let store = Arc::new(
            RedbKeyValueStore::open(data_dir)
                .with_context(|| format!("Failed to open local store in {data_dir}"))?,
        );
        let client = default_http_client().context("Failed to build HTTP client")?;

        let (writer, reader): (Arc<dyn RemoteWriter>, Arc<dyn RemoteReader>) =
            match settings.remote_url.as_deref() {
                Some(url) => {
                    let http = Arc::new(
                        HttpDocumentStore::new(client.clone(), url)
                            .context("Invalid remote URL")?
                            .with_token(settings.token.clone()),
                    );
                    let writer: Arc<dyn RemoteWriter> = http.clone();
                    let reader: Arc<dyn RemoteReader> = http;
                    (writer, reader)
                }
                None => {
                    tracing::warn!("no remote configured, records will stay queued");
                    let writer: Arc<dyn RemoteWriter> = Arc::new(Unconfigured);
                    let reader: Arc<dyn RemoteReader> = Arc::new(Unconfigured);
                    (writer, reader)
                }
            };

        let probe_url = settings
            .effective_probe_url()
            .map(Url::parse)
            .transpose()
            .context("Invalid probe URL")?;

        let monitor = ConnectivityMonitor::new(false);
        if let Some(url) = &probe_url {
            monitor.set_connected(probe_once(&client, url).await);
        }

        let options = SyncOptions {
            write_timeout: clamp_write_timeout(settings.write_timeout_secs),
            ..SyncOptions::default()
        };
        let connectivity = Arc::new(monitor.clone());
        let engine = Arc::new(SyncEngine::with_options(
            store.clone(),
            writer,
            connectivity.clone(),
            options,
        ));
        let cache = Arc::new(ReferenceCache::new(store.clone(), reader, connectivity));
        let drafts = DraftStore::new(store.clone());

        Ok(Self {
            settings,
            data_dir: data_dir.to_owned(),
            client,
            store,
            monitor,
            engine,
            cache,
            drafts,
            probe_url,
        })
    }

    pub fn probe_interval(&self) -> Duration {
        clamp_probe_interval(self.settings.probe_interval_secs)
    }
}
