#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fieldsync_core::{
    ChecklistAnswer, EquipmentRegistration, Inspection, RecordPayload, SessionContext,
};
use fieldsync_infra::{ConnectivityMonitor, RemoteError, RemoteReader, RemoteWriter};
use fieldsync_persistence::{KeyValueStore, MemoryKeyValueStore};
use fieldsync_pipeline::{SyncEngine, SyncOptions};
use serde_json::Value;

/// Remote store double. Failures are scripted per call, in order; once the
/// script runs out every write succeeds.
#[derive(Default)]
pub struct ScriptedRemote {
    writes: Mutex<Vec<(String, Value)>>,
    script: Mutex<VecDeque<Option<RemoteError>>>,
    collections: Mutex<std::collections::HashMap<String, Vec<Value>>>,
    read_failure: Mutex<Option<RemoteError>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl ScriptedRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let remote = Self::default();
        *remote.delay.lock().unwrap() = delay;
        Arc::new(remote)
    }

    /// Next write succeeds.
    pub fn then_ok(&self) -> &Self {
        self.script.lock().unwrap().push_back(None);
        self
    }

    /// Next write fails with `err`.
    pub fn then_fail(&self, err: RemoteError) -> &Self {
        self.script.lock().unwrap().push_back(Some(err));
        self
    }

    pub fn fail_reads(&self, err: Option<RemoteError>) {
        *self.read_failure.lock().unwrap() = err;
    }

    pub fn seed(&self, collection: &str, docs: Vec<Value>) {
        self.collections
            .lock()
            .unwrap()
            .insert(collection.to_string(), docs);
    }

    pub fn writes(&self) -> Vec<(String, Value)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn written_ids(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|(_, doc)| doc["clientId"].as_str().map(str::to_string))
            .collect()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RemoteWriter for ScriptedRemote {
    async fn write(&self, collection: &str, document: &Value) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let step = self.script.lock().unwrap().pop_front().flatten();
        if let Some(err) = step {
            return Err(err);
        }
        self.writes
            .lock()
            .unwrap()
            .push((collection.to_string(), document.clone()));
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteReader for ScriptedRemote {
    async fn list_all(&self, collection: &str) -> Result<Vec<Value>, RemoteError> {
        if let Some(err) = self.read_failure.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn network_down() -> RemoteError {
    RemoteError::Network("connection refused".into())
}

pub fn forbidden() -> RemoteError {
    RemoteError::Rejected {
        status: 403,
        message: "missing or insufficient permissions".into(),
    }
}

pub fn technician() -> SessionContext {
    SessionContext::new("tech-1", "tech@example.com")
}

pub fn admin() -> SessionContext {
    SessionContext::admin("admin-1", "admin@example.com")
}

pub fn inspection(equipment: &str) -> RecordPayload {
    RecordPayload::Inspection(Inspection {
        equipment: equipment.into(),
        location: "SE Norte".into(),
        status: "operational".into(),
        checklist: vec![
            ChecklistAnswer {
                item: "oil level".into(),
                answer: "ok".into(),
            },
            ChecklistAnswer {
                item: "grounding".into(),
                answer: "ok".into(),
            },
        ],
        notes: String::new(),
    })
}

pub fn equipment(name: &str, location: &str) -> RecordPayload {
    RecordPayload::Equipment(EquipmentRegistration {
        name: name.into(),
        location: location.into(),
        created_by: String::new(),
        validated_by: None,
    })
}

pub struct Harness {
    pub store: Arc<MemoryKeyValueStore>,
    pub remote: Arc<ScriptedRemote>,
    pub monitor: ConnectivityMonitor,
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    pub fn new(connected: bool) -> Self {
        Self::with_remote(connected, ScriptedRemote::new(), SyncOptions::default())
    }

    pub fn with_remote(connected: bool, remote: Arc<ScriptedRemote>, options: SyncOptions) -> Self {
        let store = Arc::new(MemoryKeyValueStore::new());
        let monitor = ConnectivityMonitor::new(connected);
        let engine = Arc::new(SyncEngine::with_options(
            store.clone(),
            remote.clone(),
            Arc::new(monitor.clone()),
            options,
        ));
        Self {
            store,
            remote,
            monitor,
            engine,
        }
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.store.get(key).unwrap()
    }
}
