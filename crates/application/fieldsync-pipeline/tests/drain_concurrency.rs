mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::*;
use fieldsync_core::{PendingRecord, RecordKind, RECORD_SCHEMA_VERSION};
use fieldsync_persistence::KeyValueStore;
use fieldsync_pipeline::{DrainHalt, SubmitOutcome, SyncOptions};

async fn queued_harness(delay: Duration, records: usize) -> Harness {
    let h = Harness::with_remote(
        false,
        ScriptedRemote::with_delay(delay),
        SyncOptions::default(),
    );
    for n in 0..records {
        h.engine
            .submit(&technician(), inspection(&format!("TR-{n}")))
            .await
            .unwrap();
    }
    h.monitor.set_connected(true);
    h
}

#[tokio::test]
async fn overlapping_drains_deliver_each_record_once() {
    let h = queued_harness(Duration::from_millis(30), 3).await;

    let (first, second) = tokio::join!(
        h.engine.drain(RecordKind::Inspection),
        h.engine.drain(RecordKind::Inspection)
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(first.busy ^ second.busy, "exactly one drain should run");
    let ran = if first.busy { second } else { first };
    assert_eq!(ran.delivered, 3);
    assert_eq!(h.remote.calls(), 3);

    let ids = h.remote.written_ids();
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
}

#[tokio::test]
async fn drains_of_different_kinds_run_side_by_side() {
    let h = queued_harness(Duration::from_millis(20), 1).await;
    h.monitor.set_connected(false);
    h.engine
        .submit(&technician(), equipment("TR-99", "SE Norte"))
        .await
        .unwrap();
    h.monitor.set_connected(true);

    let (inspections, equipment) = tokio::join!(
        h.engine.drain(RecordKind::Inspection),
        h.engine.drain(RecordKind::Equipment)
    );
    assert_eq!(inspections.unwrap().delivered, 1);
    assert_eq!(equipment.unwrap().delivered, 1);
}

#[tokio::test]
async fn submission_during_a_drain_is_kept() {
    let h = queued_harness(Duration::from_millis(30), 3).await;

    let engine = h.engine.clone();
    let drain = tokio::spawn(async move { engine.drain(RecordKind::Inspection).await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    h.monitor.set_connected(false);
    let late = h
        .engine
        .submit(&technician(), inspection("late"))
        .await
        .unwrap();
    assert!(matches!(late, SubmitOutcome::QueuedOffline { .. }));

    let report = drain.await.unwrap().unwrap();
    assert_eq!(report.delivered, 3);
    assert_eq!(report.remaining, 1);

    let left = h.engine.pending(RecordKind::Inspection).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, late.id());
}

#[tokio::test]
async fn records_from_a_newer_schema_stay_queued() {
    let h = Harness::new(false);
    let mut future = PendingRecord::new(&technician(), inspection("future")).into_pending();
    future.schema_version = RECORD_SCHEMA_VERSION + 1;
    h.engine.queue().append(&future).await.unwrap();
    h.engine
        .submit(&technician(), inspection("current"))
        .await
        .unwrap();

    h.monitor.set_connected(true);
    let report = h.engine.drain(RecordKind::Inspection).await.unwrap();

    assert_eq!(report.attempted, 0);
    assert_eq!(report.remaining, 2);
    assert_eq!(
        report.halted,
        Some(DrainHalt::Unsupported {
            id: Some(future.id.to_string()),
            schema_version: Some(u64::from(RECORD_SCHEMA_VERSION + 1)),
        })
    );
    assert_eq!(h.remote.calls(), 0);
}

#[tokio::test]
async fn unreadable_entries_survive_later_appends() {
    let h = Harness::new(false);
    let key = RecordKind::Inspection.queue_key();
    h.store
        .set(
            key,
            r#"[{"id":"legacy-1","schemaVersion":7,"payload":{"kind":"photo","uri":"file:///a.jpg"}}]"#,
        )
        .unwrap();

    h.engine
        .submit(&technician(), inspection("TR-10"))
        .await
        .unwrap();

    let raw = h.raw(key).unwrap();
    assert!(raw.contains("legacy-1"));
    assert!(raw.contains("file:///a.jpg"));
    assert_eq!(h.engine.pending(RecordKind::Inspection).await.unwrap().len(), 1);
    assert_eq!(h.engine.queue().len(RecordKind::Inspection).await.unwrap(), 2);

    h.monitor.set_connected(true);
    let report = h.engine.drain(RecordKind::Inspection).await.unwrap();
    assert!(matches!(
        report.halted,
        Some(DrainHalt::Unsupported { schema_version: Some(7), .. })
    ));
    assert_eq!(h.remote.calls(), 0);
}

#[tokio::test]
async fn malformed_entries_are_set_aside_and_do_not_block_the_queue() {
    let h = Harness::new(false);
    let key = RecordKind::Inspection.queue_key();
    h.store
        .set(key, r#"[{"id":"half-written","schemaVersion":1},null]"#)
        .unwrap();

    let queued = h
        .engine
        .submit(&technician(), inspection("TR-1"))
        .await
        .unwrap();
    assert_eq!(h.engine.queue().len(RecordKind::Inspection).await.unwrap(), 1);

    h.monitor.set_connected(true);
    let report = h.engine.drain(RecordKind::Inspection).await.unwrap();

    assert_eq!(report.halted, None);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.remaining, 0);
    assert_eq!(h.remote.written_ids(), vec![queued.id().to_string()]);

    let mut set_aside: Vec<_> = h
        .store
        .keys()
        .unwrap()
        .into_iter()
        .filter(|k| k.starts_with("pending_inspections.corrupt."))
        .filter_map(|k| h.raw(&k))
        .collect();
    set_aside.sort();
    assert_eq!(set_aside, vec!["null", r#"{"id":"half-written","schemaVersion":1}"#]);
}

#[tokio::test]
async fn corrupt_queue_is_quarantined_and_starts_empty() {
    let h = Harness::new(false);
    let key = RecordKind::Inspection.queue_key();
    h.store.set(key, "{not json").unwrap();

    h.engine
        .submit(&technician(), inspection("TR-11"))
        .await
        .unwrap();

    assert_eq!(h.engine.pending(RecordKind::Inspection).await.unwrap().len(), 1);
    let quarantined: Vec<_> = h
        .store
        .keys()
        .unwrap()
        .into_iter()
        .filter(|k| k.starts_with("pending_inspections.corrupt."))
        .collect();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(h.raw(&quarantined[0]).as_deref(), Some("{not json"));
}

#[tokio::test]
async fn flapping_connectivity_never_loses_a_record() {
    let h = Harness::new(true);
    for n in 0..60 {
        if n % 4 == 1 {
            h.remote.then_fail(network_down());
        } else {
            h.remote.then_ok();
        }
    }

    let mut submitted = Vec::new();
    for n in 0..24 {
        h.monitor.set_connected(n % 3 != 0);
        let payload = if n % 5 == 0 {
            equipment(&format!("EQ-{n}"), "SE Norte")
        } else {
            inspection(&format!("TR-{n}"))
        };
        let outcome = h.engine.submit(&technician(), payload).await.unwrap();
        submitted.push(outcome.id().to_string());
        if n % 4 == 3 {
            h.engine.drain_all().await.unwrap();
        }
    }

    h.monitor.set_connected(true);
    for _ in 0..60 {
        let reports = h.engine.drain_all().await.unwrap();
        if reports.iter().all(|r| r.is_complete()) {
            break;
        }
    }

    let written = h.remote.written_ids();
    let unique: HashSet<_> = written.iter().cloned().collect();
    assert_eq!(unique.len(), written.len(), "a record was delivered twice");
    assert_eq!(unique, submitted.into_iter().collect::<HashSet<_>>());
    for kind in RecordKind::ALL {
        assert!(h.engine.queue().is_empty(kind).await.unwrap());
    }
}
