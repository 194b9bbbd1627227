use std::time::Duration;

use anyhow::{Context, Result};
use camino::Utf8Path;
use clap::Args;
use fieldsync_config::{Settings, SettingsStore};
use fieldsync_core::{
    equipment_at_location, substation_names, ChecklistAnswer, EquipmentRegistration, Inspection,
    PendingRecord, RecordKind, RecordPayload, ReferenceKind, SessionContext,
};
use fieldsync_infra::ConnectivityProvider;
use fieldsync_persistence::{DbState, RedbKeyValueStore};
use fieldsync_pipeline::{
    CacheSource, DrainHalt, DrainReport, ReferenceSnapshot, SubmitOutcome, SyncDriver,
};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{parse_checklist_entry, AppContext};

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_outcome(kind: RecordKind, outcome: &SubmitOutcome) {
    println!(":: {} {kind} {}", outcome.notice(), outcome.id());
    if let SubmitOutcome::QueuedAfterFailure { reason, .. } = outcome {
        println!("   Remote write failed: {reason}");
    }
}

/// Sends whatever is already queued before a new record goes out, so it
/// cannot overtake older ones.
async fn catch_up(ctx: &AppContext) -> Result<()> {
    if !ctx.monitor.is_connected() {
        return Ok(());
    }
    let reports = ctx
        .engine
        .drain_all()
        .await
        .context("Failed to sync queued records")?;
    for report in &reports {
        if let Some(notice) = report.notice() {
            println!(":: {notice}");
        }
    }
    Ok(())
}

/// Inspection form fields. Anything left out is taken from the saved draft.
#[derive(Args, Clone, Debug, Default)]
pub struct InspectionInput {
    #[arg(long)]
    pub equipment: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
    /// Checklist answer as ITEM=ANSWER, repeatable
    #[arg(short, long = "check", value_parser = parse_checklist_entry)]
    pub checklist: Vec<ChecklistAnswer>,
    #[arg(long)]
    pub notes: Option<String>,
}

impl InspectionInput {
    /// Overlays the given fields on `form`. A checklist answer replaces the
    /// one for the same item, new items are appended.
    pub fn apply_to(self, mut form: Inspection) -> Inspection {
        if let Some(equipment) = self.equipment {
            form.equipment = equipment;
        }
        if let Some(location) = self.location {
            form.location = location;
        }
        if let Some(status) = self.status {
            form.status = status;
        }
        if let Some(notes) = self.notes {
            form.notes = notes;
        }
        for entry in self.checklist {
            match form.checklist.iter_mut().find(|a| a.item == entry.item) {
                Some(existing) => existing.answer = entry.answer,
                None => form.checklist.push(entry),
            }
        }
        form
    }
}

fn print_form(form: &Inspection) {
    let field = |v: &str| if v.is_empty() { "-".to_string() } else { v.to_string() };
    println!("   equipment: {}", field(&form.equipment));
    println!("   location:  {}", field(&form.location));
    println!("   status:    {}", field(&form.status));
    for a in &form.checklist {
        println!("   [{}] {}", if a.answer.is_empty() { " " } else { "x" }, a.item);
    }
    if !form.notes.is_empty() {
        println!("   notes:     {}", form.notes);
    }
}

/// Submits the draft with `input` applied.
///
/// The merged form is saved as the draft first and cleared only once the
/// record is stored, remotely or in the queue.
pub async fn cmd_inspect(
    ctx: &AppContext,
    session: &SessionContext,
    input: InspectionInput,
) -> Result<SubmitOutcome> {
    let form = input.apply_to(ctx.drafts.load()?.unwrap_or_default());
    ctx.drafts.save(&form)?;

    catch_up(ctx).await?;
    let outcome = ctx
        .engine
        .submit(session, RecordPayload::Inspection(form))
        .await
        .context("Failed to save inspection, the form is kept as a draft")?;
    ctx.drafts.clear()?;
    print_outcome(RecordKind::Inspection, &outcome);
    Ok(outcome)
}

pub fn cmd_draft_save(ctx: &AppContext, input: InspectionInput) -> Result<Inspection> {
    let form = input.apply_to(ctx.drafts.load()?.unwrap_or_default());
    ctx.drafts.save(&form)?;
    println!(":: Draft saved");
    print_form(&form);
    Ok(form)
}

pub fn cmd_draft_show(ctx: &AppContext) -> Result<Option<Inspection>> {
    let draft = ctx.drafts.load()?;
    match &draft {
        Some(form) => {
            println!(":: Inspection draft");
            print_form(form);
        }
        None => println!(":: No inspection draft"),
    }
    Ok(draft)
}

pub fn cmd_draft_clear(ctx: &AppContext) -> Result<()> {
    ctx.drafts.clear()?;
    println!(":: Draft discarded");
    Ok(())
}

pub async fn cmd_register_equipment(
    ctx: &AppContext,
    session: &SessionContext,
    name: String,
    location: String,
) -> Result<SubmitOutcome> {
    let payload = RecordPayload::Equipment(EquipmentRegistration {
        name,
        location,
        created_by: String::new(),
        validated_by: None,
    });
    catch_up(ctx).await?;
    let outcome = ctx
        .engine
        .submit(session, payload)
        .await
        .context("Failed to register equipment")?;
    print_outcome(RecordKind::Equipment, &outcome);
    if !session.is_admin {
        println!("   Awaiting admin approval.");
    }
    Ok(outcome)
}

fn print_report(report: &DrainReport) {
    if report.busy {
        println!("   {}: sync already running", report.kind);
        return;
    }
    println!(
        "   {:<11} delivered {:>3}   remaining {:>3}",
        report.kind.as_str(),
        report.delivered,
        report.remaining
    );
    for dropped in &report.dropped {
        println!("   ! {} discarded: {}", dropped.id, dropped.reason);
    }
    match &report.halted {
        Some(DrainHalt::Offline) => println!("   offline, will retry on reconnect"),
        Some(DrainHalt::Unsupported { id, .. }) => println!(
            "   stopped at an entry written by a newer version ({})",
            id.as_deref().unwrap_or("no id")
        ),
        // Retryable failures stay quiet; the next pass picks them up.
        Some(DrainHalt::Retryable { .. }) | None => {}
    }
}

/// Drains every queue once.
pub async fn cmd_sync(ctx: &AppContext) -> Result<Vec<DrainReport>> {
    println!(":: Syncing pending records...");
    let pb = spinner("Replaying queue");
    let reports = ctx.engine.drain_all().await;
    pb.finish_and_clear();
    let reports = reports.context("Sync failed")?;

    for report in &reports {
        print_report(report);
    }
    let notices: Vec<_> = reports.iter().filter_map(DrainReport::notice).collect();
    if !notices.is_empty() {
        println!(":: {}", notices.join("; "));
    }
    Ok(reports)
}

pub async fn cmd_pending_list(ctx: &AppContext, kind: RecordKind) -> Result<Vec<PendingRecord>> {
    let records = ctx.engine.pending(kind).await?;
    println!(":: {} pending {kind} record(s)", records.len());
    for r in &records {
        let summary = match &r.payload {
            RecordPayload::Inspection(i) => {
                format!("{} @ {} [{}]", i.equipment, i.location, i.status)
            }
            RecordPayload::Equipment(e) => format!("{} @ {}", e.name, e.location),
        };
        println!(
            "   {}  {}  {}  by {}",
            r.id,
            r.created_at.format("%Y-%m-%d %H:%M"),
            summary,
            r.created_by.email
        );
    }
    Ok(records)
}

pub async fn cmd_pending_approve(
    ctx: &AppContext,
    session: &SessionContext,
    id: Uuid,
) -> Result<PendingRecord> {
    let record = ctx
        .engine
        .approve_pending(session, id)
        .await
        .context("Failed to approve equipment")?;
    println!(":: Equipment approved and saved to {}", record.collection);
    Ok(record)
}

pub async fn cmd_pending_reject(
    ctx: &AppContext,
    session: &SessionContext,
    id: Uuid,
) -> Result<PendingRecord> {
    let record = ctx
        .engine
        .reject_pending(session, id)
        .await
        .context("Failed to reject equipment")?;
    println!(":: Equipment removed from the pending list");
    Ok(record)
}

pub async fn cmd_reference_refresh(ctx: &AppContext) -> Result<Vec<ReferenceSnapshot>> {
    let pb = spinner("Refreshing reference data");
    let results =
        futures::future::join_all(ReferenceKind::ALL.map(|kind| ctx.cache.refresh(kind))).await;
    pb.finish_and_clear();

    let mut snapshots = Vec::with_capacity(results.len());
    for result in results {
        let snapshot = result?;
        let source = match snapshot.source {
            CacheSource::Fresh => "fresh",
            CacheSource::Cached => "cached",
        };
        println!(
            "   {:<11} {:>4} document(s) ({source})",
            snapshot.kind.to_string(),
            snapshot.documents.len()
        );
        snapshots.push(snapshot);
    }
    Ok(snapshots)
}

/// Lists reference data from the local mirror, the way the forms see it.
pub async fn cmd_reference_show(
    ctx: &AppContext,
    kind: ReferenceKind,
    location: Option<String>,
) -> Result<Vec<String>> {
    let docs = ctx.cache.cached(kind)?;
    let lines = match kind {
        ReferenceKind::Substations => substation_names(&docs),
        ReferenceKind::Equipment => {
            let pending = ctx.engine.pending(RecordKind::Equipment).await?;
            let equipment = match location.as_deref() {
                Some(loc) => equipment_at_location(&docs, &pending, loc),
                None => docs
                    .iter()
                    .filter_map(fieldsync_core::EquipmentRef::from_document)
                    .collect(),
            };
            equipment
                .into_iter()
                .map(|e| {
                    if e.pending {
                        format!("{} @ {} (pending)", e.name, e.location)
                    } else {
                        format!("{} @ {}", e.name, e.location)
                    }
                })
                .collect()
        }
    };
    for line in &lines {
        println!("   {line}");
    }
    Ok(lines)
}

/// Probes connectivity and drains on every reconnect until cancelled.
pub async fn cmd_watch(ctx: &AppContext, cancel: CancellationToken) -> Result<()> {
    let Some(url) = &ctx.probe_url else {
        println!(":: No remote configured; nothing to watch.");
        return Ok(());
    };
    let probe = ctx.monitor.spawn_probe(
        ctx.client.clone(),
        url.clone(),
        ctx.probe_interval(),
        cancel.clone(),
    );

    println!(":: Watching connectivity (Ctrl+C to stop)");
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let driver = SyncDriver::new(ctx.engine.clone())
        .with_cache(ctx.cache.clone())
        .with_reports(tx)
        .spawn(cancel.clone());

    while let Some(report) = rx.recv().await {
        if let Some(notice) = report.notice() {
            println!(":: {notice}");
        }
        for dropped in &report.dropped {
            println!("   ! {} discarded: {}", dropped.id, dropped.reason);
        }
    }

    driver.await.context("sync driver panicked")?;
    probe.await.context("connectivity probe panicked")?;
    Ok(())
}

pub struct StatusReport {
    pub db: DbState,
    pub pending: Vec<(RecordKind, usize)>,
}

pub async fn cmd_status(settings: &Settings, data_dir: &Utf8Path) -> Result<StatusReport> {
    println!(":: Local store: {data_dir}");
    let db = RedbKeyValueStore::validate(data_dir)?;
    println!("   State:  {db:?}");
    println!(
        "   Remote: {}",
        settings.remote_url.as_deref().unwrap_or("(not configured)")
    );

    let mut pending = Vec::new();
    if db == DbState::Valid {
        let ctx = AppContext::open(settings.clone(), data_dir).await?;
        println!(
            "   Online: {}",
            if ctx.monitor.is_connected() {
                "yes"
            } else {
                "no"
            }
        );
        for kind in RecordKind::ALL {
            let n = ctx.engine.queue().len(kind).await?;
            println!("   Pending {kind}: {n}");
            pending.push((kind, n));
        }
    }
    Ok(StatusReport { db, pending })
}

pub fn cmd_config_show(store: &SettingsStore) -> Result<Settings> {
    let settings = store.load()?;
    println!(":: {}", store.settings_path());
    let mut shown = settings.clone();
    if shown.token.is_some() {
        shown.token = Some("********".into());
    }
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(settings)
}

pub fn cmd_config_set(store: &SettingsStore, key: &str, value: &str) -> Result<Settings> {
    let mut settings = store.load()?;
    settings.set(key, value)?;
    store.save(&settings)?;
    println!(":: {key} updated");
    Ok(settings)
}
