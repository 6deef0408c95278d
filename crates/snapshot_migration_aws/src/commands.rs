use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};
use snapshot_migration_core::client::{KeyService, SnapshotClient};
use snapshot_migration_core::config::{MigrationConfig, ValidationError};
use snapshot_migration_core::contract::{MigrationError, SnapshotRef};
use snapshot_migration_core::inventory::{scan, InventoryReport};
use snapshot_migration_core::orchestrator::{
    CancelHandle, MigrationSummary, Orchestrator, OrchestratorDeps,
};
use snapshot_migration_core::store::{JobRecord, JsonFileProgressStore, ProgressStore, StoreError};
use snapshot_migration_core::telemetry::EventLog;
use snapshot_migration_core::worker::WorkerPool;

use crate::cli::{Cli, Command, KindFilter};

/// Cloud-facing collaborators. The binary wires AWS adapters in; tests use
/// in-memory fakes.
pub struct AppDependencies {
    pub client: Arc<dyn SnapshotClient>,
    pub key_service: Arc<dyn KeyService>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandReport {
    pub document: Value,
    pub has_failures: bool,
}

impl CommandReport {
    fn ok(document: Value) -> Self {
        Self {
            document,
            has_failures: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CommandError {}

impl From<ValidationError> for CommandError {
    fn from(error: ValidationError) -> Self {
        Self::new(format!("invalid configuration: {error}"))
    }
}

impl From<StoreError> for CommandError {
    fn from(error: StoreError) -> Self {
        Self::new(format!("progress store: {error}"))
    }
}

impl From<MigrationError> for CommandError {
    fn from(error: MigrationError) -> Self {
        Self::new(error.to_string())
    }
}

/// Runs one CLI command. `interrupt` resolving cancels a running migration;
/// commands that never start one ignore it.
pub async fn execute<I>(
    cli: &Cli,
    deps: AppDependencies,
    log: EventLog,
    interrupt: I,
) -> Result<CommandReport, CommandError>
where
    I: Future<Output = ()> + Send + 'static,
{
    let config = cli.migration_config()?;
    match &cli.command {
        Command::List { kind } => {
            let report = inventory(&deps, &config, *kind).await?;
            Ok(CommandReport::ok(json!(report)))
        }
        Command::Status => {
            let store = JsonFileProgressStore::open(&cli.store)?;
            let records: Vec<JobRecord> = store.all_jobs()?.iter().map(JobRecord::from).collect();
            Ok(CommandReport::ok(json!({ "jobs": records })))
        }
        Command::Forget { source_id } => {
            let store = JsonFileProgressStore::open(&cli.store)?;
            let removed = store.remove(source_id)?;
            log.info(
                "record_forgotten",
                json!({"source_id": source_id, "removed": removed}),
            );
            Ok(CommandReport::ok(
                json!({"source_id": source_id, "removed": removed}),
            ))
        }
        Command::Migrate {
            kind, snapshots, ..
        } => {
            let (targets, inventory_skipped) = if snapshots.is_empty() {
                let report = inventory(&deps, &config, *kind).await?;
                (report.eligible, report.skipped)
            } else {
                let kind = kind.single().ok_or_else(|| {
                    CommandError::new("--snapshot requires --kind instance or --kind cluster")
                })?;
                let refs = snapshots
                    .iter()
                    .map(|id| SnapshotRef::new(kind, id.clone()))
                    .collect();
                (refs, Vec::new())
            };
            let orchestrator = build_orchestrator(cli, deps, config, &log)?;
            let summary =
                with_interrupt(&orchestrator, &log, interrupt, orchestrator.run(targets)).await;
            Ok(summary_report(
                summary,
                json!({ "inventory_skipped": inventory_skipped }),
            ))
        }
        Command::Resume { .. } => {
            let orchestrator = build_orchestrator(cli, deps, config, &log)?;
            let summary =
                with_interrupt(&orchestrator, &log, interrupt, orchestrator.resume()).await?;
            Ok(summary_report(summary, json!({})))
        }
        Command::Adopt {
            kind, target_ids, ..
        } => {
            let orchestrator = build_orchestrator(cli, deps, config, &log)?;
            let adopt = orchestrator.adopt((*kind).into(), target_ids.clone());
            let summary = with_interrupt(&orchestrator, &log, interrupt, adopt).await;
            Ok(summary_report(summary, json!({})))
        }
    }
}

async fn inventory(
    deps: &AppDependencies,
    config: &MigrationConfig,
    filter: KindFilter,
) -> Result<InventoryReport, MigrationError> {
    let client = Arc::clone(&deps.client);
    let suffix = config.target_suffix.clone();
    WorkerPool::new(1)
        .run(move || scan(client.as_ref(), &filter.kinds(), &suffix))
        .await
}

fn build_orchestrator(
    cli: &Cli,
    deps: AppDependencies,
    config: MigrationConfig,
    log: &EventLog,
) -> Result<Orchestrator, CommandError> {
    let store = JsonFileProgressStore::open(&cli.store)?;
    log.info(
        "progress_store_opened",
        json!({"path": store.path().display().to_string()}),
    );
    let orchestrator = Orchestrator::new(
        OrchestratorDeps {
            client: deps.client,
            key_service: deps.key_service,
            store: Arc::new(store),
        },
        config,
        log.clone(),
    )?;
    Ok(orchestrator)
}

async fn with_interrupt<I, F>(
    orchestrator: &Orchestrator,
    log: &EventLog,
    interrupt: I,
    run: F,
) -> F::Output
where
    I: Future<Output = ()> + Send + 'static,
    F: Future,
{
    let watcher = spawn_interrupt_watcher(orchestrator.cancel_handle(), log.clone(), interrupt);
    let result = run.await;
    watcher.abort();
    result
}

fn spawn_interrupt_watcher<I>(
    cancel: CancelHandle,
    log: EventLog,
    interrupt: I,
) -> tokio::task::JoinHandle<()>
where
    I: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        interrupt.await;
        log.warn("cancel_requested", json!({}));
        cancel.cancel();
    })
}

fn summary_report(summary: MigrationSummary, extra: Value) -> CommandReport {
    let has_failures = summary.has_failures();
    let mut document = json!({ "summary": summary });
    if let (Some(document), Value::Object(extra)) = (document.as_object_mut(), extra) {
        document.extend(extra);
    }
    CommandReport {
        document,
        has_failures,
    }
}
