//! Drives each snapshot through copy, poll, and delete.
//!
//! Every accepted snapshot gets its own task. Tasks share the resource
//! client, the key provisioner, and the progress store, but never each
//! other's records. Phase transitions are persisted before the next step
//! starts, so a restarted run resumes from the last durable phase:
//!
//! - `Pending` re-issues the copy, which the API answers with "already
//!   exists" if the previous run got that far.
//! - `CopyRequested`/`Copying` resume polling without copying again.
//! - `CopyAvailable` confirms the copy is still available, then deletes.
//!
//! The source is only deleted after this process has observed the
//! encrypted copy as `available`. A source id already being driven by this
//! orchestrator is skipped by any concurrent `run`, `resume`, or `adopt`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;

use crate::client::{KeyService, SnapshotClient};
use crate::config::{MigrationConfig, ValidationError};
use crate::contract::{
    CopyOutcome, DeleteOutcome, ErrorKind, MigrationError, MigrationJob, Phase, SnapshotKind,
    SnapshotRef, SnapshotStatus,
};
use crate::keys::KeyProvisioner;
use crate::naming::{derive_target_id, source_from_target};
use crate::store::ProgressStore;
use crate::telemetry::EventLog;
use crate::worker::WorkerPool;

pub struct OrchestratorDeps {
    pub client: Arc<dyn SnapshotClient>,
    pub key_service: Arc<dyn KeyService>,
    pub store: Arc<dyn ProgressStore>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedJob {
    pub source_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InProgressJob {
    pub source_id: String,
    pub target_id: String,
    pub phase: Phase,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedJob {
    pub source_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedJob>,
    pub in_progress: Vec<InProgressJob>,
    pub skipped: Vec<SkippedJob>,
}

impl MigrationSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    fn push_failure(&mut self, source_id: &str, error: &MigrationError) {
        self.failed.push(FailedJob {
            source_id: source_id.to_string(),
            kind: error.kind(),
            message: error.message().to_string(),
        });
    }

    fn push_skip(&mut self, source_id: &str, reason: impl Into<String>) {
        self.skipped.push(SkippedJob {
            source_id: source_id.to_string(),
            reason: reason.into(),
        });
    }

    fn sort(&mut self) {
        self.succeeded.sort();
        self.failed.sort_by(|left, right| left.source_id.cmp(&right.source_id));
        self.in_progress
            .sort_by(|left, right| left.source_id.cmp(&right.source_id));
        self.skipped.sort_by(|left, right| left.source_id.cmp(&right.source_id));
    }
}

/// Stops every pipeline owned by the orchestrator it came from. Jobs halt at
/// their next wake-up and never start a copy or a delete afterwards.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
    cancel: Arc<watch::Sender<bool>>,
    running: Arc<Mutex<HashSet<String>>>,
}

/// Marks a source id as driven by this orchestrator until dropped.
struct RunningClaim {
    running: Arc<Mutex<HashSet<String>>>,
    source_id: String,
}

impl RunningClaim {
    fn acquire(running: &Arc<Mutex<HashSet<String>>>, source_id: &str) -> Option<Self> {
        let inserted = running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source_id.to_string());
        inserted.then(|| Self {
            running: Arc::clone(running),
            source_id: source_id.to_string(),
        })
    }
}

impl Drop for RunningClaim {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.source_id);
    }
}

struct Candidate {
    source: SnapshotRef,
    start: Phase,
}

enum JobOutcome {
    Completed(MigrationJob),
    Failed {
        job: MigrationJob,
        error: MigrationError,
    },
    Interrupted {
        job: MigrationJob,
        reason: String,
    },
}

enum Halt {
    Failed(MigrationError),
    Interrupted(String),
}

impl From<MigrationError> for Halt {
    fn from(error: MigrationError) -> Self {
        Halt::Failed(error)
    }
}

impl Orchestrator {
    pub fn new(
        deps: OrchestratorDeps,
        config: MigrationConfig,
        log: EventLog,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        let pool = WorkerPool::new(config.worker_threads);
        let (sender, receiver) = watch::channel(false);
        let keys = KeyProvisioner::new(deps.key_service, pool.clone(), log.clone());
        Ok(Self {
            pipeline: Arc::new(Pipeline {
                client: deps.client,
                store: deps.store,
                keys,
                pool,
                config,
                log: log.for_component("orchestrator"),
                cancel: receiver,
            }),
            cancel: Arc::new(sender),
            running: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            sender: Arc::clone(&self.cancel),
        }
    }

    /// Migrates `snapshots`, resuming any that the progress store already
    /// tracks. Returns once every job is terminal or has stopped polling.
    pub async fn run(&self, snapshots: Vec<SnapshotRef>) -> MigrationSummary {
        let candidates = snapshots
            .into_iter()
            .map(|source| Candidate {
                source,
                start: Phase::Pending,
            })
            .collect();
        self.execute(candidates).await
    }

    /// Reruns every non-terminal job recorded in the progress store.
    pub async fn resume(&self) -> Result<MigrationSummary, MigrationError> {
        let pending = self.pipeline.store.pending_jobs()?;
        let candidates = pending
            .into_iter()
            .map(|job| Candidate {
                start: job.phase,
                source: job.source,
            })
            .collect();
        Ok(self.execute(candidates).await)
    }

    /// Takes over encrypted copies that already exist: polls each one and
    /// deletes its source once the copy is available. No copy is issued.
    pub async fn adopt(&self, kind: SnapshotKind, target_ids: Vec<String>) -> MigrationSummary {
        let suffix = &self.pipeline.config.target_suffix;
        let mut unresolved = Vec::new();
        let mut candidates = Vec::new();
        for target_id in target_ids {
            match source_from_target(&target_id, suffix) {
                Some(source_id) => candidates.push(Candidate {
                    source: SnapshotRef::new(kind, source_id),
                    start: Phase::CopyRequested,
                }),
                None => unresolved.push(target_id),
            }
        }

        let mut summary = self.execute(candidates).await;
        for target_id in unresolved {
            summary.push_skip(
                &target_id,
                format!("identifier does not end with -{suffix}"),
            );
        }
        summary.sort();
        summary
    }

    async fn execute(&self, candidates: Vec<Candidate>) -> MigrationSummary {
        let (jobs, mut summary) = self.admit(candidates);
        let pipeline = &self.pipeline;
        pipeline.log.info(
            "run_started",
            json!({
                "jobs": jobs.len(),
                "rejected": summary.failed.len(),
                "skipped": summary.skipped.len(),
                "workers": pipeline.pool.capacity(),
            }),
        );

        let handles: Vec<_> = jobs
            .into_iter()
            .map(|(job, claim)| {
                let source_id = job.source.id.clone();
                let pipeline = Arc::clone(pipeline);
                let handle = tokio::spawn(async move {
                    let _claim = claim;
                    pipeline.drive(job).await
                });
                (source_id, handle)
            })
            .collect();

        for (source_id, handle) in handles {
            match handle.await {
                Ok(JobOutcome::Completed(job)) => summary.succeeded.push(job.source.id),
                Ok(JobOutcome::Failed { job, error }) => {
                    summary.push_failure(&job.source.id, &error);
                }
                Ok(JobOutcome::Interrupted { job, reason }) => {
                    summary.in_progress.push(InProgressJob {
                        source_id: job.source.id,
                        target_id: job.target_id,
                        phase: job.phase,
                        reason,
                    });
                }
                Err(error) => summary.push_failure(
                    &source_id,
                    &MigrationError::new(ErrorKind::Unknown, format!("job task aborted: {error}")),
                ),
            }
        }

        summary.sort();
        pipeline.log.info(
            "run_finished",
            json!({
                "succeeded": summary.succeeded.len(),
                "failed": summary.failed.len(),
                "in_progress": summary.in_progress.len(),
                "skipped": summary.skipped.len(),
            }),
        );
        summary
    }

    /// Turns candidates into runnable jobs, enforcing one job per source id
    /// and one source per target id. Terminal records are reported, not rerun.
    fn admit(
        &self,
        candidates: Vec<Candidate>,
    ) -> (Vec<(MigrationJob, RunningClaim)>, MigrationSummary) {
        let pipeline = &self.pipeline;
        let store = &pipeline.store;
        let suffix = &pipeline.config.target_suffix;
        let mut summary = MigrationSummary::default();
        let mut jobs = Vec::new();
        let mut seen_sources = HashSet::new();
        let mut claimed_targets: HashMap<String, String> = HashMap::new();

        match store.all_jobs() {
            Ok(records) => {
                for record in records {
                    claimed_targets.insert(record.target_id, record.source.id);
                }
            }
            Err(error) => pipeline.log.warn(
                "progress_scan_failed",
                json!({"error": error.to_string()}),
            ),
        }

        for Candidate { source, start } in candidates {
            if !seen_sources.insert(source.id.clone()) {
                summary.push_skip(&source.id, "duplicate input");
                continue;
            }
            let Some(claim) = RunningClaim::acquire(&self.running, &source.id) else {
                pipeline.log.warn("job_already_running", json!({"source_id": source.id}));
                summary.push_skip(&source.id, "already running");
                continue;
            };

            let target_id = derive_target_id(&source.id, suffix);
            if let Some(owner) = claimed_targets.get(&target_id) {
                if owner != &source.id {
                    let error = MigrationError::new(
                        ErrorKind::Conflict,
                        format!("target {target_id} is already claimed by {owner}"),
                    );
                    pipeline.log.error(
                        "job_rejected",
                        json!({"source_id": source.id, "error_kind": error.kind().as_str(), "error": error.message()}),
                    );
                    summary.push_failure(&source.id, &error);
                    continue;
                }
            }

            match store.get(&source.id) {
                Err(error) => {
                    summary.push_failure(&source.id, &MigrationError::from(error));
                    continue;
                }
                Ok(Some(existing)) => {
                    if existing.source.kind != source.kind || existing.target_id != target_id {
                        summary.push_failure(
                            &source.id,
                            &MigrationError::new(
                                ErrorKind::Conflict,
                                format!(
                                    "already tracked as {} snapshot with target {}",
                                    existing.source.kind, existing.target_id
                                ),
                            ),
                        );
                        continue;
                    }
                    match existing.phase {
                        Phase::SourceDeleted => {
                            summary.push_skip(&source.id, "already migrated");
                        }
                        Phase::Failed => summary.push_failure(
                            &source.id,
                            &MigrationError::new(
                                existing.last_error.unwrap_or(ErrorKind::Unknown),
                                existing.last_error_message.clone().unwrap_or_else(|| {
                                    "failed in an earlier run; clear the record to retry"
                                        .to_string()
                                }),
                            ),
                        ),
                        _ => {
                            pipeline.log.info(
                                "job_resumed",
                                json!({"source_id": source.id, "phase": existing.phase.as_str()}),
                            );
                            jobs.push((existing, claim));
                        }
                    }
                }
                Ok(None) => {
                    let job = MigrationJob::at_phase(source.clone(), target_id.clone(), start);
                    if let Err(error) = store.record(&job) {
                        summary.push_failure(&source.id, &MigrationError::from(error));
                        continue;
                    }
                    jobs.push((job, claim));
                }
            }
            claimed_targets.insert(target_id, source.id);
        }

        (jobs, summary)
    }
}

struct Pipeline {
    client: Arc<dyn SnapshotClient>,
    store: Arc<dyn ProgressStore>,
    keys: KeyProvisioner,
    pool: WorkerPool,
    config: MigrationConfig,
    log: EventLog,
    cancel: watch::Receiver<bool>,
}

impl Pipeline {
    async fn drive(self: Arc<Self>, mut job: MigrationJob) -> JobOutcome {
        let mut observed_available = false;
        loop {
            let step = match job.phase {
                Phase::Pending => self.request_copy(&mut job).await,
                Phase::CopyAvailable if observed_available => self.delete_source(&mut job).await,
                Phase::CopyRequested | Phase::Copying | Phase::CopyAvailable => {
                    let polled = self.await_copy(&mut job).await;
                    observed_available = polled.is_ok();
                    polled
                }
                Phase::SourceDeleted => return JobOutcome::Completed(job),
                Phase::Failed => {
                    let error = MigrationError::new(
                        job.last_error.unwrap_or(ErrorKind::Unknown),
                        job.last_error_message.clone().unwrap_or_default(),
                    );
                    return JobOutcome::Failed { job, error };
                }
            };

            match step {
                Ok(()) => {}
                Err(Halt::Interrupted(reason)) => {
                    self.log.warn(
                        "job_interrupted",
                        json!({
                            "source_id": job.source.id,
                            "phase": job.phase.as_str(),
                            "reason": reason,
                        }),
                    );
                    return JobOutcome::Interrupted { job, reason };
                }
                Err(Halt::Failed(error)) => {
                    self.fail(&mut job, &error).await;
                    return JobOutcome::Failed { job, error };
                }
            }
        }
    }

    async fn request_copy(&self, job: &mut MigrationJob) -> Result<(), Halt> {
        self.check_cancelled()?;
        let key = self.keys.ensure_key(&self.config.key_alias).await?;

        let client = Arc::clone(&self.client);
        let kind = job.source.kind;
        let source_id = job.source.id.clone();
        let target_id = job.target_id.clone();
        let copy_tags = self.config.copy_tags;
        let outcome = self
            .call_with_retry("copy_snapshot", job, move || {
                match client.copy_snapshot(kind, &source_id, &target_id, &key.key_id, copy_tags) {
                    Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                        Ok(CopyOutcome::AlreadyExists)
                    }
                    other => other,
                }
            })
            .await?;

        let event = match outcome {
            CopyOutcome::Requested => "copy_requested",
            CopyOutcome::AlreadyExists => "copy_already_exists",
        };
        self.log.info(
            event,
            json!({
                "source_id": job.source.id,
                "kind": job.source.kind.as_str(),
                "target_id": job.target_id,
            }),
        );
        self.transition(job, Phase::CopyRequested).await
    }

    async fn await_copy(&self, job: &mut MigrationJob) -> Result<(), Halt> {
        let started = Instant::now();
        let mut warned = false;
        loop {
            let client = Arc::clone(&self.client);
            let kind = job.source.kind;
            let target_id = job.target_id.clone();
            match self
                .pool
                .run(move || client.describe_status(kind, &target_id))
                .await
            {
                Ok(SnapshotStatus::Available) => {
                    self.log.info(
                        "copy_available",
                        json!({"source_id": job.source.id, "target_id": job.target_id}),
                    );
                    if job.phase != Phase::CopyAvailable {
                        self.transition(job, Phase::CopyAvailable).await?;
                    }
                    return Ok(());
                }
                Ok(status @ (SnapshotStatus::Failed | SnapshotStatus::Deleting)) => {
                    return Err(Halt::Failed(MigrationError::new(
                        ErrorKind::InvalidState,
                        format!(
                            "encrypted copy {} reported status {}",
                            job.target_id,
                            status.as_str()
                        ),
                    )));
                }
                Ok(status) => {
                    if job.phase == Phase::CopyRequested {
                        self.transition(job, Phase::Copying).await?;
                    }
                    self.log.debug(
                        "copy_pending",
                        json!({"target_id": job.target_id, "status": status.as_str()}),
                    );
                }
                Err(error) if error.kind() == ErrorKind::NotFound => {
                    self.log.debug(
                        "copy_not_visible",
                        json!({"target_id": job.target_id}),
                    );
                }
                Err(error) if error.kind().is_retryable() => {
                    self.log.warn(
                        "poll_transient_error",
                        json!({"target_id": job.target_id, "error": error.message()}),
                    );
                }
                Err(error) => return Err(error.into()),
            }

            let waited = started.elapsed();
            if !warned && waited >= self.config.stuck_warning_after() {
                warned = true;
                self.log.warn(
                    "copy_exceeds_threshold",
                    json!({
                        "source_id": job.source.id,
                        "target_id": job.target_id,
                        "waited_ms": waited.as_millis(),
                    }),
                );
            }
            if let Some(max_wait) = self.config.max_wait() {
                if waited >= max_wait {
                    return Err(Halt::Interrupted(format!(
                        "copy not available after {}ms",
                        waited.as_millis()
                    )));
                }
            }
            self.pause(self.config.poll_interval()).await?;
        }
    }

    async fn delete_source(&self, job: &mut MigrationJob) -> Result<(), Halt> {
        self.check_cancelled()?;
        let client = Arc::clone(&self.client);
        let kind = job.source.kind;
        let source_id = job.source.id.clone();
        let outcome = self
            .call_with_retry("delete_snapshot", job, move || {
                match client.delete_snapshot(kind, &source_id) {
                    Err(error) if error.kind() == ErrorKind::NotFound => {
                        Ok(DeleteOutcome::AlreadyGone)
                    }
                    other => other,
                }
            })
            .await?;

        let event = match outcome {
            DeleteOutcome::Deleted => "source_deleted",
            DeleteOutcome::AlreadyGone => "source_already_gone",
        };
        self.log.info(
            event,
            json!({"source_id": job.source.id, "kind": job.source.kind.as_str()}),
        );
        self.transition(job, Phase::SourceDeleted).await?;

        if !self.config.retain_completed {
            let store = Arc::clone(&self.store);
            let source_id = job.source.id.clone();
            let removed = self
                .pool
                .run(move || store.remove(&source_id).map_err(MigrationError::from))
                .await;
            if let Err(error) = removed {
                self.log.warn(
                    "progress_remove_failed",
                    json!({"source_id": job.source.id, "error": error.to_string()}),
                );
            }
        }
        Ok(())
    }

    /// Retries transient failures with jittered exponential backoff, up to
    /// the configured number of attempts.
    async fn call_with_retry<T, F>(
        &self,
        operation: &'static str,
        job: &MigrationJob,
        task: F,
    ) -> Result<T, Halt>
    where
        F: Fn() -> Result<T, MigrationError> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let task = Arc::new(task);
        let mut attempt = 0;
        loop {
            let attempt_task = Arc::clone(&task);
            match self.pool.run(move || (*attempt_task)()).await {
                Err(error)
                    if error.kind().is_retryable()
                        && attempt < self.config.transient_retry_attempts =>
                {
                    let delay = backoff_delay(
                        self.config.retry_base_delay_ms,
                        self.config.retry_max_delay_ms,
                        attempt,
                    );
                    attempt += 1;
                    self.log.warn(
                        "transient_error_retrying",
                        json!({
                            "operation": operation,
                            "source_id": job.source.id,
                            "attempt": attempt,
                            "delay_ms": delay.as_millis(),
                            "error": error.message(),
                        }),
                    );
                    self.pause(delay).await?;
                }
                result => return result.map_err(Halt::from),
            }
        }
    }

    /// Commits `next` to `job` only once the store has accepted it, so a
    /// failed write leaves the job at its last durable phase.
    async fn transition(&self, job: &mut MigrationJob, next: Phase) -> Result<(), Halt> {
        let previous = job.phase;
        let mut advanced = job.clone();
        advanced.advance(next)?;
        self.persist(&advanced).await?;
        *job = advanced;
        self.log.info(
            "phase_changed",
            json!({
                "source_id": job.source.id,
                "kind": job.source.kind.as_str(),
                "target_id": job.target_id,
                "from": previous.as_str(),
                "to": next.as_str(),
            }),
        );
        Ok(())
    }

    /// Writes `job` from a blocking worker thread.
    async fn persist(&self, job: &MigrationJob) -> Result<(), MigrationError> {
        let store = Arc::clone(&self.store);
        let record = job.clone();
        self.pool
            .run(move || store.record(&record).map_err(MigrationError::from))
            .await
    }

    async fn fail(&self, job: &mut MigrationJob, error: &MigrationError) {
        let recorded = match job.fail(error) {
            Ok(()) => self.persist(job).await,
            Err(rejected) => Err(rejected),
        };
        if let Err(store_error) = recorded {
            self.log.error(
                "progress_record_failed",
                json!({
                    "source_id": job.source.id,
                    "phase": job.phase.as_str(),
                    "error": store_error.message(),
                }),
            );
        }
        self.log.error(
            "job_failed",
            json!({
                "source_id": job.source.id,
                "kind": job.source.kind.as_str(),
                "error_kind": error.kind().as_str(),
                "error": error.message(),
            }),
        );
    }

    fn check_cancelled(&self) -> Result<(), Halt> {
        if *self.cancel.borrow() {
            Err(Halt::Interrupted("cancelled".to_string()))
        } else {
            Ok(())
        }
    }

    async fn pause(&self, duration: Duration) -> Result<(), Halt> {
        let mut cancel = self.cancel.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = wait_for_cancel(&mut cancel) => {}
        }
        self.check_cancelled()
    }
}

async fn wait_for_cancel(receiver: &mut watch::Receiver<bool>) {
    loop {
        if *receiver.borrow_and_update() {
            return;
        }
        if receiver.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn backoff_delay(base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let ceiling = base_ms
        .saturating_mul(1u64 << attempt.min(20))
        .min(max_ms);
    let floor = ceiling / 2;
    Duration::from_millis(rand::thread_rng().gen_range(floor..=ceiling))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_respects_ceiling() {
        for attempt in 0..10 {
            let delay = backoff_delay(100, 1_000, attempt);
            let ceiling = (100u64 << attempt).min(1_000);
            assert!(delay.as_millis() as u64 <= ceiling);
            assert!(delay.as_millis() as u64 >= ceiling / 2);
        }
        assert_eq!(backoff_delay(0, 0, 3), Duration::ZERO);
    }

    #[test]
    fn summary_sorts_every_bucket() {
        let mut summary = MigrationSummary {
            succeeded: vec!["b".to_string(), "a".to_string()],
            ..MigrationSummary::default()
        };
        summary.push_skip("z", "duplicate input");
        summary.push_skip("y", "duplicate input");
        summary.push_failure("d", &MigrationError::new(ErrorKind::Conflict, "x"));
        summary.push_failure("c", &MigrationError::new(ErrorKind::Conflict, "x"));
        summary.sort();

        assert_eq!(summary.succeeded, vec!["a", "b"]);
        assert_eq!(summary.skipped[0].source_id, "y");
        assert_eq!(summary.failed[0].source_id, "c");
        assert!(summary.has_failures());
    }

    #[test]
    fn running_claim_is_exclusive_until_dropped() {
        let running = Arc::new(Mutex::new(HashSet::new()));
        let claim = RunningClaim::acquire(&running, "snap-a").expect("first claim");
        assert!(RunningClaim::acquire(&running, "snap-a").is_none());
        assert!(RunningClaim::acquire(&running, "snap-b").is_some());

        drop(claim);
        assert!(RunningClaim::acquire(&running, "snap-a").is_some());
    }

    #[test]
    fn cancel_handle_reports_state() {
        let (sender, _receiver) = watch::channel(false);
        let handle = CancelHandle {
            sender: Arc::new(sender),
        };
        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());
    }
}
