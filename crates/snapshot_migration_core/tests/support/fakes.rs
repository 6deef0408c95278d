use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::thread::{self, ThreadId};

use snapshot_migration_core::client::{KeyService, SnapshotClient};
use snapshot_migration_core::contract::{
    CopyOutcome, DeleteOutcome, ErrorKind, MigrationError, MigrationJob, Phase, SnapshotKind,
    SnapshotStatus, SnapshotSummary,
};
use snapshot_migration_core::store::{MemoryProgressStore, ProgressStore, StoreError};

/// One observed call against the fake snapshot API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    List(SnapshotKind),
    /// `status` is `None` when the describe call returned an error.
    Describe {
        target_id: String,
        status: Option<String>,
    },
    Copy {
        source_id: String,
        target_id: String,
        key_id: String,
    },
    Delete {
        source_id: String,
    },
}

type StatusScript = VecDeque<Result<SnapshotStatus, MigrationError>>;

/// Snapshot API whose answers are scripted per identifier. A status script
/// repeats its last entry once exhausted; unscripted targets are `NotFound`.
#[derive(Debug, Default)]
pub struct ScriptedSnapshotClient {
    listings: Vec<SnapshotSummary>,
    statuses: Mutex<HashMap<String, StatusScript>>,
    copy_errors: Mutex<HashMap<String, VecDeque<MigrationError>>>,
    delete_errors: Mutex<HashMap<String, VecDeque<MigrationError>>>,
    events: Mutex<Vec<CallEvent>>,
}

pub fn status(raw: &str) -> Result<SnapshotStatus, MigrationError> {
    Ok(SnapshotStatus::parse(raw))
}

pub fn not_found() -> Result<SnapshotStatus, MigrationError> {
    Err(MigrationError::new(ErrorKind::NotFound, "snapshot not found"))
}

impl ScriptedSnapshotClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(mut self, summary: SnapshotSummary) -> Self {
        self.listings.push(summary);
        self
    }

    pub fn with_statuses(
        self,
        target_id: &str,
        script: Vec<Result<SnapshotStatus, MigrationError>>,
    ) -> Self {
        self.statuses
            .lock()
            .expect("poisoned mutex")
            .insert(target_id.to_string(), script.into());
        self
    }

    pub fn failing_copy(self, source_id: &str, errors: Vec<MigrationError>) -> Self {
        self.copy_errors
            .lock()
            .expect("poisoned mutex")
            .insert(source_id.to_string(), errors.into());
        self
    }

    pub fn failing_delete(self, source_id: &str, errors: Vec<MigrationError>) -> Self {
        self.delete_errors
            .lock()
            .expect("poisoned mutex")
            .insert(source_id.to_string(), errors.into());
        self
    }

    pub fn events(&self) -> Vec<CallEvent> {
        self.events.lock().expect("poisoned mutex").clone()
    }

    pub fn copies_of(&self, source_id: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, CallEvent::Copy { source_id: id, .. } if id == source_id))
            .count()
    }

    pub fn deletes_of(&self, source_id: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, CallEvent::Delete { source_id: id } if id == source_id))
            .count()
    }

    pub fn copy_keys(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                CallEvent::Copy { key_id, .. } => Some(key_id),
                _ => None,
            })
            .collect()
    }

    /// Position of the first describe that saw `target_id` available.
    pub fn first_available(&self, target_id: &str) -> Option<usize> {
        self.events().iter().position(|event| {
            matches!(
                event,
                CallEvent::Describe { target_id: id, status: Some(status) }
                    if id == target_id && status == "available"
            )
        })
    }

    pub fn delete_position(&self, source_id: &str) -> Option<usize> {
        self.events().iter().position(
            |event| matches!(event, CallEvent::Delete { source_id: id } if id == source_id),
        )
    }

    fn push(&self, event: CallEvent) {
        self.events.lock().expect("poisoned mutex").push(event);
    }

    fn next_error(
        queues: &Mutex<HashMap<String, VecDeque<MigrationError>>>,
        id: &str,
    ) -> Option<MigrationError> {
        queues
            .lock()
            .expect("poisoned mutex")
            .get_mut(id)
            .and_then(VecDeque::pop_front)
    }
}

impl SnapshotClient for ScriptedSnapshotClient {
    fn list_snapshots(&self, kind: SnapshotKind) -> Result<Vec<SnapshotSummary>, MigrationError> {
        self.push(CallEvent::List(kind));
        Ok(self
            .listings
            .iter()
            .filter(|summary| summary.kind == kind)
            .cloned()
            .collect())
    }

    fn describe_status(
        &self,
        _kind: SnapshotKind,
        id: &str,
    ) -> Result<SnapshotStatus, MigrationError> {
        let result = {
            let mut statuses = self.statuses.lock().expect("poisoned mutex");
            match statuses.get_mut(id) {
                Some(script) if script.len() > 1 => script.pop_front().unwrap_or_else(not_found),
                Some(script) => script.front().cloned().unwrap_or_else(not_found),
                None => not_found(),
            }
        };
        self.push(CallEvent::Describe {
            target_id: id.to_string(),
            status: result.as_ref().ok().map(|status| status.as_str().to_string()),
        });
        result
    }

    fn copy_snapshot(
        &self,
        _kind: SnapshotKind,
        source_id: &str,
        target_id: &str,
        key_id: &str,
        _copy_tags: bool,
    ) -> Result<CopyOutcome, MigrationError> {
        self.push(CallEvent::Copy {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            key_id: key_id.to_string(),
        });
        match Self::next_error(&self.copy_errors, source_id) {
            Some(error) => Err(error),
            None => Ok(CopyOutcome::Requested),
        }
    }

    fn delete_snapshot(
        &self,
        _kind: SnapshotKind,
        id: &str,
    ) -> Result<DeleteOutcome, MigrationError> {
        self.push(CallEvent::Delete {
            source_id: id.to_string(),
        });
        match Self::next_error(&self.delete_errors, id) {
            Some(error) => Err(error),
            None => Ok(DeleteOutcome::Deleted),
        }
    }
}

/// In-memory key service; counts created keys.
#[derive(Debug, Default)]
pub struct FakeKeyService {
    aliases: Mutex<HashMap<String, String>>,
    created: Mutex<Vec<String>>,
}

impl FakeKeyService {
    pub fn with_alias(alias: &str, key_id: &str) -> Self {
        let service = Self::default();
        service
            .aliases
            .lock()
            .expect("poisoned mutex")
            .insert(alias.to_string(), key_id.to_string());
        service
    }

    pub fn created_keys(&self) -> Vec<String> {
        self.created.lock().expect("poisoned mutex").clone()
    }
}

impl KeyService for FakeKeyService {
    fn find_key_by_alias(&self, alias: &str) -> Result<Option<String>, MigrationError> {
        Ok(self.aliases.lock().expect("poisoned mutex").get(alias).cloned())
    }

    fn create_key(&self, _description: &str) -> Result<String, MigrationError> {
        let mut created = self.created.lock().expect("poisoned mutex");
        let key_id = format!("generated-key-{}", created.len() + 1);
        created.push(key_id.clone());
        Ok(key_id)
    }

    fn create_alias(&self, alias: &str, key_id: &str) -> Result<(), MigrationError> {
        let mut aliases = self.aliases.lock().expect("poisoned mutex");
        if aliases.contains_key(alias) {
            return Err(MigrationError::new(ErrorKind::AlreadyExists, "alias exists"));
        }
        aliases.insert(alias.to_string(), key_id.to_string());
        Ok(())
    }
}

/// Memory store that notes which thread wrote each phase and can refuse
/// writes of one phase.
#[derive(Debug, Default)]
pub struct ObservedProgressStore {
    inner: MemoryProgressStore,
    rejected_phase: Option<Phase>,
    writes: Mutex<Vec<(Phase, ThreadId)>>,
}

impl ObservedProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(phase: Phase) -> Self {
        Self {
            rejected_phase: Some(phase),
            ..Self::default()
        }
    }

    pub fn writes(&self) -> Vec<(Phase, ThreadId)> {
        self.writes.lock().expect("poisoned mutex").clone()
    }
}

impl ProgressStore for ObservedProgressStore {
    fn record(&self, job: &MigrationJob) -> Result<(), StoreError> {
        self.writes
            .lock()
            .expect("poisoned mutex")
            .push((job.phase, thread::current().id()));
        if self.rejected_phase == Some(job.phase) {
            return Err(StoreError::Io("disk full".to_string()));
        }
        self.inner.record(job)
    }

    fn get(&self, source_id: &str) -> Result<Option<MigrationJob>, StoreError> {
        self.inner.get(source_id)
    }

    fn all_jobs(&self) -> Result<Vec<MigrationJob>, StoreError> {
        self.inner.all_jobs()
    }

    fn remove(&self, source_id: &str) -> Result<bool, StoreError> {
        self.inner.remove(source_id)
    }
}
