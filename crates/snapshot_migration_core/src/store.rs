use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::contract::{ErrorKind, MigrationError, MigrationJob, Phase, SnapshotKind, SnapshotRef};

pub const PROGRESS_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Io(String),
    InvalidFormat(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(message) => write!(f, "{message}"),
            StoreError::InvalidFormat(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for MigrationError {
    fn from(error: StoreError) -> Self {
        MigrationError::new(ErrorKind::Unknown, format!("progress store: {error}"))
    }
}

/// Durable per-snapshot progress, keyed by source id. Each pipeline only
/// writes its own key, so implementations only need to keep individual
/// writes from corrupting the record set.
pub trait ProgressStore: Send + Sync {
    fn record(&self, job: &MigrationJob) -> Result<(), StoreError>;

    fn get(&self, source_id: &str) -> Result<Option<MigrationJob>, StoreError>;

    fn all_jobs(&self) -> Result<Vec<MigrationJob>, StoreError>;

    /// Returns whether a record was present.
    fn remove(&self, source_id: &str) -> Result<bool, StoreError>;

    /// Every job not yet in a terminal phase.
    fn pending_jobs(&self) -> Result<Vec<MigrationJob>, StoreError> {
        Ok(self
            .all_jobs()?
            .into_iter()
            .filter(|job| !job.phase.is_terminal())
            .collect())
    }
}

/// Persisted layout of one job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct JobRecord {
    pub source_id: String,
    pub kind: SnapshotKind,
    pub target_id: String,
    pub phase: Phase,
    pub last_error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_message: Option<String>,
    #[serde(default)]
    pub updated_at: String,
}

impl From<&MigrationJob> for JobRecord {
    fn from(job: &MigrationJob) -> Self {
        Self {
            source_id: job.source.id.clone(),
            kind: job.source.kind,
            target_id: job.target_id.clone(),
            phase: job.phase,
            last_error: job.last_error,
            last_error_message: job.last_error_message.clone(),
            updated_at: job.updated_at.clone(),
        }
    }
}

impl From<JobRecord> for MigrationJob {
    fn from(record: JobRecord) -> Self {
        Self {
            source: SnapshotRef::new(record.kind, record.source_id),
            target_id: record.target_id,
            phase: record.phase,
            last_error: record.last_error,
            last_error_message: record.last_error_message,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProgressFileV1 {
    version: u32,
    jobs: Vec<JobRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    records: Mutex<BTreeMap<String, JobRecord>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn record(&self, job: &MigrationJob) -> Result<(), StoreError> {
        lock(&self.records)?.insert(job.source.id.clone(), JobRecord::from(job));
        Ok(())
    }

    fn get(&self, source_id: &str) -> Result<Option<MigrationJob>, StoreError> {
        Ok(lock(&self.records)?.get(source_id).cloned().map(MigrationJob::from))
    }

    fn all_jobs(&self) -> Result<Vec<MigrationJob>, StoreError> {
        Ok(lock(&self.records)?
            .values()
            .cloned()
            .map(MigrationJob::from)
            .collect())
    }

    fn remove(&self, source_id: &str) -> Result<bool, StoreError> {
        Ok(lock(&self.records)?.remove(source_id).is_some())
    }
}

/// JSON-file store. Every mutation rewrites the whole file through a
/// temp-file rename, so a crash leaves either the old or the new record set.
#[derive(Debug)]
pub struct JsonFileProgressStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, JobRecord>>,
}

impl JsonFileProgressStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = load_records(&path)?;
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, JobRecord>) -> T,
    ) -> Result<T, StoreError> {
        let mut records = lock(&self.records)?;
        let mut candidate = records.clone();
        let result = change(&mut candidate);
        save_records_atomic(&self.path, &candidate)?;
        *records = candidate;
        Ok(result)
    }
}

impl ProgressStore for JsonFileProgressStore {
    fn record(&self, job: &MigrationJob) -> Result<(), StoreError> {
        let record = JobRecord::from(job);
        self.mutate(|records| {
            records.insert(record.source_id.clone(), record);
        })
    }

    fn get(&self, source_id: &str) -> Result<Option<MigrationJob>, StoreError> {
        Ok(lock(&self.records)?.get(source_id).cloned().map(MigrationJob::from))
    }

    fn all_jobs(&self) -> Result<Vec<MigrationJob>, StoreError> {
        Ok(lock(&self.records)?
            .values()
            .cloned()
            .map(MigrationJob::from)
            .collect())
    }

    fn remove(&self, source_id: &str) -> Result<bool, StoreError> {
        if !lock(&self.records)?.contains_key(source_id) {
            return Ok(false);
        }
        self.mutate(|records| records.remove(source_id).is_some())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Io("progress store lock poisoned".to_string()))
}

fn load_records(path: &Path) -> Result<BTreeMap<String, JobRecord>, StoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Ok(BTreeMap::new());
        }
        Err(error) => {
            return Err(StoreError::Io(format!(
                "failed to read progress file '{}': {error}",
                path.display()
            )))
        }
    };

    let file: ProgressFileV1 = serde_json::from_str(&contents).map_err(|error| {
        StoreError::InvalidFormat(format!(
            "invalid progress file '{}': {error}",
            path.display()
        ))
    })?;

    if file.version != PROGRESS_FILE_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "unsupported progress file version {} in '{}'",
            file.version,
            path.display()
        )));
    }

    let mut seen = HashSet::with_capacity(file.jobs.len());
    let mut records = BTreeMap::new();
    for record in file.jobs {
        if record.source_id.trim().is_empty() {
            return Err(StoreError::InvalidFormat(format!(
                "empty source_id in '{}'",
                path.display()
            )));
        }
        if !seen.insert(record.source_id.clone()) {
            return Err(StoreError::InvalidFormat(format!(
                "duplicate source_id '{}' in '{}'",
                record.source_id,
                path.display()
            )));
        }
        records.insert(record.source_id.clone(), record);
    }
    Ok(records)
}

fn save_records_atomic(
    path: &Path,
    records: &BTreeMap<String, JobRecord>,
) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| {
            StoreError::Io(format!(
                "failed to create progress directory '{}': {error}",
                parent.display()
            ))
        })?;
    }

    let file = ProgressFileV1 {
        version: PROGRESS_FILE_VERSION,
        jobs: records.values().cloned().collect(),
    };
    let serialized = serde_json::to_string_pretty(&file).map_err(|error| {
        StoreError::Io(format!("failed to serialize progress records: {error}"))
    })?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("json.tmp.{nanos}"));
    let mut temp_file = File::create(&temp_path).map_err(|error| {
        StoreError::Io(format!(
            "failed to create temp progress file '{}': {error}",
            temp_path.display()
        ))
    })?;
    temp_file
        .write_all(serialized.as_bytes())
        .and_then(|()| temp_file.sync_all())
        .map_err(|error| {
            let _ = fs::remove_file(&temp_path);
            StoreError::Io(format!(
                "failed to write temp progress file '{}': {error}",
                temp_path.display()
            ))
        })?;

    fs::rename(&temp_path, path).map_err(|error| {
        let _ = fs::remove_file(&temp_path);
        StoreError::Io(format!(
            "failed to move temp progress file '{}' to '{}': {error}",
            temp_path.display(),
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn job(source_id: &str, phase: Phase) -> MigrationJob {
        MigrationJob::at_phase(
            SnapshotRef::new(SnapshotKind::Instance, source_id),
            format!("{source_id}-encrypted"),
            phase,
        )
    }

    #[test]
    fn pending_jobs_excludes_terminal_phases() {
        let store = MemoryProgressStore::new();
        store.record(&job("a", Phase::Copying)).expect("record");
        store.record(&job("b", Phase::SourceDeleted)).expect("record");
        store.record(&job("c", Phase::Failed)).expect("record");
        store.record(&job("d", Phase::Pending)).expect("record");

        let pending: Vec<String> = store
            .pending_jobs()
            .expect("pending")
            .into_iter()
            .map(|job| job.source.id)
            .collect();
        assert_eq!(pending, vec!["a".to_string(), "d".to_string()]);
    }

    #[test]
    fn record_upserts_by_source_id() {
        let store = MemoryProgressStore::new();
        store.record(&job("a", Phase::Pending)).expect("record");
        store.record(&job("a", Phase::CopyRequested)).expect("record");

        let all = store.all_jobs().expect("all");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].phase, Phase::CopyRequested);
        assert!(store.remove("a").expect("remove"));
        assert!(!store.remove("a").expect("remove twice"));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state").join("progress.json");

        let mut failed = job("b", Phase::Pending);
        failed
            .fail(&MigrationError::new(ErrorKind::QuotaExceeded, "quota"))
            .expect("fail");
        {
            let store = JsonFileProgressStore::open(&path).expect("open");
            store.record(&job("a", Phase::Copying)).expect("record");
            store.record(&failed).expect("record");
        }

        let reopened = JsonFileProgressStore::open(&path).expect("reopen");
        let a = reopened.get("a").expect("get").expect("a present");
        assert_eq!(a.phase, Phase::Copying);
        assert_eq!(a.target_id, "a-encrypted");
        let b = reopened.get("b").expect("get").expect("b present");
        assert_eq!(b.last_error, Some(ErrorKind::QuotaExceeded));
        assert_eq!(reopened.pending_jobs().expect("pending").len(), 1);
    }

    #[test]
    fn persisted_layout_uses_snake_case_strings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("progress.json");
        let store = JsonFileProgressStore::open(&path).expect("open");
        store.record(&job("a", Phase::CopyAvailable)).expect("record");

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        let record = &raw["jobs"][0];
        assert_eq!(raw["version"], 1);
        assert_eq!(record["source_id"], "a");
        assert_eq!(record["target_id"], "a-encrypted");
        assert_eq!(record["phase"], "copy_available");
        assert!(record["last_error"].is_null());
    }

    #[test]
    fn rejects_duplicate_source_ids_on_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("progress.json");
        let record = r#"{"source_id":"a","kind":"instance","target_id":"a-encrypted","phase":"pending","last_error":null}"#;
        fs::write(&path, format!(r#"{{"version":1,"jobs":[{record},{record}]}}"#))
            .expect("write");

        let error = JsonFileProgressStore::open(&path).expect_err("duplicates must fail");
        assert!(matches!(error, StoreError::InvalidFormat(message) if message.contains("duplicate")));
    }

    #[test]
    fn rejects_unknown_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("progress.json");
        fs::write(&path, r#"{"version":9,"jobs":[]}"#).expect("write");

        assert!(matches!(
            JsonFileProgressStore::open(&path),
            Err(StoreError::InvalidFormat(_))
        ));
    }

    #[test]
    fn concurrent_writers_keep_every_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("progress.json");
        let store = Arc::new(JsonFileProgressStore::open(&path).expect("open"));

        let handles: Vec<_> = (0..8)
            .map(|index| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = format!("snap-{index}");
                    store.record(&job(&id, Phase::Pending)).expect("record");
                    store.record(&job(&id, Phase::CopyRequested)).expect("record");
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }

        let reopened = JsonFileProgressStore::open(&path).expect("reopen");
        let jobs = reopened.all_jobs().expect("all");
        assert_eq!(jobs.len(), 8);
        assert!(jobs.iter().all(|job| job.phase == Phase::CopyRequested));
    }
}
