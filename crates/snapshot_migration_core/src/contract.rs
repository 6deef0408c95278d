use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TARGET_SUFFIX: &str = "encrypted";
pub const DEFAULT_KEY_ALIAS: &str = "aws/rds";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Instance,
    Cluster,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 2] = [SnapshotKind::Instance, SnapshotKind::Cluster];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::Cluster => "cluster",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source snapshot to migrate. The id is always the bare identifier, never
/// an ARN or account-qualified form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub kind: SnapshotKind,
    pub id: String,
}

impl SnapshotRef {
    pub fn new(kind: SnapshotKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// Forward-only lifecycle of a [`MigrationJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pending,
    CopyRequested,
    Copying,
    CopyAvailable,
    SourceDeleted,
    Failed,
}

impl Phase {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::CopyRequested => 1,
            Self::Copying => 2,
            Self::CopyAvailable => 3,
            Self::SourceDeleted => 4,
            Self::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::SourceDeleted | Self::Failed)
    }

    /// `Failed` is reachable from every non-terminal phase; everything else
    /// must strictly move forward.
    pub fn can_advance_to(self, next: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::CopyRequested => "copy_requested",
            Self::Copying => "copying",
            Self::CopyAvailable => "copy_available",
            Self::SourceDeleted => "source_deleted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidState,
    QuotaExceeded,
    KeyInaccessible,
    Conflict,
    Transient,
    Unknown,
}

impl ErrorKind {
    /// Only transient failures may be retried without operator involvement.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::InvalidState => "invalid_state",
            Self::QuotaExceeded => "quota_exceeded",
            Self::KeyInaccessible => "key_inaccessible",
            Self::Conflict => "conflict",
            Self::Transient => "transient",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationError {
    kind: ErrorKind,
    message: String,
}

impl MigrationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for MigrationError {}

/// Lifecycle status reported by the resource API. A status that could not be
/// read at all is an error, never an empty `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Available,
    Creating,
    Copying,
    Deleting,
    Failed,
    Other(String),
}

impl SnapshotStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "available" => Self::Available,
            "creating" => Self::Creating,
            "copying" => Self::Copying,
            "deleting" => Self::Deleting,
            "failed" => Self::Failed,
            _ => Self::Other(raw.to_string()),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Available => "available",
            Self::Creating => "creating",
            Self::Copying => "copying",
            Self::Deleting => "deleting",
            Self::Failed => "failed",
            Self::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Requested,
    /// A previous run already issued this copy.
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyGone,
}

/// One entry of a resource listing, before any filtering or normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub kind: SnapshotKind,
    pub raw_id: String,
    pub encrypted: bool,
    pub status: Option<String>,
    pub parent_id: Option<String>,
    pub engine: Option<String>,
}

/// One snapshot's journey through encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationJob {
    pub source: SnapshotRef,
    pub target_id: String,
    pub phase: Phase,
    pub last_error: Option<ErrorKind>,
    pub last_error_message: Option<String>,
    pub updated_at: String,
}

impl MigrationJob {
    pub fn new(source: SnapshotRef, target_id: impl Into<String>) -> Self {
        Self::at_phase(source, target_id, Phase::Pending)
    }

    pub fn at_phase(source: SnapshotRef, target_id: impl Into<String>, phase: Phase) -> Self {
        Self {
            source,
            target_id: target_id.into(),
            phase,
            last_error: None,
            last_error_message: None,
            updated_at: now_rfc3339(),
        }
    }

    pub fn advance(&mut self, next: Phase) -> Result<(), MigrationError> {
        if !self.phase.can_advance_to(next) {
            return Err(MigrationError::new(
                ErrorKind::InvalidState,
                format!(
                    "job {} cannot move from {} to {next}",
                    self.source.id, self.phase
                ),
            ));
        }
        self.phase = next;
        self.updated_at = now_rfc3339();
        Ok(())
    }

    pub fn fail(&mut self, error: &MigrationError) -> Result<(), MigrationError> {
        self.advance(Phase::Failed)?;
        self.last_error = Some(error.kind());
        self.last_error_message = Some(error.message().to_string());
        Ok(())
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
