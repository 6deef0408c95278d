use crate::contract::{
    CopyOutcome, DeleteOutcome, MigrationError, SnapshotKind, SnapshotStatus, SnapshotSummary,
};

/// Blocking facade over the snapshot API. Instance and cluster snapshots use
/// disjoint operations, selected by `kind`. Implementations hold no migration
/// state and must be safe to call from any number of worker threads.
pub trait SnapshotClient: Send + Sync {
    /// Every page of the listing for `kind`, unfiltered.
    fn list_snapshots(&self, kind: SnapshotKind) -> Result<Vec<SnapshotSummary>, MigrationError>;

    /// Fails with `NotFound` when the id does not (yet, or anymore) exist.
    fn describe_status(
        &self,
        kind: SnapshotKind,
        id: &str,
    ) -> Result<SnapshotStatus, MigrationError>;

    /// An existing target must be reported as `CopyOutcome::AlreadyExists`.
    fn copy_snapshot(
        &self,
        kind: SnapshotKind,
        source_id: &str,
        target_id: &str,
        key_id: &str,
        copy_tags: bool,
    ) -> Result<CopyOutcome, MigrationError>;

    /// A missing snapshot must be reported as `DeleteOutcome::AlreadyGone`.
    fn delete_snapshot(&self, kind: SnapshotKind, id: &str)
        -> Result<DeleteOutcome, MigrationError>;
}

/// Alias-keyed key management operations.
pub trait KeyService: Send + Sync {
    /// `Ok(None)` when no key is bound to the alias.
    fn find_key_by_alias(&self, alias: &str) -> Result<Option<String>, MigrationError>;

    fn create_key(&self, description: &str) -> Result<String, MigrationError>;

    /// Fails with `AlreadyExists` when the alias is already bound.
    fn create_alias(&self, alias: &str, key_id: &str) -> Result<(), MigrationError>;
}
