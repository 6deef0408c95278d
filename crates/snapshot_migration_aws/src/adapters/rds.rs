use snapshot_migration_core::client::SnapshotClient;
use snapshot_migration_core::contract::{
    CopyOutcome, DeleteOutcome, ErrorKind, MigrationError, SnapshotKind, SnapshotStatus,
    SnapshotSummary,
};

use super::block_on;
use super::errors::classify_sdk_error;

/// Instance listings only cover manually created snapshots; automated ones
/// are owned by the backup retention policy.
const INSTANCE_SNAPSHOT_TYPE: &str = "manual";

pub struct RdsSnapshotClient {
    client: aws_sdk_rds::Client,
}

impl RdsSnapshotClient {
    pub fn new(client: aws_sdk_rds::Client) -> Self {
        Self { client }
    }

    async fn list_instance_snapshots(&self) -> Result<Vec<SnapshotSummary>, MigrationError> {
        let mut pages = self
            .client
            .describe_db_snapshots()
            .snapshot_type(INSTANCE_SNAPSHOT_TYPE)
            .into_paginator()
            .send();
        let mut summaries = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|error| classify_sdk_error("DescribeDBSnapshots", &error))?;
            for snapshot in page.db_snapshots() {
                let Some(raw_id) = snapshot.db_snapshot_identifier() else {
                    continue;
                };
                summaries.push(SnapshotSummary {
                    kind: SnapshotKind::Instance,
                    raw_id: raw_id.to_string(),
                    encrypted: snapshot.encrypted().unwrap_or(false),
                    status: snapshot.status().map(str::to_string),
                    parent_id: snapshot.db_instance_identifier().map(str::to_string),
                    engine: snapshot.engine().map(str::to_string),
                });
            }
        }
        Ok(summaries)
    }

    async fn list_cluster_snapshots(&self) -> Result<Vec<SnapshotSummary>, MigrationError> {
        let mut pages = self
            .client
            .describe_db_cluster_snapshots()
            .into_paginator()
            .send();
        let mut summaries = Vec::new();
        while let Some(page) = pages.next().await {
            let page =
                page.map_err(|error| classify_sdk_error("DescribeDBClusterSnapshots", &error))?;
            for snapshot in page.db_cluster_snapshots() {
                let Some(raw_id) = snapshot.db_cluster_snapshot_identifier() else {
                    continue;
                };
                summaries.push(SnapshotSummary {
                    kind: SnapshotKind::Cluster,
                    raw_id: raw_id.to_string(),
                    encrypted: snapshot.storage_encrypted().unwrap_or(false),
                    status: snapshot.status().map(str::to_string),
                    parent_id: snapshot.db_cluster_identifier().map(str::to_string),
                    engine: snapshot.engine().map(str::to_string),
                });
            }
        }
        Ok(summaries)
    }

    async fn instance_status(&self, id: &str) -> Result<Option<String>, MigrationError> {
        let output = self
            .client
            .describe_db_snapshots()
            .db_snapshot_identifier(id)
            .send()
            .await
            .map_err(|error| classify_sdk_error("DescribeDBSnapshots", &error))?;
        let snapshot = output.db_snapshots().first().ok_or_else(|| missing(id))?;
        Ok(snapshot.status().map(str::to_string))
    }

    async fn cluster_status(&self, id: &str) -> Result<Option<String>, MigrationError> {
        let output = self
            .client
            .describe_db_cluster_snapshots()
            .db_cluster_snapshot_identifier(id)
            .send()
            .await
            .map_err(|error| classify_sdk_error("DescribeDBClusterSnapshots", &error))?;
        let snapshot = output
            .db_cluster_snapshots()
            .first()
            .ok_or_else(|| missing(id))?;
        Ok(snapshot.status().map(str::to_string))
    }
}

fn missing(id: &str) -> MigrationError {
    MigrationError::new(ErrorKind::NotFound, format!("snapshot {id} not found"))
}

impl SnapshotClient for RdsSnapshotClient {
    fn list_snapshots(&self, kind: SnapshotKind) -> Result<Vec<SnapshotSummary>, MigrationError> {
        block_on(async {
            match kind {
                SnapshotKind::Instance => self.list_instance_snapshots().await,
                SnapshotKind::Cluster => self.list_cluster_snapshots().await,
            }
        })
    }

    fn describe_status(
        &self,
        kind: SnapshotKind,
        id: &str,
    ) -> Result<SnapshotStatus, MigrationError> {
        let status = block_on(async {
            match kind {
                SnapshotKind::Instance => self.instance_status(id).await,
                SnapshotKind::Cluster => self.cluster_status(id).await,
            }
        })?;
        match status.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Ok(SnapshotStatus::parse(raw)),
            _ => Err(MigrationError::new(
                ErrorKind::Unknown,
                format!("snapshot {id} was described without a status"),
            )),
        }
    }

    fn copy_snapshot(
        &self,
        kind: SnapshotKind,
        source_id: &str,
        target_id: &str,
        key_id: &str,
        copy_tags: bool,
    ) -> Result<CopyOutcome, MigrationError> {
        let result = block_on(async {
            match kind {
                SnapshotKind::Instance => self
                    .client
                    .copy_db_snapshot()
                    .source_db_snapshot_identifier(source_id)
                    .target_db_snapshot_identifier(target_id)
                    .kms_key_id(key_id)
                    .copy_tags(copy_tags)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| classify_sdk_error("CopyDBSnapshot", &error)),
                SnapshotKind::Cluster => self
                    .client
                    .copy_db_cluster_snapshot()
                    .source_db_cluster_snapshot_identifier(source_id)
                    .target_db_cluster_snapshot_identifier(target_id)
                    .kms_key_id(key_id)
                    .copy_tags(copy_tags)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| classify_sdk_error("CopyDBClusterSnapshot", &error)),
            }
        });
        match result {
            Ok(()) => Ok(CopyOutcome::Requested),
            Err(error) if error.kind() == ErrorKind::AlreadyExists => Ok(CopyOutcome::AlreadyExists),
            Err(error) => Err(error),
        }
    }

    fn delete_snapshot(
        &self,
        kind: SnapshotKind,
        id: &str,
    ) -> Result<DeleteOutcome, MigrationError> {
        let result = block_on(async {
            match kind {
                SnapshotKind::Instance => self
                    .client
                    .delete_db_snapshot()
                    .db_snapshot_identifier(id)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| classify_sdk_error("DeleteDBSnapshot", &error)),
                SnapshotKind::Cluster => self
                    .client
                    .delete_db_cluster_snapshot()
                    .db_cluster_snapshot_identifier(id)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| classify_sdk_error("DeleteDBClusterSnapshot", &error)),
            }
        });
        match result {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(DeleteOutcome::AlreadyGone),
            Err(error) => Err(error),
        }
    }
}
