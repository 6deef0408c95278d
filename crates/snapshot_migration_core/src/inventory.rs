use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::client::SnapshotClient;
use crate::contract::{MigrationError, SnapshotKind, SnapshotRef, SnapshotStatus, SnapshotSummary};
use crate::naming::{is_migration_target, normalize_identifier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSnapshot {
    pub kind: SnapshotKind,
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryReport {
    pub eligible: Vec<SnapshotRef>,
    pub skipped: Vec<SkippedSnapshot>,
}

impl InventoryReport {
    pub fn of_kind(&self, kind: SnapshotKind) -> impl Iterator<Item = &SnapshotRef> {
        self.eligible.iter().filter(move |snapshot| snapshot.kind == kind)
    }
}

/// Lists every requested kind and classifies the results. A listing failure
/// aborts the scan.
pub fn scan(
    client: &dyn SnapshotClient,
    kinds: &[SnapshotKind],
    suffix: &str,
) -> Result<InventoryReport, MigrationError> {
    let mut listings = Vec::new();
    for kind in kinds {
        listings.extend(client.list_snapshots(*kind)?);
    }
    Ok(classify(listings, suffix))
}

/// Keeps unencrypted, available snapshots that are not themselves migration
/// targets. Output is sorted by kind then id and free of duplicates.
pub fn classify(listings: Vec<SnapshotSummary>, suffix: &str) -> InventoryReport {
    let mut eligible = BTreeSet::new();
    let mut skipped = Vec::new();

    for summary in listings {
        if summary.encrypted {
            continue;
        }
        let Some(id) = normalize_identifier(&summary.raw_id) else {
            skipped.push(SkippedSnapshot {
                kind: summary.kind,
                id: summary.raw_id.clone(),
                reason: "identifier has no bare component".to_string(),
            });
            continue;
        };
        if is_migration_target(id, suffix) {
            skipped.push(SkippedSnapshot {
                kind: summary.kind,
                id: id.to_string(),
                reason: format!("identifier already carries the -{suffix} suffix"),
            });
            continue;
        }
        match summary.status.as_deref().map(SnapshotStatus::parse) {
            Some(SnapshotStatus::Available) => {
                eligible.insert(SnapshotRef::new(summary.kind, id));
            }
            Some(status) => skipped.push(SkippedSnapshot {
                kind: summary.kind,
                id: id.to_string(),
                reason: format!("status is {}", status.as_str()),
            }),
            None => skipped.push(SkippedSnapshot {
                kind: summary.kind,
                id: id.to_string(),
                reason: "status is unknown".to_string(),
            }),
        }
    }

    skipped.sort_by(|left, right| (left.kind, &left.id).cmp(&(right.kind, &right.id)));
    InventoryReport {
        eligible: eligible.into_iter().collect(),
        skipped,
    }
}
