use std::sync::Arc;

use snapshot_migration_core::config::MigrationConfig;
use snapshot_migration_core::orchestrator::{Orchestrator, OrchestratorDeps};
use snapshot_migration_core::store::{MemoryProgressStore, ProgressStore};
use snapshot_migration_core::telemetry::{EventCapture, EventLog};

use super::fakes::{FakeKeyService, ScriptedSnapshotClient};

/// Millisecond-scale timings so polling tests finish quickly.
pub fn fast_config() -> MigrationConfig {
    MigrationConfig {
        poll_interval_ms: 5,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 4,
        worker_threads: 4,
        ..MigrationConfig::default()
    }
}

pub struct Harness {
    pub client: Arc<ScriptedSnapshotClient>,
    pub keys: Arc<FakeKeyService>,
    pub store: Arc<dyn ProgressStore>,
    pub capture: EventCapture,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(client: ScriptedSnapshotClient) -> Self {
        Self::build(
            client,
            FakeKeyService::with_alias("alias/aws/rds", "key-rds"),
            Arc::new(MemoryProgressStore::new()),
            fast_config(),
        )
    }

    pub fn build(
        client: ScriptedSnapshotClient,
        keys: FakeKeyService,
        store: Arc<dyn ProgressStore>,
        config: MigrationConfig,
    ) -> Self {
        let client = Arc::new(client);
        let keys = Arc::new(keys);
        let (log, capture) = EventLog::capturing("test");
        let orchestrator = Orchestrator::new(
            OrchestratorDeps {
                client: client.clone(),
                key_service: keys.clone(),
                store: Arc::clone(&store),
            },
            config,
            log,
        )
        .expect("test config should validate");
        Self {
            client,
            keys,
            store,
            capture,
            orchestrator,
        }
    }
}
