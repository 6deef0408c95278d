use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::client::KeyService;
use crate::contract::{ErrorKind, MigrationError};
use crate::telemetry::EventLog;
use crate::worker::WorkerPool;

pub const KEY_DESCRIPTION: &str =
    "Default master key that protects my RDS database volumes when no other key is defined";
const ALIAS_PREFIX: &str = "alias/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyHandle {
    pub alias: String,
    pub key_id: String,
    pub created: bool,
}

/// Create-if-absent key lookup with a per-process cache. Lookups for the same
/// alias are single-flight within one provisioner; concurrent provisioners in
/// other processes may still race to create a key.
pub struct KeyProvisioner {
    service: Arc<dyn KeyService>,
    pool: WorkerPool,
    log: EventLog,
    handles: Mutex<HashMap<String, KeyHandle>>,
}

pub fn normalize_alias(alias: &str) -> String {
    let alias = alias.trim();
    if alias.starts_with(ALIAS_PREFIX) {
        alias.to_string()
    } else {
        format!("{ALIAS_PREFIX}{alias}")
    }
}

impl KeyProvisioner {
    pub fn new(service: Arc<dyn KeyService>, pool: WorkerPool, log: EventLog) -> Self {
        Self {
            service,
            pool,
            log: log.for_component("key_provisioner"),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub async fn ensure_key(&self, alias: &str) -> Result<KeyHandle, MigrationError> {
        let alias = normalize_alias(alias);
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(&alias) {
            return Ok(handle.clone());
        }

        let handle = self.lookup_or_create(&alias).await?;
        handles.insert(alias, handle.clone());
        Ok(handle)
    }

    async fn lookup_or_create(&self, alias: &str) -> Result<KeyHandle, MigrationError> {
        if let Some(key_id) = self.find(alias).await? {
            self.log.info(
                "key_found",
                json!({"alias": alias, "key_id": key_id.clone()}),
            );
            return Ok(KeyHandle {
                alias: alias.to_string(),
                key_id,
                created: false,
            });
        }

        let service = Arc::clone(&self.service);
        let key_id = self
            .pool
            .run(move || service.create_key(KEY_DESCRIPTION))
            .await?;

        let service = Arc::clone(&self.service);
        let (bound_alias, bound_key) = (alias.to_string(), key_id.clone());
        match self
            .pool
            .run(move || service.create_alias(&bound_alias, &bound_key))
            .await
        {
            Ok(()) => {
                self.log.info(
                    "key_created",
                    json!({"alias": alias, "key_id": key_id.clone()}),
                );
                Ok(KeyHandle {
                    alias: alias.to_string(),
                    key_id,
                    created: true,
                })
            }
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                // Another process bound the alias first; our key is orphaned.
                let winner = self.find(alias).await?.ok_or_else(|| {
                    MigrationError::new(
                        ErrorKind::KeyInaccessible,
                        format!("alias {alias} exists but resolves to no key"),
                    )
                })?;
                self.log.warn(
                    "key_alias_race_lost",
                    json!({"alias": alias, "orphaned_key_id": key_id, "key_id": winner.clone()}),
                );
                Ok(KeyHandle {
                    alias: alias.to_string(),
                    key_id: winner,
                    created: false,
                })
            }
            Err(error) => Err(error),
        }
    }

    async fn find(&self, alias: &str) -> Result<Option<String>, MigrationError> {
        let service = Arc::clone(&self.service);
        let alias = alias.to_string();
        self.pool.run(move || service.find_key_by_alias(&alias)).await
    }
}
