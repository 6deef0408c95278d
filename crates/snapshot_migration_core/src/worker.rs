use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::contract::{ErrorKind, MigrationError};

/// Bounded pool for blocking resource calls. Jobs are scheduled as async
/// tasks; only the calls themselves run on blocking threads, at most
/// `capacity` at a time.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn run<T, F>(&self, task: F) -> Result<T, MigrationError>
    where
        F: FnOnce() -> Result<T, MigrationError> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| MigrationError::new(ErrorKind::Unknown, "worker pool is closed"))?;
        tokio::task::spawn_blocking(task).await.map_err(|error| {
            MigrationError::new(ErrorKind::Unknown, format!("worker task failed: {error}"))
        })?
    }
}
