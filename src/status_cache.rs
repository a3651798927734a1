use std::sync::Arc;

use tokio::sync::Mutex;

use crate::models::WorkerFleetSnapshot;

/// Mutex-protected snapshot of the worker fleet, written only by the
/// response listener. Readers get an owned copy — no reference into the
/// cache ever escapes this module.
#[derive(Clone)]
pub struct WorkerStatusCache {
    inner: Arc<Mutex<WorkerFleetSnapshot>>,
}

impl WorkerStatusCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(WorkerFleetSnapshot::default())),
        }
    }

    pub async fn replace(&self, snapshot: WorkerFleetSnapshot) {
        *self.inner.lock().await = snapshot;
    }

    pub async fn snapshot(&self) -> WorkerFleetSnapshot {
        self.inner.lock().await.clone()
    }
}

impl Default for WorkerStatusCache {
    fn default() -> Self {
        Self::new()
    }
}
