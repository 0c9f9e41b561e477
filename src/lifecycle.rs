//! Component F: lifecycle hooks consumed by the process supervisor.
//!
//! Grounded on `hb_report_health_stats`/`has_work_to_do`/`check_health`
//! in `breakpad_resource.py`.

use std::sync::Arc;
use std::time::Duration;

use crate::metrics_sink;
use crate::pipeline::WorkQueue;
use crate::publish::CrashPublish;
use crate::storage::CrashStorage;

pub struct Lifecycle {
    queue: Arc<WorkQueue>,
    storage: Arc<dyn CrashStorage>,
    publisher: Arc<dyn CrashPublish>,
}

impl Lifecycle {
    pub fn new(
        queue: Arc<WorkQueue>,
        storage: Arc<dyn CrashStorage>,
        publisher: Arc<dyn CrashPublish>,
    ) -> Self {
        Lifecycle {
            queue,
            storage,
            publisher,
        }
    }

    /// Gauge reported on each heartbeat tick.
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// True iff the queue is non-empty or any worker is active; the
    /// process-lifecycle supervisor keeps the process alive until
    /// this returns false.
    pub fn has_work_to_do(&self) -> bool {
        self.queue.has_work_to_do()
    }

    pub fn report_health_stats(&self) {
        metrics_sink::work_queue_size(self.queue.depth());
    }

    /// Aggregates backend health into the caller-provided state bag.
    pub async fn check_health(&self, state: &mut HealthState) {
        state.storage_ok = self.storage.check_health().await.is_ok();
        state.publish_ok = self.publisher.check_health().await.is_ok();
    }

    /// Test-only: block until the pool is idle.
    #[cfg(test)]
    pub async fn join(&self) {
        while self.has_work_to_do() {
            actix_rt::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[derive(Debug, Default, serde::Serialize)]
pub struct HealthState {
    pub storage_ok: bool,
    pub publish_ok: bool,
}
