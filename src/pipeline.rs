//! Component E: the crashmover pipeline.
//!
//! A bounded pool of workers drains a shared FIFO queue, running each
//! submission through SAVE then PUBLISH with per-state retry and
//! at-most-`MAX_ATTEMPTS` drop semantics. Grounded on
//! `crashmover_process_queue`/`hb_run_crashmover` in
//! `breakpad_resource.py`, generalized from gevent's cooperative pool
//! to `actix_rt` tasks over a notify-guarded deque.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{error, info};

use crate::metrics_sink;
use crate::publish::CrashPublish;
use crate::stats::StatsLog;
use crate::storage::CrashStorage;
use crate::submission::{CrashState, CrashSubmission};

/// Per-state retry ceiling (spec.md §4.E). Applies independently to
/// SAVE and PUBLISH, so a crash may burn up to 40 total attempts
/// before being fully dropped. Preserved as observed in the source,
/// not treated as a bug (spec.md §9).
pub const MAX_ATTEMPTS: u32 = 20;

/// Shared FIFO work queue. Appends go to the tail (new submissions
/// from the handler, and retries from workers); pops come from the
/// head. A `Notify` avoids busy-polling when the queue is empty.
pub struct WorkQueue {
    items: Mutex<VecDeque<CrashSubmission>>,
    notify: Notify,
    in_flight: AtomicUsize,
}

impl WorkQueue {
    pub fn new() -> Self {
        WorkQueue {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, submission: CrashSubmission) {
        self.items.lock().unwrap().push_back(submission);
        self.notify.notify_one();
    }

    fn try_pop(&self) -> Option<CrashSubmission> {
        self.items.lock().unwrap().pop_front()
    }

    pub fn depth(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn has_work_to_do(&self) -> bool {
        self.depth() > 0 || self.in_flight() > 0
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns `concurrent_crashmovers` permanent workers that block on the
/// queue's notifier, matching "dispatch N permanent workers" from
/// spec.md §9's design notes.
pub struct Pipeline {
    pub queue: Arc<WorkQueue>,
}

impl Pipeline {
    pub fn start(
        concurrent_crashmovers: usize,
        storage: Arc<dyn CrashStorage>,
        publisher: Arc<dyn CrashPublish>,
        stats: Arc<StatsLog>,
    ) -> Self {
        let queue = Arc::new(WorkQueue::new());
        for worker_id in 0..concurrent_crashmovers {
            let queue = Arc::clone(&queue);
            let storage = Arc::clone(&storage);
            let publisher = Arc::clone(&publisher);
            let stats = Arc::clone(&stats);
            actix_rt::spawn(async move {
                worker_loop(worker_id, queue, storage, publisher, stats).await;
            });
        }
        Pipeline { queue }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<WorkQueue>,
    storage: Arc<dyn CrashStorage>,
    publisher: Arc<dyn CrashPublish>,
    stats: Arc<StatsLog>,
) {
    loop {
        let submission = match queue.try_pop() {
            Some(s) => s,
            None => {
                queue.notify.notified().await;
                continue;
            }
        };

        queue.in_flight.fetch_add(1, Ordering::SeqCst);
        let next = process_one(submission, &storage, &publisher, &stats).await;
        queue.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(retry_or_advance) = next {
            queue.push(retry_or_advance);
        }

        metrics_sink::work_queue_size(queue.depth());
        let _ = worker_id;
    }
}

/// Run one SAVE-or-PUBLISH step for `submission`. Returns `Some` if
/// the submission should go back on the queue (either advanced to the
/// next state or retried in the same state), `None` if it is finished
/// (published) or dropped (MAX_ATTEMPTS exceeded).
async fn process_one(
    mut submission: CrashSubmission,
    storage: &Arc<dyn CrashStorage>,
    publisher: &Arc<dyn CrashPublish>,
    stats: &Arc<StatsLog>,
) -> Option<CrashSubmission> {
    match submission.state {
        CrashState::Save => match storage.save(&submission).await {
            Ok(()) => {
                info!(crash_id = %submission.crash_id, "saved");
                submission.advance(CrashState::Publish);
                stats.record_saved(&submission.crash_id);
                Some(submission)
            }
            Err(err) => handle_failure(submission, CrashState::Save, err.to_string(), stats),
        },
        CrashState::Publish => match publisher.publish(&submission).await {
            Ok(()) => {
                info!(crash_id = %submission.crash_id, "published");
                if let Ok(timestamp) = submission
                    .annotations
                    .get("timestamp")
                    .ok_or(())
                    .and_then(|s| s.parse::<f64>().map_err(|_| ()))
                {
                    let now_seconds = Utc::now().timestamp() as f64;
                    metrics_sink::crash_handling_time_ms((now_seconds - timestamp) * 1000.0);
                }
                metrics_sink::save_crash_count();
                stats.record_published(&submission.crash_id);
                None
            }
            Err(err) => handle_failure(submission, CrashState::Publish, err.to_string(), stats),
        },
    }
}

fn handle_failure(
    mut submission: CrashSubmission,
    state: CrashState,
    reason: String,
    stats: &Arc<StatsLog>,
) -> Option<CrashSubmission> {
    metrics_sink::state_crash_exception(state.as_str());
    submission.record_failure();
    error!(
        crash_id = %submission.crash_id,
        state = state.as_str(),
        errors = submission.errors,
        max_attempts = MAX_ATTEMPTS,
        reason = %reason,
        "crashmover attempt failed"
    );

    if submission.errors < MAX_ATTEMPTS {
        Some(submission)
    } else {
        error!(
            crash_id = %submission.crash_id,
            state = state.as_str(),
            "too many errors; dropped"
        );
        metrics_sink::state_crash_dropped(state.as_str());
        stats.record_dropped(&submission.crash_id, state.as_str());
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::{AlwaysFailingCrashPublish, MemoryCrashPublish};
    use crate::stats::StatsLog;
    use crate::storage::{AlwaysFailingCrashStorage, FlakyCrashStorage, MemoryCrashStorage};
    use std::collections::HashMap;
    use std::time::Duration;

    fn submission(id: &str) -> CrashSubmission {
        let mut annotations = HashMap::new();
        annotations.insert("uuid".to_string(), id.to_string());
        annotations.insert("timestamp".to_string(), Utc::now().timestamp().to_string());
        CrashSubmission::new(id.to_string(), annotations, HashMap::new())
    }

    #[actix_rt::test]
    async fn happy_path_saves_then_publishes() {
        let storage = Arc::new(MemoryCrashStorage::new());
        let publisher = Arc::new(MemoryCrashPublish::new());
        let stats = Arc::new(StatsLog::in_memory().unwrap());

        let pipeline = Pipeline::start(
            2,
            storage.clone() as Arc<dyn CrashStorage>,
            publisher.clone() as Arc<dyn CrashPublish>,
            stats,
        );
        pipeline.queue.push(submission("crash-1"));

        wait_until(|| publisher.contains("crash-1")).await;
        assert!(storage.contains("crash-1"));
        assert!(publisher.contains("crash-1"));
    }

    #[actix_rt::test]
    async fn retries_then_succeeds() {
        let storage = Arc::new(FlakyCrashStorage::new(2));
        let publisher = Arc::new(MemoryCrashPublish::new());
        let stats = Arc::new(StatsLog::in_memory().unwrap());

        let pipeline = Pipeline::start(
            1,
            storage.clone() as Arc<dyn CrashStorage>,
            publisher.clone() as Arc<dyn CrashPublish>,
            stats,
        );
        pipeline.queue.push(submission("crash-2"));

        wait_until(|| publisher.contains("crash-2")).await;
        assert_eq!(storage.attempts_for("crash-2"), 3);
        assert!(publisher.contains("crash-2"));
    }

    #[actix_rt::test]
    async fn drops_after_max_attempts_and_never_publishes() {
        let storage = Arc::new(AlwaysFailingCrashStorage);
        let publisher = Arc::new(MemoryCrashPublish::new());
        let stats = Arc::new(StatsLog::in_memory().unwrap());

        let pipeline = Pipeline::start(
            1,
            storage as Arc<dyn CrashStorage>,
            publisher.clone() as Arc<dyn CrashPublish>,
            stats,
        );
        pipeline.queue.push(submission("crash-3"));

        wait_until(|| !pipeline.queue.has_work_to_do()).await;
        assert!(publisher.published_ids().is_empty());
    }

    #[actix_rt::test]
    async fn publish_always_failing_never_finishes_but_does_not_panic() {
        let storage = Arc::new(MemoryCrashStorage::new());
        let publisher = Arc::new(AlwaysFailingCrashPublish);
        let stats = Arc::new(StatsLog::in_memory().unwrap());

        let pipeline = Pipeline::start(
            1,
            storage as Arc<dyn CrashStorage>,
            publisher as Arc<dyn CrashPublish>,
            stats,
        );
        pipeline.queue.push(submission("crash-4"));

        wait_until(|| !pipeline.queue.has_work_to_do()).await;
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            actix_rt::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition never became true");
    }
}
