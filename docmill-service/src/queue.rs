//! In-process priority work queue and worker pool.
//!
//! Entries are ordered by priority tier descending, FIFO within a tier.
//! A single mutex gates both insert and dequeue so the two cannot race,
//! and a `Notify` wakes idle workers. Job status lives in a `DashMap`
//! keyed by entry id.
//!
//! Cancellation only removes entries that no worker has claimed yet; a
//! claimed entry runs to completion, since preempting it mid-flight could
//! duplicate inference calls that were already billed.

use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::db::Priority;
use crate::error::ServiceResult;

/// Boxed future a queue entry runs to completion
pub type Job = Pin<Box<dyn Future<Output = ServiceResult<()>> + Send>>;

/// Lifecycle of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

struct QueueEntry {
    id: String,
    priority: Priority,
    /// Monotonic enqueue sequence; breaks ties FIFO within a tier
    seq: u64,
    job: Job,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower sequence (older) first
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueInner {
    heap: Mutex<BinaryHeap<QueueEntry>>,
    statuses: DashMap<String, JobStatus>,
    notify: Notify,
    next_seq: AtomicU64,
    shutdown: CancellationToken,
}

/// Shared handle to the work queue
#[derive(Clone)]
pub struct PriorityWorkQueue {
    inner: Arc<QueueInner>,
}

impl PriorityWorkQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                heap: Mutex::new(BinaryHeap::new()),
                statuses: DashMap::new(),
                notify: Notify::new(),
                next_seq: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Add a job to the queue. Replaces any previous status for the id.
    pub fn enqueue(&self, id: impl Into<String>, priority: Priority, job: Job) {
        let id = id.into();
        let seq = self.inner.next_seq.fetch_add(1, AtomicOrdering::SeqCst);

        self.inner.statuses.insert(id.clone(), JobStatus::Queued);
        self.inner.heap.lock().unwrap().push(QueueEntry {
            id: id.clone(),
            priority,
            seq,
            job,
        });

        debug!(job_id = %id, priority = ?priority, seq, "Job enqueued");
        self.inner.notify.notify_one();
    }

    pub fn try_get_status(&self, id: &str) -> Option<JobStatus> {
        self.inner.statuses.get(id).map(|entry| *entry.value())
    }

    /// Number of entries not yet claimed by a worker
    pub fn len(&self) -> usize {
        self.inner.heap.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a not-yet-claimed entry. Returns false when the entry was
    /// never enqueued or a worker already pulled it.
    pub fn cancel(&self, id: &str) -> bool {
        let mut heap = self.inner.heap.lock().unwrap();
        let before = heap.len();
        heap.retain(|entry| entry.id != id);
        let removed = heap.len() < before;
        drop(heap);

        if removed {
            self.inner
                .statuses
                .insert(id.to_string(), JobStatus::Cancelled);
            debug!(job_id = %id, "Job cancelled before claim");
        }
        removed
    }

    /// Start n worker tasks pulling from the queue until shutdown.
    pub fn spawn_workers(&self, count: usize) -> Vec<JoinHandle<()>> {
        (0..count)
            .map(|n| {
                let queue = self.clone();
                tokio::spawn(async move {
                    queue.worker_loop(n).await;
                })
            })
            .collect()
    }

    /// Signal workers to stop once the queue drains their current jobs.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.notify.notify_waiters();
    }

    async fn worker_loop(self, worker: usize) {
        info!(worker, "Queue worker started");
        loop {
            let entry = self.inner.heap.lock().unwrap().pop();
            match entry {
                Some(entry) => {
                    self.inner
                        .statuses
                        .insert(entry.id.clone(), JobStatus::Running);
                    debug!(worker, job_id = %entry.id, "Job claimed");

                    // Job errors are recorded, never crash the loop
                    let status = match entry.job.await {
                        Ok(()) => JobStatus::Completed,
                        Err(e) => {
                            error!(worker, job_id = %entry.id, error = %e, "Job failed");
                            JobStatus::Failed
                        }
                    };
                    self.inner.statuses.insert(entry.id, status);
                }
                None => {
                    if self.inner.shutdown.is_cancelled() {
                        break;
                    }
                    tokio::select! {
                        _ = self.inner.notify.notified() => {}
                        _ = self.inner.shutdown.cancelled() => break,
                    }
                }
            }
        }
        info!(worker, "Queue worker stopped");
    }
}

impl Default for PriorityWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_for(queue: &PriorityWorkQueue, id: &str, expected: JobStatus) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if queue.try_get_status(id) == Some(expected) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{id} never reached {expected:?}"));
    }

    #[tokio::test]
    async fn critical_overtakes_earlier_normal() {
        let queue = PriorityWorkQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (id, priority) in [("a", Priority::Normal), ("b", Priority::Critical)] {
            let order = Arc::clone(&order);
            queue.enqueue(
                id,
                priority,
                Box::pin(async move {
                    order.lock().unwrap().push(id.to_string());
                    Ok(())
                }),
            );
        }

        // Single worker started after both entries are queued
        queue.spawn_workers(1);
        wait_for(&queue, "a", JobStatus::Completed).await;
        wait_for(&queue, "b", JobStatus::Completed).await;

        assert_eq!(*order.lock().unwrap(), vec!["b", "a"]);
        queue.shutdown();
    }

    #[tokio::test]
    async fn fifo_within_a_tier() {
        let queue = PriorityWorkQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for id in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            queue.enqueue(
                id,
                Priority::Normal,
                Box::pin(async move {
                    order.lock().unwrap().push(id.to_string());
                    Ok(())
                }),
            );
        }

        queue.spawn_workers(1);
        wait_for(&queue, "third", JobStatus::Completed).await;

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
        queue.shutdown();
    }

    #[tokio::test]
    async fn cancel_removes_unclaimed_entry() {
        let queue = PriorityWorkQueue::new();
        queue.enqueue("x", Priority::Normal, Box::pin(async { Ok(()) }));

        assert_eq!(queue.len(), 1);
        assert!(queue.cancel("x"));
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.try_get_status("x"), Some(JobStatus::Cancelled));

        // Already gone
        assert!(!queue.cancel("x"));
        assert!(!queue.cancel("never-enqueued"));
    }

    #[tokio::test]
    async fn job_error_is_recorded_and_worker_survives() {
        let queue = PriorityWorkQueue::new();
        queue.enqueue(
            "bad",
            Priority::High,
            Box::pin(async {
                Err(crate::error::ServiceError::Internal {
                    message: "simulated job failure".to_string(),
                })
            }),
        );
        queue.enqueue("good", Priority::Normal, Box::pin(async { Ok(()) }));

        queue.spawn_workers(1);
        wait_for(&queue, "bad", JobStatus::Failed).await;
        wait_for(&queue, "good", JobStatus::Completed).await;
        queue.shutdown();
    }
}
