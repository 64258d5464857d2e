//! Bounded pool for detached dispatches.
//!
//! Jobs wait in a bounded queue and run on their own tokio tasks, at most
//! `workers` at a time. A job leaves the queue only once a worker is free, so
//! at most `capacity` jobs wait; a full queue rejects new jobs instead of
//! growing. Jobs never observe the submitter's cancellation.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::config::DispatchConfig;
use crate::metrics::DispatchMetrics;

use super::events::Priority;

#[derive(Debug, Error, PartialEq)]
pub enum PoolError {
    #[error("Worker pool queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("Worker pool is shut down")]
    Closed,
}

struct Job {
    priority: Priority,
    task: BoxFuture<'static, ()>,
}

#[derive(Debug, Default)]
struct PoolCounters {
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub capacity: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub completed: u64,
    pub rejected: u64,
}

/// Marks a job finished even if it panics
struct InFlightGuard(Arc<PoolCounters>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.0.completed.fetch_add(1, Ordering::Relaxed);
        DispatchMetrics::job_finished();
    }
}

pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    runner: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<PoolCounters>,
    workers: usize,
    capacity: usize,
}

impl WorkerPool {
    /// Start the pool. Must be called from within a tokio runtime.
    pub fn new(workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let counters = Arc::new(PoolCounters::default());

        let runner = tokio::spawn(run(rx, workers, Arc::clone(&counters)));
        tracing::info!(workers, capacity, "Worker pool started");

        Self {
            sender: Mutex::new(Some(tx)),
            runner: Mutex::new(Some(runner)),
            counters,
            workers,
            capacity,
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.workers, config.queue_capacity)
    }

    /// Queue `task` without waiting; rejects when the queue is full
    pub fn try_submit<F>(&self, priority: Priority, task: F) -> Result<(), PoolError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = sender.as_ref() else {
            return Err(PoolError::Closed);
        };

        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        let job = Job {
            priority,
            task: Box::pin(task),
        };

        match tx.try_send(job) {
            Ok(()) => {
                DispatchMetrics::job_queued();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.counters.queued.fetch_sub(1, Ordering::Relaxed);
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                DispatchMetrics::record_rejected(job.priority.as_str());
                Err(PoolError::Full {
                    capacity: self.capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.queued.fetch_sub(1, Ordering::Relaxed);
                Err(PoolError::Closed)
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.workers,
            capacity: self.capacity,
            queued: self.counters.queued.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Stop accepting jobs and wait for queued and running ones.
    ///
    /// Returns `false` if `timeout` elapsed first; unfinished jobs keep
    /// running in the background.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        // Dropping the sender lets the runner drain the queue and exit
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let runner = self
            .runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(runner) = runner else {
            return true;
        };

        let stats = self.stats();
        tracing::info!(
            queued = stats.queued,
            in_flight = stats.in_flight,
            "Draining worker pool"
        );

        match tokio::time::timeout(timeout, runner).await {
            Ok(_) => {
                tracing::info!(completed = self.stats().completed, "Worker pool drained");
                true
            }
            Err(_) => {
                let stats = self.stats();
                tracing::warn!(
                    queued = stats.queued,
                    in_flight = stats.in_flight,
                    "Worker pool drain timed out"
                );
                false
            }
        }
    }
}

async fn run(mut rx: mpsc::Receiver<Job>, workers: usize, counters: Arc<PoolCounters>) {
    let semaphore = Arc::new(Semaphore::new(workers));

    loop {
        // Hold a free worker before taking a job off the queue
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let Some(job) = rx.recv().await else {
            break;
        };

        counters.queued.fetch_sub(1, Ordering::Relaxed);
        counters.in_flight.fetch_add(1, Ordering::Relaxed);
        DispatchMetrics::job_started();

        let guard = InFlightGuard(Arc::clone(&counters));
        tokio::spawn(async move {
            // Counters settle before the permit is released
            let _permit = permit;
            let _guard = guard;
            job.task.await;
        });
    }

    // Queue closed and drained; wait for running jobs
    let _ = semaphore.acquire_many(workers as u32).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_submitted_jobs() {
        let pool = WorkerPool::new(4, 16);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let done = Arc::clone(&done);
            pool.try_submit(Priority::Normal, async move {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        assert!(pool.shutdown(Duration::from_secs(5)).await);
        assert_eq!(done.load(Ordering::SeqCst), 10);
        assert_eq!(pool.stats().completed, 10);
        assert_eq!(pool.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_rejects_when_full() {
        let pool = WorkerPool::new(1, 1);

        // The runner cannot take jobs until this test yields, so only the
        // queue slot is available
        let mut accepted = 0;
        let mut rejected = 0;
        for _ in 0..5 {
            match pool.try_submit(Priority::Low, futures::future::pending()) {
                Ok(()) => accepted += 1,
                Err(PoolError::Full { capacity }) => {
                    assert_eq!(capacity, 1);
                    rejected += 1;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(rejected, 4);
        assert_eq!(pool.stats().rejected, 4);
    }

    #[tokio::test]
    async fn test_closed_after_shutdown() {
        let pool = WorkerPool::new(2, 4);
        assert!(pool.shutdown(Duration::from_secs(1)).await);
        assert!(pool.is_closed());
        assert_eq!(
            pool.try_submit(Priority::High, async {}),
            Err(PoolError::Closed)
        );
    }

    #[tokio::test]
    async fn test_shutdown_times_out_on_stuck_job() {
        let pool = WorkerPool::new(1, 1);
        pool.try_submit(Priority::Normal, futures::future::pending())
            .unwrap();
        assert!(!pool.shutdown(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_busy_workers_leave_queue_at_capacity() {
        let pool = WorkerPool::new(1, 2);
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let release = Arc::new(tokio::sync::Notify::new());

        let gate = Arc::clone(&release);
        pool.try_submit(Priority::Normal, async move {
            let _ = started_tx.send(());
            gate.notified().await;
        })
        .unwrap();
        started_rx.await.unwrap();

        // The only worker is busy: exactly `capacity` more jobs fit
        for _ in 0..2 {
            pool.try_submit(Priority::Normal, async {}).unwrap();
        }
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            pool.try_submit(Priority::Normal, async {}),
            Err(PoolError::Full { capacity: 2 })
        );
        assert_eq!(pool.stats().queued, 2);
        assert_eq!(pool.stats().in_flight, 1);

        release.notify_one();
        assert!(pool.shutdown(Duration::from_secs(5)).await);
        assert_eq!(pool.stats().completed, 3);
        assert_eq!(pool.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_bounded_concurrency() {
        let pool = WorkerPool::new(2, 64);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.try_submit(Priority::Normal, async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        assert!(pool.shutdown(Duration::from_secs(5)).await);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
