//! Fixed-size worker pool over a bounded crossbeam queue.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::error::PoolError;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: RwLock<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
    panics: Arc<AtomicU64>,
}

impl WorkerPool {
    pub fn new(size: usize, queue_capacity: usize, name: &str) -> Self {
        let size = size.max(1);
        let (tx, rx): (Sender<Job>, Receiver<Job>) = bounded(queue_capacity.max(1));
        let panics = Arc::new(AtomicU64::new(0));

        let workers = (0..size)
            .filter_map(|id| {
                let rx = rx.clone();
                let panics = panics.clone();
                thread::Builder::new()
                    .name(format!("{name}-{id}"))
                    .spawn(move || {
                        while let Ok(job) = rx.recv() {
                            // a panicking job must not take the worker down with it
                            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                                panics.fetch_add(1, Ordering::Relaxed);
                                warn!(worker = id, "job panicked");
                            }
                        }
                        debug!(worker = id, "worker exiting");
                    })
                    .map_err(|e| warn!(worker = id, error = %e, "failed to spawn worker"))
                    .ok()
            })
            .collect::<Vec<_>>();

        info!(name, workers = workers.len(), "worker pool started");
        Self {
            sender: RwLock::new(Some(tx)),
            size: workers.len(),
            workers: Mutex::new(workers),
            panics,
        }
    }

    /// Queues `job` without blocking.
    pub fn execute(&self, job: Job) -> Result<(), PoolError> {
        let guard = self.sender.read();
        let sender = guard.as_ref().ok_or(PoolError::ShutDown)?;
        if self.size == 0 {
            return Err(PoolError::ShutDown);
        }
        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => PoolError::QueueFull,
            TrySendError::Disconnected(_) => PoolError::ShutDown,
        })
    }

    /// Stops accepting work, drains the queue and joins every worker.
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        let Some(sender) = self.sender.write().take() else {
            return;
        };
        drop(sender);
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let count = workers.len();
        for handle in workers {
            if handle.join().is_err() {
                warn!("worker thread panicked during shutdown");
            }
        }
        info!(workers = count, "worker pool stopped");
    }

    pub fn is_running(&self) -> bool {
        self.sender.read().is_some()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn panics(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_runs_jobs_on_named_threads() {
        let pool = WorkerPool::new(2, 16, "test-pool");
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..10 {
            let tx = tx.clone();
            pool.execute(Box::new(move || {
                let name = thread::current().name().map(str::to_string);
                tx.send((i, name)).unwrap();
            }))
            .unwrap();
        }
        let mut seen: Vec<_> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_by_key(|(i, _)| *i);
        assert_eq!(seen.len(), 10);
        assert!(seen.iter().all(|(_, n)| n.as_deref().unwrap().starts_with("test-pool-")));
    }

    #[test]
    fn test_shutdown_is_idempotent_and_rejects_work() {
        let pool = WorkerPool::new(1, 4, "stop");
        pool.shutdown();
        pool.shutdown();
        assert!(!pool.is_running());
        assert_eq!(pool.execute(Box::new(|| {})), Err(PoolError::ShutDown));
    }

    #[test]
    fn test_survives_panicking_job() {
        let pool = WorkerPool::new(1, 4, "panic");
        pool.execute(Box::new(|| panic!("boom"))).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        pool.execute(Box::new(move || tx.send(7).unwrap())).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(7));
        assert_eq!(pool.panics(), 1);
    }
}
