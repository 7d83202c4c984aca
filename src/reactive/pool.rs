//! Shared worker pool for reactive delivery.
//!
//! Jobs are queued on an unbounded channel and picked up by a fixed set of
//! named worker threads. Dropping the last `ThreadPool` handle closes the
//! queue; workers drain what is left and exit.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::error::{ExecutionError, QueryError, QueryResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads (at least one is started).
    pub workers: usize,
    /// Thread name prefix; workers are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        let workers = thread::available_parallelism().map_or(2, |n| n.get().min(4));
        Self {
            workers,
            thread_name_prefix: "boxquery-pool".to_string(),
        }
    }
}

struct PoolInner {
    tx: Sender<Job>,
    workers: usize,
    name: String,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        // Workers exit once the queue is closed and drained. Do not join:
        // the last handle may be dropped from inside a worker.
        debug!(pool = %self.name, "thread pool shutting down");
    }
}

/// Cloneable handle to a worker pool.
#[derive(Clone)]
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.inner.name)
            .field("workers", &self.inner.workers)
            .finish()
    }
}

impl ThreadPool {
    /// Starts the workers.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a worker thread cannot be spawned.
    pub fn new(cfg: ThreadPoolConfig) -> QueryResult<Self> {
        let workers = cfg.workers.max(1);
        let (tx, rx) = unbounded::<Job>();

        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let thread_name = format!("{}-{idx}", cfg.thread_name_prefix);
            thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || worker_loop(&rx))
                .map_err(|e| QueryError::internal(format!("failed to spawn {thread_name}: {e}")))?;
        }

        debug!(pool = %cfg.thread_name_prefix, workers, "thread pool started");
        Ok(Self {
            inner: Arc::new(PoolInner {
                tx,
                workers,
                name: cfg.thread_name_prefix,
            }),
        })
    }

    /// Queues a job.
    ///
    /// # Errors
    ///
    /// `ExecutionError::Disconnected` if every worker has exited.
    pub fn execute<F>(&self, job: F) -> QueryResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.tx.send(Box::new(job)).map_err(|_| {
            QueryError::Execution(ExecutionError::Disconnected {
                path: self.inner.name.clone(),
            })
        })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.inner.workers
    }
}

fn worker_loop(rx: &Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        // A panicking observer must not take the worker down with it.
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!(
                thread = thread::current().name().unwrap_or("unnamed"),
                "pool job panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    fn pool(workers: usize) -> ThreadPool {
        ThreadPool::new(ThreadPoolConfig {
            workers,
            thread_name_prefix: "test-pool".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_jobs_run_on_named_workers() {
        let pool = pool(2);
        let (tx, rx) = crossbeam_channel::unbounded();
        for _ in 0..8 {
            let tx = tx.clone();
            pool.execute(move || {
                let name = thread::current().name().map(str::to_string);
                tx.send(name).unwrap();
            })
            .unwrap();
        }

        let mut names = HashSet::new();
        for _ in 0..8 {
            let name = rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap();
            assert!(name.starts_with("test-pool-"));
            names.insert(name);
        }
        assert!(names.len() <= 2);
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = pool(1);
        pool.execute(|| panic!("observer bug")).unwrap();

        let (tx, rx) = crossbeam_channel::bounded(1);
        pool.execute(move || tx.send(42).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 42);
    }

    #[test]
    fn test_zero_workers_is_clamped() {
        assert_eq!(pool(0).workers(), 1);
    }

    #[test]
    fn test_default_config() {
        let cfg = ThreadPoolConfig::default();
        assert!(cfg.workers >= 1);
        assert_eq!(cfg.thread_name_prefix, "boxquery-pool");
    }
}
