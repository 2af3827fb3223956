//! Fixed-size worker pool for disk-touching cache work.

use std::thread;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::{CacheError, Result};

const MIN_WORKERS: usize = 2;
const MAX_WORKERS: usize = 4;

/// Worker count for a machine with `cpus` cores: one core is left for the
/// owner thread, and the result is kept within 2..=4.
pub fn pool_size(cpus: usize) -> usize {
    cpus.saturating_sub(1).clamp(MIN_WORKERS, MAX_WORKERS)
}

pub struct WorkerPool {
    pool: ThreadPool,
    threads: usize,
}

impl WorkerPool {
    /// Pool sized from the available cores.
    pub fn new() -> Result<Self> {
        let cpus = thread::available_parallelism().map_or(1, |n| n.get());
        Self::with_threads(pool_size(cpus))
    }

    pub fn with_threads(threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("picload-worker-{}", i))
            .build()
            .map_err(|e| CacheError::Pool {
                message: e.to_string(),
            })?;

        debug!("Started worker pool with {} threads", threads);
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `job` on a worker thread. Fire-and-forget.
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, time::Duration};

    use super::*;

    #[test]
    fn test_pool_size_bounds() {
        assert_eq!(pool_size(1), 2);
        assert_eq!(pool_size(2), 2);
        assert_eq!(pool_size(3), 2);
        assert_eq!(pool_size(4), 3);
        assert_eq!(pool_size(5), 4);
        assert_eq!(pool_size(64), 4);
    }

    #[test]
    fn test_default_pool_within_bounds() {
        let pool = WorkerPool::new().unwrap();
        assert!((MIN_WORKERS..=MAX_WORKERS).contains(&pool.threads()));
    }

    #[test]
    fn test_spawn_runs_on_named_worker() {
        let pool = WorkerPool::with_threads(2).unwrap();
        let (tx, rx) = mpsc::channel();

        pool.spawn(move || {
            let name = thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        });

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert!(name.starts_with("picload-worker-"));
    }
}
