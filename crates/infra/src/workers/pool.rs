//! Fixed-size pool of worker threads sharing one FIFO of closures.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tracing::{debug, error, info};

use super::queue::BlockingQueue;
use super::{LifecycleState, WorkerError, panic_message};
use crate::config::PoolConfig;

/// Fire-and-forget unit of work.
pub type WorkItem = Box<dyn FnOnce() + Send + 'static>;

/// Pool runtime statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub live_workers: usize,
    pub executed: u64,
    pub faulted: u64,
    pub pending: usize,
}

#[derive(Debug, Default)]
struct Counters {
    executed: AtomicU64,
    faulted: AtomicU64,
    live_workers: AtomicUsize,
}

/// Generic worker pool.
///
/// - `submit` wakes a single idle worker
/// - no ordering guarantee between items
/// - a panicking item is caught and logged at the dispatch boundary; the
///   worker that ran it keeps serving the queue
/// - `shutdown` (also run on drop) rejects new items, drains the backlog and
///   joins every worker
pub struct WorkerPool {
    name: String,
    size: usize,
    queue: Arc<BlockingQueue<WorkItem>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("pending", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Result<Self, WorkerError> {
        if config.workers == 0 {
            return Err(WorkerError::NoWorkers(config.name));
        }

        let queue = Arc::new(BlockingQueue::<WorkItem>::new());
        let counters = Arc::new(Counters::default());
        let mut workers = Vec::with_capacity(config.workers);

        for index in 1..=config.workers {
            let name = format!("{}-{}", config.name, index);
            let queue_ref = Arc::clone(&queue);
            let counters_ref = Arc::clone(&counters);

            counters.live_workers.fetch_add(1, Ordering::SeqCst);
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&name, &queue_ref, &counters_ref));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    counters.live_workers.fetch_sub(1, Ordering::SeqCst);
                    queue.close();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(WorkerError::Spawn {
                        name: format!("{}-{}", config.name, index),
                        source,
                    });
                }
            }
        }

        info!(pool = %config.name, workers = config.workers, "worker pool started");

        Ok(Self {
            name: config.name,
            size: config.workers,
            queue,
            workers: Mutex::new(workers),
            counters,
        })
    }

    /// Enqueue a closure.
    pub fn submit<F>(&self, item: F) -> Result<(), WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_boxed(Box::new(item))
    }

    pub fn submit_boxed(&self, item: WorkItem) -> Result<(), WorkerError> {
        self.queue.push(item)
    }

    /// Stop accepting work, let the workers drain the queue, then join them.
    ///
    /// Safe to call more than once. From inside a work item it only closes the
    /// queue: no worker is joined and every handle stays in the pool, so a
    /// later `shutdown` from outside still waits for all of them.
    pub fn shutdown(&self) {
        if self.queue.close() {
            info!(pool = %self.name, pending = self.queue.len(), "worker pool shutting down");
        }

        let current = thread::current().id();
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            if workers.iter().any(|h| h.thread().id() == current) {
                return;
            }
            workers.drain(..).collect()
        };

        for handle in handles {
            if handle.join().is_err() {
                error!(pool = %self.name, "worker thread terminated abnormally");
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn state(&self) -> LifecycleState {
        if !self.queue.is_closed() {
            LifecycleState::Running
        } else if self.counters.live_workers.load(Ordering::SeqCst) > 0 {
            LifecycleState::ShuttingDown
        } else {
            LifecycleState::Stopped
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.size,
            live_workers: self.counters.live_workers.load(Ordering::SeqCst),
            executed: self.counters.executed.load(Ordering::SeqCst),
            faulted: self.counters.faulted.load(Ordering::SeqCst),
            pending: self.queue.len(),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(name: &str, queue: &BlockingQueue<WorkItem>, counters: &Counters) {
    debug!(worker = name, "worker started");

    while let Some(item) = queue.pop() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(item));
        counters.executed.fetch_add(1, Ordering::SeqCst);

        if let Err(payload) = outcome {
            counters.faulted.fetch_add(1, Ordering::SeqCst);
            error!(
                worker = name,
                panic = %panic_message(payload.as_ref()),
                "work item panicked; worker continues"
            );
        }
    }

    counters.live_workers.fetch_sub(1, Ordering::SeqCst);
    debug!(worker = name, "worker stopped");
}
