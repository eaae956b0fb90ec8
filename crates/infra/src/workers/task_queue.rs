//! Serializing mutation queue with one dedicated worker thread.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tracing::{debug, error, info};

use stockroom_core::{DomainResult, ProductId};
use stockroom_inventory::{MutationKind, StockMutator};

use super::queue::BlockingQueue;
use super::{LifecycleState, WorkerError, panic_message};

/// Result handed to a task's completion callback: the new (or available)
/// quantity, or the domain error that rejected the mutation.
pub type TaskOutcome = DomainResult<i64>;

type Callback = Box<dyn FnOnce(TaskOutcome) + Send + 'static>;

/// One stock mutation request.
pub struct MutationTask {
    pub kind: MutationKind,
    pub product_id: ProductId,
    pub quantity: u32,
    callback: Option<Callback>,
}

impl MutationTask {
    pub fn new<F>(kind: MutationKind, product_id: ProductId, quantity: u32, callback: F) -> Self
    where
        F: FnOnce(TaskOutcome) + Send + 'static,
    {
        Self {
            kind,
            product_id,
            quantity,
            callback: Some(Box::new(callback)),
        }
    }

    /// A task whose outcome is only logged.
    pub fn detached(kind: MutationKind, product_id: ProductId, quantity: u32) -> Self {
        Self {
            kind,
            product_id,
            quantity,
            callback: None,
        }
    }
}

impl fmt::Debug for MutationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationTask")
            .field("kind", &self.kind)
            .field("product_id", &self.product_id)
            .field("quantity", &self.quantity)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Task queue statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskQueueStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Tasks whose mutation or callback panicked.
    pub faults: u64,
    pub pending: usize,
}

#[derive(Debug, Default)]
struct Shared {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    faults: AtomicU64,
    exited: AtomicBool,
}

/// FIFO of [`MutationTask`]s drained by exactly one worker thread.
///
/// Tasks run one at a time in submission order, and a task's callback returns
/// before the next task starts. Callbacks run on the worker thread.
#[derive(Debug)]
pub struct TaskQueue {
    name: String,
    queue: Arc<BlockingQueue<MutationTask>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl TaskQueue {
    /// Start the worker thread (named `name`) against `mutator`.
    pub fn spawn(name: impl Into<String>, mutator: Arc<StockMutator>) -> Result<Self, WorkerError> {
        let name = name.into();
        let queue = Arc::new(BlockingQueue::new());
        let shared = Arc::new(Shared::default());

        let worker = {
            let queue = Arc::clone(&queue);
            let shared = Arc::clone(&shared);
            let worker_name = name.clone();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&worker_name, &queue, &mutator, &shared))
                .map_err(|source| WorkerError::Spawn {
                    name: name.clone(),
                    source,
                })?
        };

        info!(queue = %name, "task queue started");

        Ok(Self {
            name,
            queue,
            worker: Mutex::new(Some(worker)),
            shared,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a task; never waits for it to run.
    pub fn submit(&self, task: MutationTask) -> Result<(), WorkerError> {
        self.queue.push(task)
    }

    pub fn submit_mutation<F>(
        &self,
        kind: MutationKind,
        product_id: ProductId,
        quantity: u32,
        callback: F,
    ) -> Result<(), WorkerError>
    where
        F: FnOnce(TaskOutcome) + Send + 'static,
    {
        self.submit(MutationTask::new(kind, product_id, quantity, callback))
    }

    /// Reject further submissions, let the worker drain the backlog and join it.
    ///
    /// From a callback (i.e. on the worker thread itself) this only closes the
    /// queue; the worker exits once the backlog is empty.
    pub fn shutdown(&self) {
        if self.queue.close() {
            info!(queue = %self.name, pending = self.queue.len(), "task queue shutting down");
        }

        let handle = {
            let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            match worker.as_ref() {
                Some(h) if h.thread().id() == thread::current().id() => None,
                _ => worker.take(),
            }
        };

        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(queue = %self.name, "task queue worker terminated abnormally");
            }
        }
    }

    pub fn state(&self) -> LifecycleState {
        if !self.queue.is_closed() {
            LifecycleState::Running
        } else if self.shared.exited.load(Ordering::SeqCst) {
            LifecycleState::Stopped
        } else {
            LifecycleState::ShuttingDown
        }
    }

    pub fn stats(&self) -> TaskQueueStats {
        TaskQueueStats {
            processed: self.shared.processed.load(Ordering::SeqCst),
            succeeded: self.shared.succeeded.load(Ordering::SeqCst),
            failed: self.shared.failed.load(Ordering::SeqCst),
            faults: self.shared.faults.load(Ordering::SeqCst),
            pending: self.queue.len(),
        }
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    name: &str,
    queue: &BlockingQueue<MutationTask>,
    mutator: &StockMutator,
    shared: &Shared,
) {
    debug!(queue = name, "task queue worker started");

    while let Some(task) = queue.pop() {
        run_task(name, task, mutator, shared);
    }

    shared.exited.store(true, Ordering::SeqCst);
    debug!(queue = name, "task queue worker stopped");
}

fn run_task(name: &str, task: MutationTask, mutator: &StockMutator, shared: &Shared) {
    let MutationTask {
        kind,
        product_id,
        quantity,
        callback,
    } = task;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        mutator.apply(kind, product_id, quantity)
    }));

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(payload) => {
            shared.processed.fetch_add(1, Ordering::SeqCst);
            shared.faults.fetch_add(1, Ordering::SeqCst);
            error!(
                queue = name,
                %product_id,
                %kind,
                panic = %panic_message(payload.as_ref()),
                "stock mutation panicked; callback skipped"
            );
            return;
        }
    };

    shared.processed.fetch_add(1, Ordering::SeqCst);
    if outcome.is_ok() {
        shared.succeeded.fetch_add(1, Ordering::SeqCst);
    } else {
        shared.failed.fetch_add(1, Ordering::SeqCst);
    }

    let Some(callback) = callback else {
        return;
    };

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || callback(outcome))) {
        shared.faults.fetch_add(1, Ordering::SeqCst);
        error!(
            queue = name,
            %product_id,
            %kind,
            panic = %panic_message(payload.as_ref()),
            "task callback panicked; worker continues"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use stockroom_core::DomainError;
    use stockroom_inventory::{ProductRecord, ProductRegistry, StockEvent};

    use super::*;

    fn mutator(records: Vec<ProductRecord>) -> Arc<StockMutator> {
        Arc::new(StockMutator::new(Arc::new(
            ProductRegistry::from_records(records).unwrap(),
        )))
    }

    #[test]
    fn callback_receives_outcome() {
        let queue = TaskQueue::spawn(
            "tq-outcome",
            mutator(vec![ProductRecord::new(1, "Laptop", 100, 10)]),
        )
        .unwrap();
        let (tx, rx) = mpsc::channel();

        let ok = tx.clone();
        queue
            .submit_mutation(MutationKind::Reserve, ProductId::new(1), 4, move |o| {
                ok.send(o).unwrap()
            })
            .unwrap();
        queue
            .submit_mutation(MutationKind::Reserve, ProductId::new(99), 1, move |o| {
                tx.send(o).unwrap()
            })
            .unwrap();

        let timeout = Duration::from_secs(5);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), Ok(6));
        assert_eq!(
            rx.recv_timeout(timeout).unwrap(),
            Err(DomainError::UnknownProduct(ProductId::new(99)))
        );
    }

    #[test]
    fn tasks_complete_in_submission_order() {
        let queue = TaskQueue::spawn(
            "tq-fifo",
            mutator(vec![ProductRecord::new(1, "Laptop", 100, 0)]),
        )
        .unwrap();
        let (tx, rx) = mpsc::channel();

        for i in 0..50u32 {
            let tx = tx.clone();
            queue
                .submit_mutation(MutationKind::Return, ProductId::new(1), 1, move |o| {
                    tx.send((i, o)).unwrap();
                })
                .unwrap();
        }
        queue.shutdown();

        let seen: Vec<_> = rx.try_iter().collect();
        assert_eq!(seen.len(), 50);
        for (n, (i, outcome)) in seen.into_iter().enumerate() {
            assert_eq!(i as usize, n);
            assert_eq!(outcome, Ok(n as i64 + 1));
        }
    }

    #[test]
    fn callback_finishes_before_next_task_runs() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let applied = Arc::clone(&log);
        let registry = Arc::new(
            ProductRegistry::from_records([ProductRecord::new(1, "Laptop", 100, 10)]).unwrap(),
        );
        let mutator = Arc::new(StockMutator::with_observer(
            registry,
            Arc::new(move |e: &StockEvent| {
                if let StockEvent::Reserved(change) = e {
                    applied.lock().unwrap().push(format!("apply {}", change.new_quantity));
                }
            }),
        ));
        let queue = TaskQueue::spawn("tq-callback-order", mutator).unwrap();

        for _ in 0..3 {
            let log = Arc::clone(&log);
            queue
                .submit_mutation(MutationKind::Reserve, ProductId::new(1), 1, move |o| {
                    thread::sleep(Duration::from_millis(10));
                    log.lock().unwrap().push(format!("done {}", o.unwrap()));
                })
                .unwrap();
        }
        queue.shutdown();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["apply 9", "done 9", "apply 8", "done 8", "apply 7", "done 7"]
        );
    }

    #[test]
    fn panicking_callback_does_not_kill_the_worker() {
        let queue = TaskQueue::spawn(
            "tq-panic",
            mutator(vec![ProductRecord::new(1, "Laptop", 100, 10)]),
        )
        .unwrap();
        let (tx, rx) = mpsc::channel();

        queue
            .submit_mutation(MutationKind::Reserve, ProductId::new(1), 1, |_| {
                panic!("callback bug")
            })
            .unwrap();
        queue
            .submit_mutation(MutationKind::Reserve, ProductId::new(1), 1, move |o| {
                tx.send(o).unwrap()
            })
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Ok(8));
        queue.shutdown();

        let stats = queue.stats();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.faults, 1);
    }

    #[test]
    fn shutdown_drains_then_rejects() {
        let queue = TaskQueue::spawn(
            "tq-shutdown",
            mutator(vec![ProductRecord::new(1, "Laptop", 100, 3)]),
        )
        .unwrap();
        assert_eq!(queue.state(), LifecycleState::Running);

        for _ in 0..5 {
            queue
                .submit(MutationTask::detached(MutationKind::Reserve, ProductId::new(1), 1))
                .unwrap();
        }
        queue.shutdown();

        assert_eq!(queue.state(), LifecycleState::Stopped);
        let stats = queue.stats();
        assert_eq!(stats.processed, 5);
        assert_eq!(stats.succeeded, 3);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.pending, 0);

        let err = queue
            .submit(MutationTask::detached(MutationKind::Return, ProductId::new(1), 1))
            .unwrap_err();
        assert!(matches!(err, WorkerError::QueueClosed));
    }

    #[test]
    fn shutdown_from_callback_does_not_self_join() {
        let queue = Arc::new(
            TaskQueue::spawn(
                "tq-self-shutdown",
                mutator(vec![ProductRecord::new(1, "Laptop", 100, 3)]),
            )
            .unwrap(),
        );
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&queue);

        queue
            .submit_mutation(MutationKind::Check, ProductId::new(1), 1, move |_| {
                inner.shutdown();
                tx.send(()).unwrap();
            })
            .unwrap();

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let late = MutationTask::detached(MutationKind::Check, ProductId::new(1), 1);
        assert!(queue.submit(late).is_err());
    }

    #[test]
    fn stats_serialize_as_json() {
        let stats = TaskQueueStats {
            processed: 3,
            succeeded: 2,
            failed: 1,
            faults: 0,
            pending: 0,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["succeeded"], 2);
        assert_eq!(json["failed"], 1);
    }

    fn explode(_: &StockEvent) {
        panic!("observer bug");
    }

    #[test]
    fn panicking_observer_still_delivers_the_real_outcome() {
        let registry = Arc::new(
            ProductRegistry::from_records([ProductRecord::new(1, "Laptop", 100, 10)]).unwrap(),
        );
        let mutator = Arc::new(StockMutator::with_observer(registry, Arc::new(explode)));
        let queue = TaskQueue::spawn("tq-observer-panic", Arc::clone(&mutator)).unwrap();
        let (tx, rx) = mpsc::channel();

        queue
            .submit_mutation(MutationKind::Reserve, ProductId::new(1), 4, move |o| {
                tx.send(o).unwrap()
            })
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Ok(6));
        queue.shutdown();

        let stats = queue.stats();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.faults, 0);
        assert_eq!(mutator.registry().find(ProductId::new(1)).unwrap().quantity(), 6);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn mutation() -> impl Strategy<Value = (MutationKind, u32)> {
            (
                prop_oneof![Just(MutationKind::Reserve), Just(MutationKind::Return)],
                1u32..5,
            )
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 32,
                ..ProptestConfig::default()
            })]

            /// Property: callbacks arrive in submission order and match a
            /// sequential replay of the same mutations.
            #[test]
            fn callbacks_follow_submission_order(
                initial in 0i64..20,
                tasks in prop::collection::vec(mutation(), 1..40),
            ) {
                let queue = TaskQueue::spawn(
                    "tq-prop",
                    mutator(vec![ProductRecord::new(1, "Laptop", 100, initial)]),
                )
                .unwrap();
                let (tx, rx) = mpsc::channel();

                for (i, (kind, quantity)) in tasks.iter().copied().enumerate() {
                    let tx = tx.clone();
                    queue
                        .submit_mutation(kind, ProductId::new(1), quantity, move |o| {
                            tx.send((i, o)).unwrap()
                        })
                        .unwrap();
                }
                queue.shutdown();

                let seen: Vec<(usize, TaskOutcome)> = rx.try_iter().collect();
                prop_assert_eq!(seen.len(), tasks.len());

                let mut expected = initial;
                for (n, ((i, outcome), (kind, quantity))) in
                    seen.into_iter().zip(tasks.iter().copied()).enumerate()
                {
                    prop_assert_eq!(i, n);
                    let quantity = i64::from(quantity);
                    match kind {
                        MutationKind::Reserve if quantity > expected => {
                            prop_assert!(outcome.is_err());
                        }
                        MutationKind::Reserve => {
                            expected -= quantity;
                            prop_assert_eq!(outcome, Ok(expected));
                        }
                        _ => {
                            expected += quantity;
                            prop_assert_eq!(outcome, Ok(expected));
                        }
                    }
                }
            }
        }
    }
}
