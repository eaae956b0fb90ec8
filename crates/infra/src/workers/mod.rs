//! Background workers: the serializing task queue, the generic pool and the
//! receipt pipeline built on it.

use std::any::Any;

use serde::Serialize;
use thiserror::Error;

pub mod pool;
pub(crate) mod queue;
pub mod receipt_pipeline;
pub mod task_queue;

pub use pool::{PoolStats, WorkItem, WorkerPool};
pub use receipt_pipeline::{
    Receipt, ReceiptLine, ReceiptPipeline, ReceiptPipelineConfig, ReceiptPolicy, ReceiptReport,
    process_receipt,
};
pub use task_queue::{MutationTask, TaskOutcome, TaskQueue, TaskQueueStats};

/// Errors surfaced synchronously to callers of the worker components.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Submission after shutdown began.
    #[error("queue closed")]
    QueueClosed,

    /// A pool was configured with zero workers.
    #[error("worker pool '{0}' needs at least one worker")]
    NoWorkers(String),

    #[error("failed to spawn worker thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Lifecycle of a queue and its worker(s).
///
/// `Running` accepts submissions. `ShuttingDown` rejects them while the
/// workers drain the backlog. `Stopped` means every worker thread has exited.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Running,
    ShuttingDown,
    Stopped,
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::panic;

    use super::*;

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let payload = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload = panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "code 7");
    }
}
