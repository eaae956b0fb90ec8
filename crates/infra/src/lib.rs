//! Infrastructure layer: worker threads, queues and the components that drive
//! stock mutations concurrently.

pub mod config;
pub mod documents;
pub mod orders;
pub mod workers;

mod integration_tests;

pub use config::{ConfigError, PoolConfig, RuntimeConfig};
pub use documents::DocumentProcessor;
pub use orders::{FailureSink, Order, OrderAggregator, OrderFailure, OrderLine};
pub use workers::{
    LifecycleState, MutationTask, PoolStats, Receipt, ReceiptLine, ReceiptPipeline,
    ReceiptPipelineConfig, ReceiptPolicy, ReceiptReport, TaskOutcome, TaskQueue, TaskQueueStats,
    WorkItem, WorkerError, WorkerPool, process_receipt,
};
