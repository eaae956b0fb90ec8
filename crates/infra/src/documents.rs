//! Background processing of warehouse documents.

use std::sync::Arc;

use tracing::{debug, warn};

use stockroom_core::DomainResult;
use stockroom_inventory::{Document, DocumentReport, StockMutator};

use crate::config::PoolConfig;
use crate::workers::{PoolStats, WorkerError, WorkerPool};

/// Runs [`Document::process`] on a worker pool.
///
/// The document is handed back to the completion callback together with the
/// report, so the caller keeps ownership of the processed state.
#[derive(Debug)]
pub struct DocumentProcessor {
    pool: WorkerPool,
    mutator: Arc<StockMutator>,
}

impl DocumentProcessor {
    pub fn new(mutator: Arc<StockMutator>, config: PoolConfig) -> Result<Self, WorkerError> {
        Ok(Self {
            pool: WorkerPool::new(config)?,
            mutator,
        })
    }

    pub fn process_async<F>(
        &self,
        document: Box<dyn Document>,
        on_done: F,
    ) -> Result<(), WorkerError>
    where
        F: FnOnce(Box<dyn Document>, DomainResult<DocumentReport>) + Send + 'static,
    {
        let mutator = Arc::clone(&self.mutator);
        self.pool.submit(move || {
            let mut document = document;
            let result = document.process(&mutator);

            match &result {
                Ok(report) => debug!(
                    document_id = %report.document_id,
                    failed = report.failed_lines(),
                    "document job finished"
                ),
                Err(err) => warn!(
                    document_id = %document.id(),
                    number = document.number(),
                    error = %err,
                    "document rejected"
                ),
            }

            on_done(document, result);
        })
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}
