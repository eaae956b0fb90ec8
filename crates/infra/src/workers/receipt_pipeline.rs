//! Checkout receipts applied concurrently by a pool of cashier workers.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use stockroom_core::{DomainError, ProductId, ReceiptId, ValueObject};
use stockroom_inventory::{LineOutcome, MutationKind, StockMutator};

use super::pool::{PoolStats, WorkerPool};
use super::WorkerError;
use crate::config::PoolConfig;

/// One (product, quantity) line of a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReceiptLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl ReceiptLine {
    pub fn new(product_id: u64, quantity: u32) -> Self {
        Self {
            product_id: ProductId::new(product_id),
            quantity,
        }
    }
}

impl ValueObject for ReceiptLine {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub id: ReceiptId,
    pub lines: Vec<ReceiptLine>,
}

impl Receipt {
    pub fn new(id: ReceiptId, lines: Vec<ReceiptLine>) -> Self {
        Self { id, lines }
    }
}

/// What happens to a receipt's earlier lines when a later line fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReceiptPolicy {
    /// Every line is attempted; successful lines stay applied.
    #[default]
    BestEffort,
    /// Stop at the first failed line and return every line reserved before it.
    Compensating,
}

impl ReceiptPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BestEffort => "best-effort",
            Self::Compensating => "compensating",
        }
    }
}

impl fmt::Display for ReceiptPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReceiptPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best-effort" => Ok(Self::BestEffort),
            "compensating" => Ok(Self::Compensating),
            other => Err(DomainError::validation(format!("unknown receipt policy: {other}"))),
        }
    }
}

/// Per-receipt result delivered to the pipeline's sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptReport {
    pub receipt_id: ReceiptId,
    pub policy: ReceiptPolicy,
    /// Outcome of every attempted line, in receipt order.
    pub lines: Vec<LineOutcome>,
    /// Returns issued to undo earlier lines (compensating policy only).
    pub compensated: Vec<LineOutcome>,
    /// Lines never attempted because an earlier line failed.
    pub skipped: usize,
    /// Name of the worker thread that processed the receipt.
    pub worker: String,
}

impl ReceiptReport {
    /// True when every line was applied and nothing was undone.
    pub fn is_complete(&self) -> bool {
        self.skipped == 0
            && self.compensated.is_empty()
            && self.lines.iter().all(LineOutcome::is_success)
    }

    pub fn failed_lines(&self) -> impl Iterator<Item = &LineOutcome> {
        self.lines.iter().filter(|l| !l.is_success())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptPipelineConfig {
    pub pool: PoolConfig,
    pub policy: ReceiptPolicy,
    /// Simulated cashier work before each line.
    pub line_delay: Duration,
}

impl Default for ReceiptPipelineConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default().with_name("cashier").with_workers(3),
            policy: ReceiptPolicy::BestEffort,
            line_delay: Duration::ZERO,
        }
    }
}

impl ReceiptPipelineConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.pool.workers = workers;
        self
    }

    pub fn with_policy(mut self, policy: ReceiptPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = delay;
        self
    }
}

type ReportSink = Arc<dyn Fn(ReceiptReport) + Send + Sync>;

/// Fans receipts out across a [`WorkerPool`].
///
/// Lines of one receipt are applied in order on a single worker; different
/// receipts proceed concurrently and only contend on shared products.
pub struct ReceiptPipeline {
    pool: WorkerPool,
    mutator: Arc<StockMutator>,
    policy: ReceiptPolicy,
    line_delay: Duration,
    sink: Option<ReportSink>,
}

impl fmt::Debug for ReceiptPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiptPipeline")
            .field("pool", &self.pool)
            .field("policy", &self.policy)
            .field("line_delay", &self.line_delay)
            .finish_non_exhaustive()
    }
}

impl ReceiptPipeline {
    pub fn new(
        mutator: Arc<StockMutator>,
        config: ReceiptPipelineConfig,
    ) -> Result<Self, WorkerError> {
        Ok(Self {
            pool: WorkerPool::new(config.pool)?,
            mutator,
            policy: config.policy,
            line_delay: config.line_delay,
            sink: None,
        })
    }

    /// Like [`ReceiptPipeline::new`], delivering every report to `sink` on the
    /// worker that produced it.
    pub fn with_sink<F>(
        mutator: Arc<StockMutator>,
        config: ReceiptPipelineConfig,
        sink: F,
    ) -> Result<Self, WorkerError>
    where
        F: Fn(ReceiptReport) + Send + Sync + 'static,
    {
        let mut pipeline = Self::new(mutator, config)?;
        pipeline.sink = Some(Arc::new(sink));
        Ok(pipeline)
    }

    pub fn submit_receipt(
        &self,
        id: ReceiptId,
        lines: Vec<ReceiptLine>,
    ) -> Result<(), WorkerError> {
        self.submit(Receipt::new(id, lines))
    }

    pub fn submit(&self, receipt: Receipt) -> Result<(), WorkerError> {
        let mutator = Arc::clone(&self.mutator);
        let sink = self.sink.clone();
        let policy = self.policy;
        let delay = self.line_delay;

        self.pool.submit(move || {
            let report = process_receipt(&mutator, &receipt, policy, delay);
            if let Some(sink) = sink {
                sink(report);
            }
        })
    }

    pub fn policy(&self) -> ReceiptPolicy {
        self.policy
    }

    /// Finish every queued receipt, then stop the workers.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

/// Apply one receipt's lines in order on the calling thread.
pub fn process_receipt(
    mutator: &StockMutator,
    receipt: &Receipt,
    policy: ReceiptPolicy,
    line_delay: Duration,
) -> ReceiptReport {
    let worker = thread::current().name().unwrap_or("unnamed").to_string();
    let mut lines = Vec::with_capacity(receipt.lines.len());
    let mut compensated = Vec::new();
    let mut skipped = 0;

    for (index, line) in receipt.lines.iter().enumerate() {
        if !line_delay.is_zero() {
            thread::sleep(line_delay);
        }

        let result = mutator.reserve(line.product_id, line.quantity);
        match &result {
            Ok(remaining) => info!(
                receipt_id = %receipt.id,
                worker = %worker,
                product_id = %line.product_id,
                quantity = line.quantity,
                remaining,
                "receipt line applied"
            ),
            Err(err) => warn!(
                receipt_id = %receipt.id,
                worker = %worker,
                product_id = %line.product_id,
                quantity = line.quantity,
                error = %err,
                "receipt line failed"
            ),
        }

        let failed = result.is_err();
        lines.push(LineOutcome {
            product_id: line.product_id,
            quantity: line.quantity,
            result,
        });

        if failed && policy == ReceiptPolicy::Compensating {
            skipped = receipt.lines.len() - index - 1;
            let applied: Vec<_> = lines
                .iter()
                .filter(|l| l.is_success())
                .map(|l| (l.product_id, l.quantity))
                .collect();
            compensated = mutator.apply_lines(MutationKind::Return, applied.into_iter().rev());
            warn!(
                receipt_id = %receipt.id,
                returned = compensated.len(),
                skipped,
                "receipt compensated"
            );
            break;
        }
    }

    let report = ReceiptReport {
        receipt_id: receipt.id,
        policy,
        lines,
        compensated,
        skipped,
        worker,
    };

    info!(
        receipt_id = %report.receipt_id,
        worker = %report.worker,
        lines = report.lines.len(),
        failed = report.failed_lines().count(),
        "receipt processed"
    );

    report
}
