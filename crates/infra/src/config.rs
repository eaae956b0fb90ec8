//! Runtime configuration for the worker components.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::workers::{ReceiptPipelineConfig, ReceiptPolicy};

pub const RECEIPT_WORKERS_VAR: &str = "STOCKROOM_RECEIPT_WORKERS";
pub const DOCUMENT_WORKERS_VAR: &str = "STOCKROOM_DOCUMENT_WORKERS";
pub const LINE_DELAY_VAR: &str = "STOCKROOM_LINE_DELAY_MS";
pub const RECEIPT_POLICY_VAR: &str = "STOCKROOM_RECEIPT_POLICY";
pub const SEED_FILE_VAR: &str = "STOCKROOM_SEED_FILE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: expected a non-negative integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var}: worker count must be at least 1")]
    ZeroWorkers { var: &'static str },

    #[error("{var}: unknown receipt policy '{value}'")]
    InvalidPolicy { var: &'static str, value: String },
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Thread name prefix; workers are named `{name}-{n}`.
    pub name: String,
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "worker-pool".to_string(),
            workers: 4,
        }
    }
}

impl PoolConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Process-level settings, normally read from `STOCKROOM_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub receipt_workers: usize,
    pub document_workers: usize,
    /// Simulated work per receipt line.
    pub line_delay: Duration,
    pub receipt_policy: ReceiptPolicy,
    /// Optional JSON array of product records used to seed the registry.
    pub seed_file: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            receipt_workers: 3,
            document_workers: 4,
            line_delay: Duration::ZERO,
            receipt_policy: ReceiptPolicy::default(),
            seed_file: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup; unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let receipt_workers = match read(RECEIPT_WORKERS_VAR) {
            Some(value) => parse_workers(RECEIPT_WORKERS_VAR, &value)?,
            None => defaults.receipt_workers,
        };
        let document_workers = match read(DOCUMENT_WORKERS_VAR) {
            Some(value) => parse_workers(DOCUMENT_WORKERS_VAR, &value)?,
            None => defaults.document_workers,
        };
        let line_delay = match read(LINE_DELAY_VAR) {
            Some(value) => Duration::from_millis(parse_number(LINE_DELAY_VAR, &value)?),
            None => defaults.line_delay,
        };
        let receipt_policy = match read(RECEIPT_POLICY_VAR) {
            Some(value) => value.parse::<ReceiptPolicy>().map_err(|_| ConfigError::InvalidPolicy {
                var: RECEIPT_POLICY_VAR,
                value,
            })?,
            None => defaults.receipt_policy,
        };

        Ok(Self {
            receipt_workers,
            document_workers,
            line_delay,
            receipt_policy,
            seed_file: read(SEED_FILE_VAR).map(PathBuf::from),
        })
    }

    pub fn receipt_pipeline(&self) -> ReceiptPipelineConfig {
        ReceiptPipelineConfig::default()
            .with_workers(self.receipt_workers)
            .with_policy(self.receipt_policy)
            .with_line_delay(self.line_delay)
    }

    pub fn document_pool(&self) -> PoolConfig {
        PoolConfig::default()
            .with_name("documents")
            .with_workers(self.document_workers)
    }
}

fn parse_number(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: value.to_string(),
    })
}

fn parse_workers(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    let n = parse_number(var, value)?;
    if n == 0 {
        return Err(ConfigError::ZeroWorkers { var });
    }
    usize::try_from(n).map_err(|_| ConfigError::InvalidNumber {
        var,
        value: value.to_string(),
    })
}
