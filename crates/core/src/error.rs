//! Domain error model.

use thiserror::Error;

use crate::id::ProductId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Business failures (stock, unknown ids) are reported through callbacks and
/// receipt reports; they never abort a worker. Infrastructure concerns such as
/// closed queues belong to the infra crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. zero quantity, empty name).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A reservation would drive the product's quantity below zero.
    #[error(
        "insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u64,
        available: i64,
    },

    /// The referenced product is not in the registry.
    #[error("unknown product {0}")]
    UnknownProduct(ProductId),

    /// A product with the same id is already registered.
    #[error("product {0} already registered")]
    DuplicateProduct(ProductId),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// An operation is not allowed in the current state.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn insufficient(product_id: ProductId, requested: u64, available: i64) -> Self {
        Self::InsufficientStock {
            product_id,
            requested,
            available,
        }
    }

    /// True for the failures a stock mutation reports as `success = false`.
    pub fn is_stock_failure(&self) -> bool {
        matches!(
            self,
            DomainError::InsufficientStock { .. } | DomainError::UnknownProduct(_)
        )
    }
}
