//! Inventory domain: products, the registry and stock mutation.
//!
//! Everything here is synchronous and thread-safe; the worker machinery that
//! drives it lives in `stockroom-infra`.

pub mod document;
pub mod events;
pub mod mutator;
pub mod observer;
pub mod product;
pub mod registry;

pub use document::{
    Document, DocumentFactory, DocumentHeader, DocumentKind, DocumentLine, DocumentReport,
    DocumentStatus, IncomeInvoice, OutcomeInvoice, SaleReceipt, StocktakeAct,
};
pub use events::{MutationKind, MutationRejected, StockChanged, StockChecked, StockEvent};
pub use mutator::{LineOutcome, StockMutator};
pub use observer::{BusObserver, NoopObserver, StockObserver};
pub use product::{Product, ProductRecord};
pub use registry::ProductRegistry;
