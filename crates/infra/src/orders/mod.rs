//! Orders: asynchronous add/remove/check against a shared task queue, with the
//! reserved lines accumulated per order.

pub mod aggregator;
pub mod order;

pub use aggregator::{FailureSink, OrderAggregator, OrderFailure, OrderLine};
pub use order::Order;
