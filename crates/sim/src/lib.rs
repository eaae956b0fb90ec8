//! Multithreaded warehouse simulation built on the stockroom crates.

pub mod scenario;
pub mod seed;

pub use scenario::{OrderSummary, SimulationSummary, run};
