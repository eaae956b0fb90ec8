//! Events and their distribution.
//!
//! Stock mutations are reported as events. Components that care receive an
//! [`EventBus`] (or an observer built on one) explicitly at construction.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
