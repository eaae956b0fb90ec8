//! `stockroom-core`: domain foundation building blocks.
//!
//! Identifiers, the entity/value-object vocabulary and the domain error model
//! shared by every other crate. No threads, no IO.

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{DocumentId, EventId, OrderId, ProductId, ReceiptId};
pub use value_object::ValueObject;
