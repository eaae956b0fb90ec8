//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Receipt lines, order lines and product snapshots carry no identity of their
/// own. Two lines naming the same product and quantity are interchangeable, and
/// once built they are never mutated in place (a changed line is a new value).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
