//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable domain objects defined entirely by their
/// attribute values (e.g. a stock movement). Two value objects with the same
/// values are equal; identity does not matter.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
