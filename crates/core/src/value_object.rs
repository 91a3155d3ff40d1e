//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// A value object has no identity of its own; two instances holding the same
/// attributes are interchangeable. `VariationDict` is the main example in this
/// workspace: two dictionaries assigning the same values are equal no matter
/// how they were built.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
