//! Catalog domain module.
//!
//! Properties and their values, versioned items, curated variations, and the
//! enumeration of every sellable variation of an item. Pure domain logic: no
//! IO, no storage.

pub mod enumerator;
pub mod item;
pub mod property;
pub mod variation;

#[cfg(test)]
mod test_support;

pub use enumerator::enumerate_variations;
pub use item::{Item, Validity, VersionState};
pub use property::{Property, PropertyValue};
pub use variation::{ItemVariation, VariationDict, VariationEntry, VariationKey};
