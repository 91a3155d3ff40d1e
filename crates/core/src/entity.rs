//! Entities: records identified by an id that survives changes to their data.

/// A record with a stable identity.
///
/// Two entities with equal ids are the same record even when their fields
/// differ (e.g. a cart position before and after its expiry was extended).
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Same identity, regardless of the remaining fields.
    fn same_entity(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
