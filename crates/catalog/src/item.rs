use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boxoffice_core::{
    DomainError, DomainResult, Entity, EventId, ItemId, ItemVersionId, PropertyId, VariationId,
};

use crate::enumerator::enumerate_variations;
use crate::property::Property;
use crate::variation::{ItemVariation, VariationEntry};

/// Lifecycle of one item version record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionState {
    /// Current version: open-ended validity, associations may change.
    Active,
    /// Closed by `clone_shallow`; immutable.
    Superseded,
}

/// Validity window `[start, end)` of a version record. `end = None` is open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validity {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl Validity {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && self.end.is_none_or(|end| at < end)
    }
}

/// A sellable item, one version record of it.
///
/// `id` is the base identity shared by every version; orders, carts and
/// quotas reference that. `version_id` names this particular record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    version_id: ItemVersionId,
    event_id: EventId,
    name: String,
    /// Price in smallest currency unit (e.g., cents).
    default_price: u64,
    property_ids: Vec<PropertyId>,
    variations: Vec<ItemVariation>,
    version_start: DateTime<Utc>,
    version_end: Option<DateTime<Utc>>,
}

impl Item {
    pub fn new(
        id: ItemId,
        event_id: EventId,
        name: impl Into<String>,
        default_price: u64,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("item name cannot be empty"));
        }
        Ok(Self {
            id,
            version_id: ItemVersionId::new(),
            event_id,
            name,
            default_price,
            property_ids: Vec::new(),
            variations: Vec::new(),
            version_start: created_at,
            version_end: None,
        })
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn version_id(&self) -> ItemVersionId {
        self.version_id
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_price(&self) -> u64 {
        self.default_price
    }

    /// Associated properties, in association order (the enumeration order).
    pub fn property_ids(&self) -> &[PropertyId] {
        &self.property_ids
    }

    pub fn has_properties(&self) -> bool {
        !self.property_ids.is_empty()
    }

    pub fn variations(&self) -> &[ItemVariation] {
        &self.variations
    }

    pub fn variation(&self, id: VariationId) -> Option<&ItemVariation> {
        self.variations.iter().find(|v| v.id_typed() == id)
    }

    pub fn version_start(&self) -> DateTime<Utc> {
        self.version_start
    }

    pub fn version_end(&self) -> Option<DateTime<Utc>> {
        self.version_end
    }

    pub fn validity(&self) -> Validity {
        Validity {
            start: self.version_start,
            end: self.version_end,
        }
    }

    pub fn state(&self) -> VersionState {
        match self.version_end {
            None => VersionState::Active,
            Some(_) => VersionState::Superseded,
        }
    }

    fn ensure_active(&self) -> DomainResult<()> {
        if self.state() == VersionState::Superseded {
            return Err(DomainError::conflict(format!(
                "item version {} is superseded",
                self.version_id
            )));
        }
        Ok(())
    }

    /// Associate a property axis with this item.
    pub fn add_property(&mut self, property: &Property) -> DomainResult<()> {
        self.ensure_active()?;
        if property.event_id() != self.event_id {
            return Err(DomainError::integrity(format!(
                "property '{}' belongs to another event",
                property.name()
            )));
        }
        if self.property_ids.contains(&property.id_typed()) {
            return Err(DomainError::conflict(format!(
                "property '{}' is already associated",
                property.name()
            )));
        }
        self.property_ids.push(property.id_typed());
        Ok(())
    }

    pub fn add_variation(&mut self, variation: ItemVariation) -> DomainResult<()> {
        self.ensure_active()?;
        if variation.item_id() != self.id {
            return Err(DomainError::integrity(format!(
                "variation {} belongs to item {}",
                variation.id_typed(),
                variation.item_id()
            )));
        }
        if self.variations.iter().any(|v| v.same_entity(&variation)) {
            return Err(DomainError::conflict(format!(
                "variation {} already exists",
                variation.id_typed()
            )));
        }
        self.variations.push(variation);
        Ok(())
    }

    /// Mutable access to a curated variation, e.g. to assign more values.
    pub fn variation_mut(&mut self, id: VariationId) -> DomainResult<&mut ItemVariation> {
        self.ensure_active()?;
        self.variations
            .iter_mut()
            .find(|v| v.id_typed() == id)
            .ok_or_else(|| DomainError::not_found(format!("variation {id}")))
    }

    /// Close this version at `at` and return its successor.
    ///
    /// The successor keeps the base identity and scalar fields, starts an
    /// open-ended validity window at `at`, and has no properties or curated
    /// variations. This record keeps its associations and becomes immutable.
    pub fn clone_shallow(&mut self, at: DateTime<Utc>) -> DomainResult<Item> {
        self.ensure_active()?;
        if at < self.version_start {
            return Err(DomainError::validation(
                "a new version cannot start before the current one",
            ));
        }

        self.version_end = Some(at);
        let next = Item {
            id: self.id,
            version_id: ItemVersionId::new(),
            event_id: self.event_id,
            name: self.name.clone(),
            default_price: self.default_price,
            property_ids: Vec::new(),
            variations: Vec::new(),
            version_start: at,
            version_end: None,
        };

        tracing::debug!(
            item_id = %self.id,
            superseded = %self.version_id,
            current = %next.version_id,
            "item version cloned"
        );
        Ok(next)
    }

    /// Every sellable variation of this item. See [`enumerate_variations`].
    pub fn get_all_variations(&self, properties: &[Property]) -> DomainResult<Vec<VariationEntry>> {
        enumerate_variations(self, properties)
    }

    /// Effective price of an enumerated variation.
    pub fn price_for(&self, entry: &VariationEntry) -> u64 {
        entry
            .curated()
            .and_then(|id| self.variation(id))
            .and_then(ItemVariation::default_price)
            .unwrap_or(self.default_price)
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Fixture, t0};
    use chrono::Duration;

    #[test]
    fn new_item_is_active_and_open_ended() {
        let f = Fixture::new();
        let item = f.item("Ticket");
        assert_eq!(item.state(), VersionState::Active);
        assert!(item.version_end().is_none());
        assert!(item.validity().contains(t0() + Duration::days(365)));
        assert!(!item.validity().contains(t0() - Duration::seconds(1)));
    }

    #[test]
    fn rejects_empty_name() {
        let err = Item::new(ItemId::new(), EventId::new(), " ", 0, t0()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn clone_shallow_closes_source_and_drops_associations() {
        let f = Fixture::new();
        let mut old = Item::new(ItemId::new(), f.event_id, "Dummy", 14, t0()).unwrap();
        old.add_property(&f.size).unwrap();

        let at = t0() + Duration::hours(1);
        let new = old.clone_shallow(at).unwrap();

        assert!(new.version_end().is_none());
        assert_eq!(old.version_end(), Some(at));
        assert_eq!(new.property_ids().len(), 0);
        assert_eq!(old.property_ids().len(), 1);

        assert_eq!(new.id_typed(), old.id_typed());
        assert_ne!(new.version_id(), old.version_id());
        assert_eq!(new.default_price(), 14);
        assert_eq!(new.version_start(), at);
        assert_eq!(old.state(), VersionState::Superseded);
        assert_eq!(new.state(), VersionState::Active);
    }

    #[test]
    fn clone_shallow_does_not_copy_curated_variations() {
        let f = Fixture::new();
        let mut old = f.item("Shirt");
        old.add_property(&f.size).unwrap();
        let mut iv = ItemVariation::new(VariationId::new(), old.id_typed());
        iv.assign(&f.size_value("S")).unwrap();
        old.add_variation(iv).unwrap();

        let new = old.clone_shallow(t0()).unwrap();
        assert!(new.variations().is_empty());
        assert_eq!(old.variations().len(), 1);
    }

    #[test]
    fn superseded_version_is_immutable() {
        let f = Fixture::new();
        let mut old = f.item("Dummy");
        let _new = old.clone_shallow(t0()).unwrap();

        assert!(matches!(old.add_property(&f.size), Err(DomainError::Conflict(_))));
        assert!(matches!(old.clone_shallow(t0()), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn clone_cannot_predate_version_start() {
        let f = Fixture::new();
        let mut item = f.item("Dummy");
        let err = item.clone_shallow(t0() - Duration::days(1)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(item.state(), VersionState::Active);
    }

    #[test]
    fn add_property_checks_event_and_duplicates() {
        let f = Fixture::new();
        let mut item = f.item("Shirt");
        item.add_property(&f.size).unwrap();
        assert!(matches!(item.add_property(&f.size), Err(DomainError::Conflict(_))));

        let foreign = Property::new(PropertyId::new(), EventId::new(), "Size").unwrap();
        assert!(matches!(item.add_property(&foreign), Err(DomainError::Integrity(_))));
    }

    #[test]
    fn add_variation_rejects_foreign_item() {
        let f = Fixture::new();
        let mut item = f.item("Shirt");
        let foreign = ItemVariation::new(VariationId::new(), ItemId::new());
        assert!(matches!(item.add_variation(foreign), Err(DomainError::Integrity(_))));
    }

    #[test]
    fn price_for_prefers_curated_override() {
        let f = Fixture::new();
        let mut item = Item::new(ItemId::new(), f.event_id, "Shirt", 2000, t0()).unwrap();
        item.add_property(&f.size).unwrap();
        let mut iv = ItemVariation::new(VariationId::new(), item.id_typed()).with_price(2500);
        iv.assign(&f.size_value("L")).unwrap();
        let curated_id = iv.id_typed();
        item.add_variation(iv).unwrap();

        let entries = item.get_all_variations(&f.properties()).unwrap();
        for entry in &entries {
            let expected = if entry.curated() == Some(curated_id) { 2500 } else { 2000 };
            assert_eq!(item.price_for(entry), expected);
        }
    }
}
