//! Variation identity: value assignments, curated variations and the
//! canonical key both are compared by.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use boxoffice_core::{
    DomainError, DomainResult, Entity, ItemId, PropertyId, PropertyValueId, ValueObject,
    VariationId,
};

use crate::property::PropertyValue;

/// Canonical identity of one combination of property-value assignments.
///
/// Encodes the `(property id, value id)` pairs sorted by property id as
/// `"<property>=<value>"` joined by `;`. Two assignments with the same pairs
/// always produce the same key, regardless of how they were built. The empty
/// assignment (an item without properties) has the empty key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariationKey(String);

impl VariationKey {
    fn encode<'a>(pairs: impl Iterator<Item = (&'a PropertyId, PropertyValueId)>) -> Self {
        let parts: Vec<String> = pairs.map(|(p, v)| format!("{p}={v}")).collect();
        Self(parts.join(";"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl core::fmt::Display for VariationKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mapping from property to the value assigned on that axis.
///
/// Keys are unique and always equal to the assigned value's own property, so a
/// dictionary can never hold a value under a foreign property.
///
/// Equality and hashing only look at `(property id, value id)` pairs and agree
/// with [`VariationDict::identify`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariationDict {
    values: BTreeMap<PropertyId, PropertyValue>,
}

impl VariationDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `value` on its property's axis, returning the value it replaced.
    pub fn assign(&mut self, value: PropertyValue) -> Option<PropertyValue> {
        self.values.insert(value.property_id(), value)
    }

    pub fn remove(&mut self, property_id: &PropertyId) -> Option<PropertyValue> {
        self.values.remove(property_id)
    }

    pub fn get(&self, property_id: &PropertyId) -> Option<&PropertyValue> {
        self.values.get(property_id)
    }

    pub fn contains(&self, property_id: &PropertyId) -> bool {
        self.values.contains_key(property_id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn relevant_items(&self) -> impl Iterator<Item = (&PropertyId, &PropertyValue)> + '_ {
        self.values.iter()
    }

    pub fn relevant_values(&self) -> impl Iterator<Item = &PropertyValue> + '_ {
        self.values.values()
    }

    /// Values sorted by ascending property id.
    pub fn ordered_values(&self) -> Vec<&PropertyValue> {
        self.values.values().collect()
    }

    pub fn identify(&self) -> VariationKey {
        VariationKey::encode(self.values.iter().map(|(p, v)| (p, v.id())))
    }

    fn pairs(&self) -> impl Iterator<Item = (&PropertyId, PropertyValueId)> + '_ {
        self.values.iter().map(|(p, v)| (p, v.id()))
    }
}

impl PartialEq for VariationDict {
    fn eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len() && self.pairs().eq(other.pairs())
    }
}

impl Eq for VariationDict {}

impl Hash for VariationDict {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for (p, v) in self.pairs() {
            p.hash(state);
            v.hash(state);
        }
    }
}

impl ValueObject for VariationDict {}

impl FromIterator<PropertyValue> for VariationDict {
    fn from_iter<T: IntoIterator<Item = PropertyValue>>(iter: T) -> Self {
        let mut dict = Self::new();
        for value in iter {
            dict.assign(value);
        }
        dict
    }
}

/// An explicitly authored variation of an item.
///
/// Holds at most one value per property. Curated variations replace the
/// generically enumerated entry for the same combination and may override the
/// item's price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemVariation {
    id: VariationId,
    item_id: ItemId,
    values: BTreeMap<PropertyId, PropertyValueId>,
    default_price: Option<u64>,
}

impl ItemVariation {
    pub fn new(id: VariationId, item_id: ItemId) -> Self {
        Self {
            id,
            item_id,
            values: BTreeMap::new(),
            default_price: None,
        }
    }

    /// Price override in the smallest currency unit.
    pub fn with_price(mut self, price: u64) -> Self {
        self.default_price = Some(price);
        self
    }

    pub fn id_typed(&self) -> VariationId {
        self.id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn default_price(&self) -> Option<u64> {
        self.default_price
    }

    pub fn assignments(&self) -> &BTreeMap<PropertyId, PropertyValueId> {
        &self.values
    }

    pub fn value_for(&self, property_id: &PropertyId) -> Option<PropertyValueId> {
        self.values.get(property_id).copied()
    }

    /// Assign a value. Re-assigning the same value is a no-op; assigning a
    /// different value on an already assigned property is a conflict.
    pub fn assign(&mut self, value: &PropertyValue) -> DomainResult<()> {
        match self.values.get(&value.property_id()) {
            Some(existing) if *existing == value.id() => Ok(()),
            Some(existing) => Err(DomainError::conflict(format!(
                "variation {} already assigns {existing} for property {}",
                self.id,
                value.property_id()
            ))),
            None => {
                self.values.insert(value.property_id(), value.id());
                Ok(())
            }
        }
    }

    pub fn identify(&self) -> VariationKey {
        VariationKey::encode(self.values.iter().map(|(p, v)| (p, *v)))
    }
}

impl Entity for ItemVariation {
    type Id = VariationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// One enumerated sellable variation of an item.
///
/// Both variants expose the same value-assignment view through
/// [`VariationEntry::values`]; `Curated` additionally names the authored
/// variation that matched the combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VariationEntry {
    Generic(VariationDict),
    Curated {
        variation: VariationId,
        values: VariationDict,
    },
}

impl VariationEntry {
    pub fn values(&self) -> &VariationDict {
        match self {
            VariationEntry::Generic(values) => values,
            VariationEntry::Curated { values, .. } => values,
        }
    }

    pub fn into_values(self) -> VariationDict {
        match self {
            VariationEntry::Generic(values) => values,
            VariationEntry::Curated { values, .. } => values,
        }
    }

    pub fn curated(&self) -> Option<VariationId> {
        match self {
            VariationEntry::Generic(_) => None,
            VariationEntry::Curated { variation, .. } => Some(*variation),
        }
    }

    pub fn is_curated(&self) -> bool {
        self.curated().is_some()
    }

    pub fn identify(&self) -> VariationKey {
        self.values().identify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use uuid::Uuid;

    #[test]
    fn identify_ignores_insertion_order() {
        let f = Fixture::new();
        let s = f.size_value("S");
        let black = f.color_value("black");

        let mut a = VariationDict::new();
        a.assign(s.clone());
        a.assign(black.clone());

        let mut b = VariationDict::new();
        b.assign(black);
        b.assign(s);

        assert_eq!(a.identify(), b.identify());
        assert_eq!(a, b);
    }

    #[test]
    fn changing_a_value_changes_identity() {
        let f = Fixture::new();
        let mut dict = VariationDict::new();
        dict.assign(f.size_value("S"));
        let before = dict.identify();

        let replaced = dict.assign(f.size_value("M"));
        assert_eq!(replaced.map(|v| v.value().to_string()), Some("S".to_string()));
        assert_ne!(dict.identify(), before);
    }

    #[test]
    fn copies_are_independent() {
        let f = Fixture::new();
        let mut original = VariationDict::new();
        original.assign(f.size_value("M"));

        let mut copy = original.clone();
        assert_eq!(copy, original);

        copy.assign(f.size_value("S"));
        assert_ne!(copy, original);
        assert_eq!(original.get(&f.size.id_typed()).map(|v| v.value()), Some("M"));
    }

    #[test]
    fn ordered_values_sort_by_property_key() {
        let key = |n: u128| PropertyId::from_uuid(Uuid::from_u128(n));
        let mut dict = VariationDict::new();
        dict.assign(PropertyValue::new(PropertyValueId::new(), key(4), "b"));
        dict.assign(PropertyValue::new(PropertyValueId::new(), key(2), "a"));

        let values: Vec<&str> = dict.ordered_values().iter().map(|v| v.value()).collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn relevant_views_yield_property_values() {
        let f = Fixture::new();
        let dict: VariationDict = [f.size_value("L"), f.color_value("blue")].into_iter().collect();

        assert_eq!(dict.len(), 2);
        for (key, value) in dict.relevant_items() {
            assert_eq!(*key, value.property_id());
        }
        let mut values: Vec<&str> = dict.relevant_values().map(|v| v.value()).collect();
        values.sort();
        assert_eq!(values, vec!["L", "blue"]);
    }

    #[test]
    fn empty_dict_has_empty_identity() {
        let dict = VariationDict::new();
        assert!(dict.identify().is_empty());
        assert_eq!(dict, VariationDict::default());
    }

    #[test]
    fn curated_variation_shares_identity_with_matching_dict() {
        let f = Fixture::new();
        let s = f.size_value("S");
        let black = f.color_value("black");

        let mut iv = ItemVariation::new(VariationId::new(), ItemId::new());
        iv.assign(&black).unwrap();
        iv.assign(&s).unwrap();

        let dict: VariationDict = [s, black].into_iter().collect();
        assert_eq!(iv.identify(), dict.identify());
    }

    #[test]
    fn variation_rejects_second_value_on_same_property() {
        let f = Fixture::new();
        let mut iv = ItemVariation::new(VariationId::new(), ItemId::new());
        iv.assign(&f.size_value("S")).unwrap();
        iv.assign(&f.size_value("S")).unwrap();

        let err = iv.assign(&f.size_value("M")).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(iv.assignments().len(), 1);
    }

    #[test]
    fn entry_variants_expose_same_values() {
        let f = Fixture::new();
        let dict: VariationDict = [f.size_value("S")].into_iter().collect();
        let variation = VariationId::new();

        let generic = VariationEntry::Generic(dict.clone());
        let curated = VariationEntry::Curated {
            variation,
            values: dict.clone(),
        };

        assert_eq!(generic.values(), curated.values());
        assert_eq!(generic.identify(), curated.identify());
        assert_eq!(curated.curated(), Some(variation));
        assert!(!generic.is_curated());
        assert_eq!(curated.into_values(), dict);
    }
}
