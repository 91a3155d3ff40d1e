//! Enumeration of every sellable variation of an item.

use std::collections::{BTreeSet, HashMap, HashSet};

use boxoffice_core::{DomainError, DomainResult, PropertyId, VariationId};

use crate::item::Item;
use crate::property::Property;
use crate::variation::{VariationDict, VariationEntry, VariationKey};

/// Cross product of the item's property values, with curated variations
/// substituted in place.
///
/// `properties` is the pool the item's property ids are resolved against
/// (usually every property of the event).
///
/// - No properties: a single generic entry with an empty dictionary.
/// - Otherwise: one entry per combination, first property varying slowest and
///   values in their property's order. A property without values yields no
///   entries at all.
///
/// # Errors
///
/// - `Integrity` if an item property is missing from the pool, or a curated
///   variation assigns a value that is not on its property.
/// - `Configuration` if a curated variation does not cover exactly the item's
///   properties, or two curated variations share a combination.
pub fn enumerate_variations(
    item: &Item,
    properties: &[Property],
) -> DomainResult<Vec<VariationEntry>> {
    let axes = resolve_axes(item, properties)?;
    if axes.is_empty() {
        return Ok(vec![VariationEntry::Generic(VariationDict::new())]);
    }

    let curated = curated_index(item, &axes)?;

    let mut combinations = vec![VariationDict::new()];
    for axis in &axes {
        let mut next = Vec::with_capacity(combinations.len() * axis.values().len());
        for partial in &combinations {
            for value in axis.values() {
                let mut dict = partial.clone();
                dict.assign(value.clone());
                next.push(dict);
            }
        }
        combinations = next;
    }

    let mut seen = HashSet::with_capacity(combinations.len());
    let mut entries = Vec::with_capacity(combinations.len());
    for dict in combinations {
        let key = dict.identify();
        if !seen.insert(key.clone()) {
            continue;
        }
        let entry = match curated.get(&key) {
            Some(&variation) => VariationEntry::Curated {
                variation,
                values: dict,
            },
            None => VariationEntry::Generic(dict),
        };
        entries.push(entry);
    }

    tracing::debug!(
        item_id = %item.id_typed(),
        axes = axes.len(),
        variations = entries.len(),
        curated = curated.len(),
        "enumerated item variations"
    );
    Ok(entries)
}

fn resolve_axes<'p>(item: &Item, properties: &'p [Property]) -> DomainResult<Vec<&'p Property>> {
    item.property_ids()
        .iter()
        .map(|pid| {
            properties
                .iter()
                .find(|p| p.id_typed() == *pid)
                .ok_or_else(|| {
                    DomainError::integrity(format!(
                        "item '{}' references unknown property {pid}",
                        item.name()
                    ))
                })
        })
        .collect()
}

/// Curated variations keyed by the identity of the combination they cover.
fn curated_index(item: &Item, axes: &[&Property]) -> DomainResult<HashMap<VariationKey, VariationId>> {
    let expected: BTreeSet<PropertyId> = axes.iter().map(|p| p.id_typed()).collect();
    let mut index = HashMap::with_capacity(item.variations().len());

    for variation in item.variations() {
        let assigned: BTreeSet<PropertyId> = variation.assignments().keys().copied().collect();
        if let Some(extra) = assigned.difference(&expected).next() {
            return Err(DomainError::configuration(format!(
                "variation {} assigns property {extra} which item '{}' does not have",
                variation.id_typed(),
                item.name()
            )));
        }
        if let Some(missing) = expected.difference(&assigned).next() {
            return Err(DomainError::configuration(format!(
                "variation {} does not assign a value for property {missing}",
                variation.id_typed()
            )));
        }

        for axis in axes {
            let value_id = variation.value_for(&axis.id_typed());
            if value_id.and_then(|id| axis.value(id)).is_none() {
                return Err(DomainError::integrity(format!(
                    "variation {} assigns a value that is not on property '{}'",
                    variation.id_typed(),
                    axis.name()
                )));
            }
        }

        if let Some(previous) = index.insert(variation.identify(), variation.id_typed()) {
            return Err(DomainError::configuration(format!(
                "variations {previous} and {} cover the same combination",
                variation.id_typed()
            )));
        }
    }

    Ok(index)
}
