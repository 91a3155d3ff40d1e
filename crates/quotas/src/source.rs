//! Read-side collaborator traits the calculator queries, plus plain snapshot
//! implementations of them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use boxoffice_catalog::{Item, ItemVariation};
use boxoffice_core::{EventId, ItemId, VariationId};
use boxoffice_orders::{CartPosition, Order};

use crate::quota::Quota;

/// What an availability query is about: an item without properties, or one
/// specific curated variation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum StockTarget {
    Item(ItemId),
    Variation(VariationId),
}

impl core::fmt::Display for StockTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StockTarget::Item(id) => write!(f, "item {id}"),
            StockTarget::Variation(id) => write!(f, "variation {id}"),
        }
    }
}

/// Configuration records: current item versions and quotas.
pub trait StockCatalog: Send + Sync {
    /// Current version of an item.
    fn item(&self, id: ItemId) -> Option<Item>;

    /// A curated variation of a current item version.
    fn variation(&self, id: VariationId) -> Option<ItemVariation>;

    /// A curated variation that only exists on a superseded item version.
    /// Quotas may still list it to account for stock sold before the item
    /// was versioned; it can no longer be queried or reserved.
    fn retired_variation(&self, _id: VariationId) -> Option<ItemVariation> {
        None
    }

    /// Every quota that references `target` directly.
    fn quotas_for(&self, target: StockTarget) -> Vec<Quota>;
}

/// Orders and cart reservations of an event.
///
/// Implementations may return records that hold no stock; the calculator
/// filters by status and expiry itself.
pub trait StockLedger: Send + Sync {
    fn orders(&self, event_id: EventId) -> Vec<Order>;

    fn cart_positions(&self, event_id: EventId) -> Vec<CartPosition>;
}

impl<S> StockCatalog for Arc<S>
where
    S: StockCatalog + ?Sized,
{
    fn item(&self, id: ItemId) -> Option<Item> {
        (**self).item(id)
    }

    fn variation(&self, id: VariationId) -> Option<ItemVariation> {
        (**self).variation(id)
    }

    fn retired_variation(&self, id: VariationId) -> Option<ItemVariation> {
        (**self).retired_variation(id)
    }

    fn quotas_for(&self, target: StockTarget) -> Vec<Quota> {
        (**self).quotas_for(target)
    }
}

impl<S> StockLedger for Arc<S>
where
    S: StockLedger + ?Sized,
{
    fn orders(&self, event_id: EventId) -> Vec<Order> {
        (**self).orders(event_id)
    }

    fn cart_positions(&self, event_id: EventId) -> Vec<CartPosition> {
        (**self).cart_positions(event_id)
    }
}

/// Immutable catalog data held in memory.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub items: Vec<Item>,
    pub quotas: Vec<Quota>,
}

impl StockCatalog for CatalogSnapshot {
    fn item(&self, id: ItemId) -> Option<Item> {
        self.items
            .iter()
            .find(|i| i.id_typed() == id && i.version_end().is_none())
            .cloned()
    }

    fn variation(&self, id: VariationId) -> Option<ItemVariation> {
        self.items
            .iter()
            .filter(|i| i.version_end().is_none())
            .find_map(|i| i.variation(id))
            .cloned()
    }

    fn retired_variation(&self, id: VariationId) -> Option<ItemVariation> {
        self.items
            .iter()
            .filter(|i| i.version_end().is_some())
            .find_map(|i| i.variation(id))
            .cloned()
    }

    fn quotas_for(&self, target: StockTarget) -> Vec<Quota> {
        self.quotas
            .iter()
            .filter(|q| q.references(target))
            .cloned()
            .collect()
    }
}

/// Immutable orders and carts held in memory.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub orders: Vec<Order>,
    pub carts: Vec<CartPosition>,
}

impl StockLedger for LedgerSnapshot {
    fn orders(&self, event_id: EventId) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|o| o.event_id() == Some(event_id))
            .cloned()
            .collect()
    }

    fn cart_positions(&self, event_id: EventId) -> Vec<CartPosition> {
        self.carts
            .iter()
            .filter(|c| c.event_id() == event_id)
            .cloned()
            .collect()
    }
}
