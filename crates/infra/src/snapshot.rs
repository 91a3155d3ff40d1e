//! JSON catalog snapshots: one event's configuration, orders and carts.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use boxoffice_catalog::{Item, ItemVariation, Property, PropertyValue};
use boxoffice_core::{
    CartId, CartPositionId, DomainError, EventId, ExpectedVersion, ItemId, OrderId,
    OrderPositionId, PropertyId, PropertyValueId, QuotaId, VariationId,
};
use boxoffice_orders::{
    CancelOrder, CartPosition, ExpireOrder, MarkPaid, NewPosition, OrderCommand, OrderStatus,
    PlaceOrder, RefundOrder,
};
use boxoffice_quotas::{AddItem, AddVariation, CreateQuota, QuotaCommand};

use crate::store::{InMemoryStore, StoreError};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed snapshot: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFile {
    pub event: EventId,
    #[serde(default)]
    pub properties: Vec<PropertyRecord>,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
    #[serde(default)]
    pub quotas: Vec<QuotaRecord>,
    #[serde(default)]
    pub orders: Vec<OrderRecord>,
    #[serde(default)]
    pub carts: Vec<CartRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub id: PropertyId,
    pub name: String,
    pub values: Vec<ValueRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRecord {
    pub id: PropertyValueId,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub name: String,
    pub price: u64,
    #[serde(default)]
    pub properties: Vec<PropertyId>,
    #[serde(default)]
    pub variations: Vec<VariationRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationRecord {
    pub id: VariationId,
    #[serde(default)]
    pub price: Option<u64>,
    pub values: Vec<PropertyValueId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub id: QuotaId,
    pub name: String,
    /// `null` means unlimited.
    pub size: Option<u64>,
    #[serde(default)]
    pub items: Vec<ItemId>,
    #[serde(default)]
    pub variations: Vec<VariationId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub status: OrderStatus,
    pub placed: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub positions: Vec<PositionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub item: ItemId,
    #[serde(default)]
    pub variation: Option<VariationId>,
    pub price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartRecord {
    pub id: CartPositionId,
    pub cart: CartId,
    pub item: ItemId,
    #[serde(default)]
    pub variation: Option<VariationId>,
    pub price: u64,
    pub expires: DateTime<Utc>,
}

impl CatalogFile {
    pub fn from_json(raw: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Load everything into `store`. Items start their first version at `at`.
    ///
    /// Records are applied in dependency order (properties, items, quotas,
    /// orders, carts) through the regular domain operations, so an
    /// inconsistent file fails with the same errors the operations raise.
    pub fn load_into(&self, store: &InMemoryStore, at: DateTime<Utc>) -> Result<(), SnapshotError> {
        for record in &self.properties {
            let mut property = Property::new(record.id, self.event, record.name.clone())?;
            for value in &record.values {
                property.add_value_with_id(value.id, value.value.clone())?;
            }
            store.upsert_property(property)?;
        }

        for record in &self.items {
            store.upsert_item(self.build_item(store, record, at)?)?;
        }

        for record in &self.quotas {
            store.execute_quota_expecting(
                &QuotaCommand::CreateQuota(CreateQuota {
                    event_id: self.event,
                    quota_id: record.id,
                    name: record.name.clone(),
                    size: record.size,
                    occurred_at: at,
                }),
                ExpectedVersion::Exact(0),
            )?;
            for item_id in &record.items {
                store.execute_quota(&QuotaCommand::AddItem(AddItem {
                    quota_id: record.id,
                    item_id: *item_id,
                    occurred_at: at,
                }))?;
            }
            for variation_id in &record.variations {
                store.execute_quota(&QuotaCommand::AddVariation(AddVariation {
                    quota_id: record.id,
                    variation_id: *variation_id,
                    occurred_at: at,
                }))?;
            }
        }

        for record in &self.orders {
            for command in self.order_commands(record) {
                store.execute_order(&command)?;
            }
        }

        for record in &self.carts {
            store.insert_cart_position(CartPosition::new(
                record.id,
                record.cart,
                self.event,
                record.item,
                record.variation,
                record.price,
                record.expires,
            ))?;
        }

        tracing::info!(
            event_id = %self.event,
            items = self.items.len(),
            quotas = self.quotas.len(),
            orders = self.orders.len(),
            carts = self.carts.len(),
            "snapshot loaded"
        );
        Ok(())
    }

    fn build_item(
        &self,
        store: &InMemoryStore,
        record: &ItemRecord,
        at: DateTime<Utc>,
    ) -> Result<Item, SnapshotError> {
        let mut item = Item::new(record.id, self.event, record.name.clone(), record.price, at)?;

        let mut properties = Vec::with_capacity(record.properties.len());
        for property_id in &record.properties {
            let property = store.property(*property_id).ok_or_else(|| {
                DomainError::integrity(format!(
                    "item '{}' references unknown property {property_id}",
                    record.name
                ))
            })?;
            item.add_property(&property)?;
            properties.push(property);
        }

        for variation in &record.variations {
            let mut built = ItemVariation::new(variation.id, record.id);
            if let Some(price) = variation.price {
                built = built.with_price(price);
            }
            for value_id in &variation.values {
                let value: &PropertyValue = properties
                    .iter()
                    .find_map(|p| p.value(*value_id))
                    .ok_or_else(|| {
                        DomainError::integrity(format!(
                            "variation {} references value {value_id} outside the item's properties",
                            variation.id
                        ))
                    })?;
                built.assign(value)?;
            }
            item.add_variation(built)?;
        }

        Ok(item)
    }

    fn order_commands(&self, record: &OrderRecord) -> Vec<OrderCommand> {
        let order_id = record.id;
        let mut commands = vec![OrderCommand::PlaceOrder(PlaceOrder {
            event_id: self.event,
            order_id,
            positions: record
                .positions
                .iter()
                .map(|p| NewPosition {
                    position_id: OrderPositionId::new(),
                    item_id: p.item,
                    variation_id: p.variation,
                    price: p.price,
                })
                .collect(),
            expires: record.expires,
            occurred_at: record.placed,
        })];

        let paid = OrderCommand::MarkPaid(MarkPaid {
            order_id,
            occurred_at: record.placed,
        });
        match record.status {
            OrderStatus::Pending => {}
            OrderStatus::Paid => commands.push(paid),
            OrderStatus::Cancelled => commands.push(OrderCommand::CancelOrder(CancelOrder {
                order_id,
                occurred_at: record.placed,
            })),
            OrderStatus::Expired => commands.push(OrderCommand::ExpireOrder(ExpireOrder {
                order_id,
                occurred_at: record.expires,
            })),
            OrderStatus::Refunded => {
                commands.push(paid);
                commands.push(OrderCommand::RefundOrder(RefundOrder {
                    order_id,
                    occurred_at: record.placed,
                }));
            }
        }
        commands
    }
}
