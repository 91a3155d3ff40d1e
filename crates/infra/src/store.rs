//! In-memory store for catalog data, orders and cart reservations.
//!
//! Every item version is kept; the catalog view exposes the current one.
//! Quota and order commands are executed against the stored aggregate and
//! the resulting events are appended to the journal.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use boxoffice_catalog::{Item, ItemVariation, Property};
use boxoffice_core::{
    Aggregate, AggregateRoot, CartId, CartPositionId, DomainError, EventId, ExpectedVersion, ItemId,
    OrderId, PropertyId, QuotaId, VariationId,
};
use boxoffice_events::{Event, RecordedEvent};
use boxoffice_orders::{CartPosition, Order, OrderCommand, OrderStatus};
use boxoffice_quotas::{Quota, QuotaCommand, StockCatalog, StockLedger, StockTarget};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("failed to serialize journal entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    LockPoisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Store for tests, the report binary and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    properties: RwLock<HashMap<PropertyId, Property>>,
    /// All versions per item, oldest first.
    items: RwLock<HashMap<ItemId, Vec<Item>>>,
    quotas: RwLock<BTreeMap<QuotaId, Quota>>,
    orders: RwLock<HashMap<OrderId, Order>>,
    carts: RwLock<HashMap<CartPositionId, CartPosition>>,
    journal: RwLock<Vec<RecordedEvent>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- properties ----

    pub fn upsert_property(&self, property: Property) -> StoreResult<()> {
        let mut map = self.properties.write().map_err(|_| StoreError::LockPoisoned)?;
        map.insert(property.id_typed(), property);
        Ok(())
    }

    pub fn property(&self, id: PropertyId) -> Option<Property> {
        let map = self.properties.read().ok()?;
        map.get(&id).cloned()
    }

    /// Every property of an event, the pool variation enumeration resolves against.
    pub fn properties(&self, event_id: EventId) -> Vec<Property> {
        let map = match self.properties.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.values()
            .filter(|p| p.event_id() == event_id)
            .cloned()
            .collect()
    }

    // ---- items ----

    /// Insert a new item or replace the stored copy of an existing version.
    ///
    /// Only the current version of an item may be replaced.
    pub fn upsert_item(&self, item: Item) -> StoreResult<()> {
        let mut map = self.items.write().map_err(|_| StoreError::LockPoisoned)?;
        let versions = map.entry(item.id_typed()).or_default();

        match versions.iter().position(|v| v.version_id() == item.version_id()) {
            Some(idx) if versions[idx].version_end().is_some() => {
                Err(DomainError::conflict(format!(
                    "item version {} is superseded",
                    item.version_id()
                ))
                .into())
            }
            Some(idx) => {
                versions[idx] = item;
                Ok(())
            }
            None if versions.iter().any(|v| v.version_end().is_none()) => {
                Err(DomainError::conflict(format!(
                    "item {} already has a current version",
                    item.id_typed()
                ))
                .into())
            }
            None => {
                versions.push(item);
                Ok(())
            }
        }
    }

    /// Close the current version of `item_id` at `at` and store its successor.
    pub fn clone_item(&self, item_id: ItemId, at: DateTime<Utc>) -> StoreResult<Item> {
        let mut map = self.items.write().map_err(|_| StoreError::LockPoisoned)?;
        let versions = map
            .get_mut(&item_id)
            .ok_or_else(|| DomainError::not_found(format!("item {item_id}")))?;
        let current = versions
            .iter_mut()
            .find(|v| v.version_end().is_none())
            .ok_or_else(|| DomainError::integrity(format!("item {item_id} has no current version")))?;

        let next = current.clone_shallow(at)?;
        versions.push(next.clone());

        tracing::info!(
            item_id = %item_id,
            version_id = %next.version_id(),
            versions = versions.len(),
            "item versioned"
        );
        Ok(next)
    }

    /// The version of `item_id` whose validity window contains `at`.
    pub fn item_as_of(&self, item_id: ItemId, at: DateTime<Utc>) -> Option<Item> {
        let map = self.items.read().ok()?;
        map.get(&item_id)?
            .iter()
            .find(|v| v.validity().contains(at))
            .cloned()
    }

    /// Every version of `item_id`, oldest first.
    pub fn item_versions(&self, item_id: ItemId) -> Vec<Item> {
        match self.items.read() {
            Ok(map) => map.get(&item_id).cloned().unwrap_or_default(),
            Err(_) => vec![],
        }
    }

    /// Current versions of an event's items, ordered by name.
    pub fn items(&self, event_id: EventId) -> Vec<Item> {
        let map = match self.items.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        let mut items: Vec<Item> = map
            .values()
            .filter_map(|versions| versions.iter().find(|v| v.version_end().is_none()))
            .filter(|i| i.event_id() == event_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name().cmp(b.name()));
        items
    }

    // ---- quotas ----

    /// Execute a quota command against the stored aggregate.
    pub fn execute_quota(&self, command: &QuotaCommand) -> StoreResult<Quota> {
        self.execute_quota_expecting(command, ExpectedVersion::Any)
    }

    /// Like [`Self::execute_quota`], failing with a conflict unless the
    /// stored quota is at `expected`.
    pub fn execute_quota_expecting(
        &self,
        command: &QuotaCommand,
        expected: ExpectedVersion,
    ) -> StoreResult<Quota> {
        let quota_id = quota_command_target(command);
        let mut map = self.quotas.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut quota = map
            .get(&quota_id)
            .cloned()
            .unwrap_or_else(|| Quota::empty(quota_id));
        expected.check(quota.version())?;

        let events = quota.execute(command)?;
        self.record("quota", *quota_id.as_uuid(), &events)?;
        map.insert(quota_id, quota.clone());
        Ok(quota)
    }

    pub fn quota(&self, id: QuotaId) -> Option<Quota> {
        let map = self.quotas.read().ok()?;
        map.get(&id).cloned()
    }

    pub fn quotas(&self, event_id: EventId) -> Vec<Quota> {
        match self.quotas.read() {
            Ok(map) => map
                .values()
                .filter(|q| q.event_id() == Some(event_id))
                .cloned()
                .collect(),
            Err(_) => vec![],
        }
    }

    // ---- orders ----

    /// Execute an order command against the stored aggregate.
    pub fn execute_order(&self, command: &OrderCommand) -> StoreResult<Order> {
        let order_id = order_command_target(command);
        let mut map = self.orders.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut order = map
            .get(&order_id)
            .cloned()
            .unwrap_or_else(|| Order::empty(order_id));

        let events = order.execute(command)?;
        self.record("order", *order_id.as_uuid(), &events)?;
        map.insert(order_id, order.clone());
        Ok(order)
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        let map = self.orders.read().ok()?;
        map.get(&id).cloned()
    }

    /// Pending orders whose payment deadline is at or before `now`.
    pub fn overdue_orders(&self, now: DateTime<Utc>) -> Vec<OrderId> {
        let map = match self.orders.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        let mut overdue: Vec<OrderId> = map
            .values()
            .filter(|o| o.status() == OrderStatus::Pending && o.expires().is_some_and(|e| e <= now))
            .map(Order::id_typed)
            .collect();
        overdue.sort();
        overdue
    }

    // ---- carts ----

    pub fn insert_cart_position(&self, position: CartPosition) -> StoreResult<()> {
        let mut map = self.carts.write().map_err(|_| StoreError::LockPoisoned)?;
        if map.contains_key(&position.id_typed()) {
            return Err(DomainError::conflict(format!(
                "cart position {} already exists",
                position.id_typed()
            ))
            .into());
        }
        map.insert(position.id_typed(), position);
        Ok(())
    }

    pub fn remove_cart_position(&self, id: CartPositionId) -> StoreResult<Option<CartPosition>> {
        let mut map = self.carts.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.remove(&id))
    }

    /// Positions of one cart, expired ones included, oldest expiry first.
    pub fn cart(&self, cart_id: CartId) -> Vec<CartPosition> {
        let map = match self.carts.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        let mut positions: Vec<CartPosition> = map
            .values()
            .filter(|c| c.cart_id() == cart_id)
            .cloned()
            .collect();
        positions.sort_by_key(|c| (c.expires(), c.id_typed()));
        positions
    }

    /// Delete cart positions whose expiry is at or before `now`.
    pub fn purge_expired_carts(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut map = self.carts.write().map_err(|_| StoreError::LockPoisoned)?;
        let before = map.len();
        map.retain(|_, c| c.is_active(now));
        Ok(before - map.len())
    }

    // ---- journal ----

    pub fn journal(&self) -> Vec<RecordedEvent> {
        match self.journal.read() {
            Ok(j) => j.clone(),
            Err(_) => vec![],
        }
    }

    fn record<E>(&self, aggregate_type: &str, aggregate_id: Uuid, events: &[E]) -> StoreResult<()>
    where
        E: Event + Serialize,
    {
        let mut journal = self.journal.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut next = journal.len() as u64 + 1;
        let mut entries = Vec::with_capacity(events.len());
        for event in events {
            entries.push(RecordedEvent::from_typed(next, aggregate_type, aggregate_id, event)?);
            next += 1;
        }
        for entry in &entries {
            tracing::debug!(
                sequence_number = entry.sequence_number,
                event_type = %entry.event_type,
                aggregate_id = %entry.aggregate_id,
                "event recorded"
            );
        }
        journal.extend(entries);
        Ok(())
    }
}

fn quota_command_target(command: &QuotaCommand) -> QuotaId {
    match command {
        QuotaCommand::CreateQuota(c) => c.quota_id,
        QuotaCommand::AddItem(c) => c.quota_id,
        QuotaCommand::AddVariation(c) => c.quota_id,
        QuotaCommand::RemoveItem(c) => c.quota_id,
        QuotaCommand::RemoveVariation(c) => c.quota_id,
        QuotaCommand::ResizeQuota(c) => c.quota_id,
    }
}

fn order_command_target(command: &OrderCommand) -> OrderId {
    match command {
        OrderCommand::PlaceOrder(c) => c.order_id,
        OrderCommand::MarkPaid(c) => c.order_id,
        OrderCommand::CancelOrder(c) => c.order_id,
        OrderCommand::ExpireOrder(c) => c.order_id,
        OrderCommand::RefundOrder(c) => c.order_id,
    }
}

impl StockCatalog for InMemoryStore {
    fn item(&self, id: ItemId) -> Option<Item> {
        let map = self.items.read().ok()?;
        map.get(&id)?
            .iter()
            .find(|v| v.version_end().is_none())
            .cloned()
    }

    fn variation(&self, id: VariationId) -> Option<ItemVariation> {
        let map = self.items.read().ok()?;
        map.values()
            .filter_map(|versions| versions.iter().find(|v| v.version_end().is_none()))
            .find_map(|item| item.variation(id))
            .cloned()
    }

    fn retired_variation(&self, id: VariationId) -> Option<ItemVariation> {
        let map = self.items.read().ok()?;
        map.values()
            .flat_map(|versions| versions.iter().filter(|v| v.version_end().is_some()))
            .find_map(|item| item.variation(id))
            .cloned()
    }

    fn quotas_for(&self, target: StockTarget) -> Vec<Quota> {
        match self.quotas.read() {
            Ok(map) => map.values().filter(|q| q.references(target)).cloned().collect(),
            Err(_) => vec![],
        }
    }
}

/// Ledger reads feed stock checks, so a poisoned lock must not hide sold
/// stock. Writes only publish fully applied records, so the data behind a
/// poisoned lock is still consistent.
fn read_ledger<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned: PoisonError<_>| {
        tracing::error!(ledger = what, "ledger lock poisoned, reading recovered data");
        poisoned.into_inner()
    })
}

impl StockLedger for InMemoryStore {
    fn orders(&self, event_id: EventId) -> Vec<Order> {
        read_ledger(&self.orders, "orders")
            .values()
            .filter(|o| o.event_id() == Some(event_id))
            .cloned()
            .collect()
    }

    fn cart_positions(&self, event_id: EventId) -> Vec<CartPosition> {
        read_ledger(&self.carts, "carts")
            .values()
            .filter(|c| c.event_id() == event_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use boxoffice_quotas::{
        AddItem, AddVariation, Availability, AvailabilityCalculator, CreateQuota, ResizeQuota,
    };
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn clone_item_keeps_every_version_addressable() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let mut size = Property::new(PropertyId::new(), event_id, "Size").unwrap();
        size.add_value("S").unwrap();
        let mut item = Item::new(ItemId::new(), event_id, "Hoodie", 4000, t0()).unwrap();
        item.add_property(&size).unwrap();
        let item_id = item.id_typed();
        store.upsert_item(item).unwrap();

        let at = t0() + Duration::days(7);
        let next = store.clone_item(item_id, at).unwrap();

        assert_eq!(store.item_versions(item_id).len(), 2);
        assert_eq!(store.item(item_id).unwrap().version_id(), next.version_id());
        assert!(!store.item(item_id).unwrap().has_properties());

        let before = store.item_as_of(item_id, at - Duration::seconds(1)).unwrap();
        assert!(before.has_properties());
        assert_eq!(before.version_end(), Some(at));
        assert_eq!(store.item_as_of(item_id, at).unwrap().version_id(), next.version_id());
        assert!(store.item_as_of(item_id, t0() - Duration::days(1)).is_none());
    }

    #[test]
    fn superseded_versions_cannot_be_overwritten() {
        let store = InMemoryStore::new();
        let item = Item::new(ItemId::new(), EventId::new(), "Pass", 100, t0()).unwrap();
        let item_id = item.id_typed();
        store.upsert_item(item.clone()).unwrap();
        store.clone_item(item_id, t0() + Duration::hours(1)).unwrap();

        let err = store.upsert_item(item).unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Conflict(_))));
    }

    #[test]
    fn quota_commands_are_journaled() {
        let store = InMemoryStore::new();
        let quota_id = QuotaId::new();
        let event_id = EventId::new();
        store
            .execute_quota(&QuotaCommand::CreateQuota(CreateQuota {
                event_id,
                quota_id,
                name: "Main".to_string(),
                size: Some(100),
                occurred_at: t0(),
            }))
            .unwrap();

        let journal = store.journal();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].sequence_number, 1);
        assert_eq!(journal[0].event_type, "quotas.quota.created");
        assert_eq!(journal[0].aggregate_id, *quota_id.as_uuid());
        assert_eq!(store.quotas(event_id).len(), 1);
    }

    #[test]
    fn stale_quota_versions_conflict() {
        let store = InMemoryStore::new();
        let quota_id = QuotaId::new();
        let create = QuotaCommand::CreateQuota(CreateQuota {
            event_id: EventId::new(),
            quota_id,
            name: "Main".to_string(),
            size: Some(10),
            occurred_at: t0(),
        });
        store
            .execute_quota_expecting(&create, ExpectedVersion::Exact(0))
            .unwrap();

        let resize = QuotaCommand::ResizeQuota(ResizeQuota {
            quota_id,
            size: Some(20),
            occurred_at: t0(),
        });
        let err = store
            .execute_quota_expecting(&resize, ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Conflict(_))));

        let resized = store
            .execute_quota_expecting(&resize, ExpectedVersion::Exact(1))
            .unwrap();
        assert_eq!(resized.size(), Some(20));
        assert_eq!(resized.version(), 2);
    }

    #[test]
    fn rejected_commands_leave_no_trace() {
        let store = InMemoryStore::new();
        let err = store
            .execute_quota(&QuotaCommand::ResizeQuota(ResizeQuota {
                quota_id: QuotaId::new(),
                size: Some(1),
                occurred_at: t0(),
            }))
            .unwrap_err();

        assert!(matches!(err, StoreError::Domain(DomainError::NotFound(_))));
        assert!(store.journal().is_empty());
    }

    #[test]
    fn purge_drops_only_expired_positions() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let cart_id = CartId::new();
        for minutes in [-5, 0, 5] {
            store
                .insert_cart_position(CartPosition::new(
                    CartPositionId::new(),
                    cart_id,
                    event_id,
                    ItemId::new(),
                    None,
                    0,
                    t0() + Duration::minutes(minutes),
                ))
                .unwrap();
        }

        assert_eq!(store.purge_expired_carts(t0()).unwrap(), 2);
        assert_eq!(store.cart(cart_id).len(), 1);
    }

    fn open_cart_position(
        event_id: EventId,
        item_id: ItemId,
        variation_id: Option<VariationId>,
    ) -> CartPosition {
        CartPosition::new(
            CartPositionId::new(),
            CartId::new(),
            event_id,
            item_id,
            variation_id,
            0,
            t0() + Duration::hours(1),
        )
    }

    #[test]
    fn versioning_an_item_keeps_its_shared_quota_usable() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();

        let ticket = Item::new(ItemId::new(), event_id, "Ticket", 2500, t0()).unwrap();
        let ticket_id = ticket.id_typed();
        store.upsert_item(ticket).unwrap();

        let mut size = Property::new(PropertyId::new(), event_id, "Size").unwrap();
        let small = size.add_value("S").unwrap();
        let mut shirt = Item::new(ItemId::new(), event_id, "Shirt", 1500, t0()).unwrap();
        shirt.add_property(&size).unwrap();
        let mut variation = ItemVariation::new(VariationId::new(), shirt.id_typed());
        variation.assign(&small).unwrap();
        let shirt_s = variation.id_typed();
        shirt.add_variation(variation).unwrap();
        let shirt_id = shirt.id_typed();
        store.upsert_property(size).unwrap();
        store.upsert_item(shirt).unwrap();

        let hall = QuotaId::new();
        let commands = [
            QuotaCommand::CreateQuota(CreateQuota {
                event_id,
                quota_id: hall,
                name: "Hall".to_string(),
                size: Some(5),
                occurred_at: t0(),
            }),
            QuotaCommand::AddItem(AddItem {
                quota_id: hall,
                item_id: ticket_id,
                occurred_at: t0(),
            }),
            QuotaCommand::AddItem(AddItem {
                quota_id: hall,
                item_id: shirt_id,
                occurred_at: t0(),
            }),
            QuotaCommand::AddVariation(AddVariation {
                quota_id: hall,
                variation_id: shirt_s,
                occurred_at: t0(),
            }),
        ];
        for command in &commands {
            store.execute_quota(command).unwrap();
        }
        store
            .insert_cart_position(open_cart_position(event_id, shirt_id, Some(shirt_s)))
            .unwrap();

        let calculator = AvailabilityCalculator::new(&store, &store);
        let before = calculator.availability(StockTarget::Item(ticket_id), t0()).unwrap();
        assert_eq!(before.remaining, Some(4));

        store.clone_item(shirt_id, t0() + Duration::minutes(10)).unwrap();

        let after = calculator.availability(StockTarget::Item(ticket_id), t0()).unwrap();
        assert_eq!(after.status, Availability::Ok);
        assert_eq!(after.remaining, Some(4));
        assert_eq!(
            calculator.availability(StockTarget::Item(shirt_id), t0()).unwrap().remaining,
            Some(4)
        );
        assert!(store.variation(shirt_s).is_none());
        assert!(store.retired_variation(shirt_s).is_some());
        assert!(matches!(
            calculator.availability(StockTarget::Variation(shirt_s), t0()),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn unknown_quota_variations_are_still_integrity_errors() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let ticket = Item::new(ItemId::new(), event_id, "Ticket", 2500, t0()).unwrap();
        let ticket_id = ticket.id_typed();
        store.upsert_item(ticket).unwrap();

        let hall = QuotaId::new();
        let commands = [
            QuotaCommand::CreateQuota(CreateQuota {
                event_id,
                quota_id: hall,
                name: "Hall".to_string(),
                size: Some(5),
                occurred_at: t0(),
            }),
            QuotaCommand::AddItem(AddItem {
                quota_id: hall,
                item_id: ticket_id,
                occurred_at: t0(),
            }),
            QuotaCommand::AddVariation(AddVariation {
                quota_id: hall,
                variation_id: VariationId::new(),
                occurred_at: t0(),
            }),
        ];
        for command in &commands {
            store.execute_quota(command).unwrap();
        }

        let err = AvailabilityCalculator::new(&store, &store)
            .availability(StockTarget::Item(ticket_id), t0())
            .unwrap_err();
        assert!(matches!(err, DomainError::Integrity(_)));
    }

    #[test]
    fn poisoned_ledger_still_reports_held_stock() {
        let store = Arc::new(InMemoryStore::new());
        let event_id = EventId::new();
        store
            .insert_cart_position(open_cart_position(event_id, ItemId::new(), None))
            .unwrap();

        let writer = Arc::clone(&store);
        let crashed = thread::spawn(move || {
            let _guard = writer.carts.write().unwrap();
            panic!("writer crashed while holding the cart lock");
        })
        .join();
        assert!(crashed.is_err());
        assert!(store.carts.is_poisoned());

        assert_eq!(store.cart_positions(event_id).len(), 1);
    }
}
