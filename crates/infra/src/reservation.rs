//! Reservation and checkout with pessimistic per-quota locking.
//!
//! Every write that takes stock (reserve, checkout of lapsed positions,
//! late payment) locks each quota covering the affected targets in ascending
//! `QuotaId` order, re-evaluates availability at one `now` and persists the
//! result before the locks are released. Concurrent writers therefore never
//! push a quota past its size.
//!
//! Checkouts also hold a lock on their cart, so a cart converts into at most
//! one order. Quota and item changes made through the service wait for every
//! stock write in flight and block new ones until they are applied.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use boxoffice_catalog::{Item, ItemVariation};
use boxoffice_core::{
    CartId, CartPositionId, Clock, DomainError, ItemId, OrderId, OrderPositionId, QuotaId,
    SystemClock, VariationId,
};
use boxoffice_orders::{
    CancelOrder, CartPosition, ExpireOrder, MarkPaid, NewPosition, Order, OrderCommand,
    OrderStatus, PlaceOrder, StockHold,
};
use boxoffice_quotas::{
    Availability, AvailabilityCalculator, Quota, QuotaAvailability, QuotaCommand, StockCatalog,
    StockTarget, quota_availability,
};

use crate::config::BoxOfficeConfig;
use crate::store::{InMemoryStore, StoreError};

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("{target} is not available ({status})")]
    SoldOut {
        target: StockTarget,
        status: Availability,
    },

    #[error("quota '{quota}' has {remaining} left but {requested} are needed")]
    InsufficientQuota {
        quota: String,
        requested: u64,
        remaining: u64,
    },

    #[error("cart {0} is empty")]
    EmptyCart(CartId),

    #[error("reservation lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReservationError {
    /// True when the request failed for lack of stock rather than bad input.
    pub fn is_sold_out(&self) -> bool {
        matches!(
            self,
            ReservationError::SoldOut { .. } | ReservationError::InsufficientQuota { .. }
        )
    }
}

/// One unit of `target` to be put into `cart_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationRequest {
    pub cart_id: CartId,
    pub target: StockTarget,
}

/// Outcome of one [`ReservationService::sweep`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sweep {
    pub expired_orders: Vec<OrderId>,
    pub purged_cart_positions: usize,
}

pub struct ReservationService {
    store: Arc<InMemoryStore>,
    clock: Arc<dyn Clock>,
    cart_ttl: Duration,
    order_ttl: Duration,
    locks: Mutex<HashMap<QuotaId, Arc<Mutex<()>>>>,
    cart_locks: Mutex<HashMap<CartId, Arc<Mutex<()>>>>,
    /// Shared by stock writes, exclusive for catalog changes.
    catalog_gate: RwLock<()>,
}

impl ReservationService {
    pub fn new(store: Arc<InMemoryStore>, config: &BoxOfficeConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<InMemoryStore>,
        config: &BoxOfficeConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            clock,
            cart_ttl: config.cart_ttl(),
            order_ttl: config.order_ttl(),
            locks: Mutex::new(HashMap::new()),
            cart_locks: Mutex::new(HashMap::new()),
            catalog_gate: RwLock::new(()),
        }
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Current time according to the service clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Expire overdue orders and purge lapsed cart positions as of [`Self::now`].
    pub fn sweep(&self) -> Result<Sweep, ReservationError> {
        let now = self.now();
        Ok(Sweep {
            expired_orders: self.expire_overdue(now)?,
            purged_cart_positions: self.purge_expired_carts(now)?,
        })
    }

    /// Apply a quota change once no stock write is in flight.
    pub fn execute_quota(&self, command: &QuotaCommand) -> Result<Quota, ReservationError> {
        let _gate = self
            .catalog_gate
            .write()
            .map_err(|_| ReservationError::LockPoisoned)?;
        Ok(self.store.execute_quota(command)?)
    }

    /// Version an item once no stock write is in flight.
    pub fn clone_item(&self, item_id: ItemId, at: DateTime<Utc>) -> Result<Item, ReservationError> {
        let _gate = self
            .catalog_gate
            .write()
            .map_err(|_| ReservationError::LockPoisoned)?;
        Ok(self.store.clone_item(item_id, at)?)
    }

    pub fn availability(
        &self,
        target: StockTarget,
        now: DateTime<Utc>,
    ) -> Result<QuotaAvailability, ReservationError> {
        let store = self.store.as_ref();
        Ok(AvailabilityCalculator::new(store, store).availability(target, now)?)
    }

    /// Reserve one unit of the requested target until `now + cart_ttl`.
    pub fn reserve(
        &self,
        request: &ReservationRequest,
        now: DateTime<Utc>,
    ) -> Result<CartPosition, ReservationError> {
        let _gate = self.read_gate()?;
        let (item, variation) = self.resolve(request.target)?;

        let handles = self.lock_handles(&self.quota_ids(&[request.target]))?;
        let _guards = lock_all(&handles)?;

        let state = self.availability(request.target, now)?;
        if !state.status.is_ok() {
            tracing::warn!(
                stock = %request.target,
                status = %state.status,
                cart_id = %request.cart_id,
                "reservation rejected"
            );
            return Err(ReservationError::SoldOut {
                target: request.target,
                status: state.status,
            });
        }

        let price = variation
            .as_ref()
            .and_then(ItemVariation::default_price)
            .unwrap_or(item.default_price());
        let position = CartPosition::new(
            CartPositionId::new(),
            request.cart_id,
            item.event_id(),
            item.id_typed(),
            variation.as_ref().map(ItemVariation::id_typed),
            price,
            now + self.cart_ttl,
        );
        self.store.insert_cart_position(position.clone())?;

        tracing::info!(
            stock = %request.target,
            cart_id = %request.cart_id,
            position_id = %position.id_typed(),
            expires = %position.expires(),
            "stock reserved"
        );
        Ok(position)
    }

    /// Turn a cart into a pending order due at `now + order_ttl`.
    ///
    /// Unexpired positions already hold their stock and convert as they are.
    /// Lapsed positions need free capacity again; if any quota lacks it the
    /// checkout fails and the cart is left untouched. Of two checkouts of the
    /// same cart the later one finds it empty.
    pub fn checkout(
        &self,
        cart_id: CartId,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Order, ReservationError> {
        let _gate = self.read_gate()?;
        let cart_lock = self.cart_lock(cart_id)?;
        let _cart = cart_lock.lock().map_err(|_| ReservationError::LockPoisoned)?;

        let positions = self.store.cart(cart_id);
        let Some(first) = positions.first() else {
            return Err(ReservationError::EmptyCart(cart_id));
        };
        let event_id = first.event_id();
        if positions.iter().any(|p| p.event_id() != event_id) {
            return Err(DomainError::integrity(format!(
                "cart {cart_id} holds positions of several events"
            ))
            .into());
        }

        let targets: Vec<StockTarget> = positions.iter().map(position_target).collect();
        let handles = self.lock_handles(&self.quota_ids(&targets))?;
        let _guards = lock_all(&handles)?;

        let lapsed: Vec<(ItemId, Option<VariationId>)> = positions
            .iter()
            .filter(|p| !p.is_active(now))
            .map(|p| (p.item_id(), p.variation_id()))
            .collect();
        self.ensure_capacity(&lapsed, now)?;

        let order = self.store.execute_order(&OrderCommand::PlaceOrder(PlaceOrder {
            event_id,
            order_id,
            positions: positions
                .iter()
                .map(|p| NewPosition {
                    position_id: OrderPositionId::new(),
                    item_id: p.item_id(),
                    variation_id: p.variation_id(),
                    price: p.price(),
                })
                .collect(),
            expires: now + self.order_ttl,
            occurred_at: now,
        }))?;

        for position in &positions {
            self.store.remove_cart_position(position.id_typed())?;
        }

        tracing::info!(
            order_id = %order_id,
            cart_id = %cart_id,
            positions = positions.len(),
            lapsed = lapsed.len(),
            total = order.total(),
            "order placed"
        );
        Ok(order)
    }

    /// Mark an order paid. A pending order past its deadline no longer holds
    /// stock, so its positions must fit into the quotas again.
    pub fn mark_paid(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<Order, ReservationError> {
        let order = self
            .store
            .order(order_id)
            .ok_or_else(|| DomainError::not_found(format!("order {order_id}")))?;
        let command = OrderCommand::MarkPaid(MarkPaid {
            order_id,
            occurred_at: now,
        });

        let lapsed =
            order.status() == OrderStatus::Pending && order.stock_hold(now) == StockHold::Released;
        if !lapsed {
            let paid = self.store.execute_order(&command)?;
            tracing::info!(order_id = %order_id, "order paid");
            return Ok(paid);
        }

        let wanted: Vec<(ItemId, Option<VariationId>)> = order
            .positions()
            .iter()
            .map(|p| (p.item_id, p.variation_id))
            .collect();
        let targets: Vec<StockTarget> = wanted.iter().map(|(i, v)| target_of(*i, *v)).collect();
        let _gate = self.read_gate()?;
        let handles = self.lock_handles(&self.quota_ids(&targets))?;
        let _guards = lock_all(&handles)?;

        self.ensure_capacity(&wanted, now)?;
        let paid = self.store.execute_order(&command)?;
        tracing::info!(order_id = %order_id, late = true, "order paid");
        Ok(paid)
    }

    pub fn cancel(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<Order, ReservationError> {
        let order = self.store.execute_order(&OrderCommand::CancelOrder(CancelOrder {
            order_id,
            occurred_at: now,
        }))?;
        tracing::info!(order_id = %order_id, "order cancelled");
        Ok(order)
    }

    /// Move every pending order past its deadline to `Expired`.
    pub fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>, ReservationError> {
        let overdue = self.store.overdue_orders(now);
        for order_id in &overdue {
            self.store.execute_order(&OrderCommand::ExpireOrder(ExpireOrder {
                order_id: *order_id,
                occurred_at: now,
            }))?;
        }
        if !overdue.is_empty() {
            tracing::info!(count = overdue.len(), "overdue orders expired");
        }
        Ok(overdue)
    }

    pub fn purge_expired_carts(&self, now: DateTime<Utc>) -> Result<usize, ReservationError> {
        let purged = self.store.purge_expired_carts(now)?;
        if purged > 0 {
            tracing::info!(count = purged, "expired cart positions purged");
        }
        Ok(purged)
    }

    fn resolve(&self, target: StockTarget) -> Result<(Item, Option<ItemVariation>), ReservationError> {
        match target {
            StockTarget::Item(id) => {
                let item = self
                    .store
                    .item(id)
                    .ok_or_else(|| DomainError::not_found(format!("item {id}")))?;
                Ok((item, None))
            }
            StockTarget::Variation(id) => {
                let variation = self
                    .store
                    .variation(id)
                    .ok_or_else(|| DomainError::not_found(format!("variation {id}")))?;
                let item = self.store.item(variation.item_id()).ok_or_else(|| {
                    DomainError::integrity(format!("variation {id} belongs to an unknown item"))
                })?;
                Ok((item, Some(variation)))
            }
        }
    }

    /// Require room for every position in `wanted`, counted per quota.
    fn ensure_capacity(
        &self,
        wanted: &[(ItemId, Option<VariationId>)],
        now: DateTime<Utc>,
    ) -> Result<(), ReservationError> {
        if wanted.is_empty() {
            return Ok(());
        }

        let store = self.store.as_ref();
        let calculator = AvailabilityCalculator::new(store, store);
        let mut quotas = Vec::new();
        let mut seen = BTreeSet::new();

        for (item_id, variation_id) in wanted {
            let target = target_of(*item_id, *variation_id);
            let covering = store.quotas_for(target);
            if covering.is_empty() {
                return Err(ReservationError::SoldOut {
                    target,
                    status: Availability::Gone,
                });
            }
            for quota in covering {
                if seen.insert(quota.id_typed()) {
                    quotas.push(quota);
                }
            }
        }

        for quota in &quotas {
            calculator.validate_quota(quota)?;
            let requested = wanted
                .iter()
                .filter(|(i, v)| quota.covers(*i, *v))
                .count() as u64;
            let state = quota_availability(quota, store, now);
            if let Some(remaining) = state.remaining.filter(|r| *r < requested) {
                tracing::warn!(
                    quota = quota.name(),
                    requested,
                    remaining,
                    "not enough stock left"
                );
                return Err(ReservationError::InsufficientQuota {
                    quota: quota.name().to_string(),
                    requested,
                    remaining,
                });
            }
        }

        Ok(())
    }

    fn quota_ids(&self, targets: &[StockTarget]) -> BTreeSet<QuotaId> {
        targets
            .iter()
            .flat_map(|t| self.store.quotas_for(*t))
            .map(|q| q.id_typed())
            .collect()
    }

    fn read_gate(&self) -> Result<RwLockReadGuard<'_, ()>, ReservationError> {
        self.catalog_gate
            .read()
            .map_err(|_| ReservationError::LockPoisoned)
    }

    fn cart_lock(&self, cart_id: CartId) -> Result<Arc<Mutex<()>>, ReservationError> {
        let mut locks = self
            .cart_locks
            .lock()
            .map_err(|_| ReservationError::LockPoisoned)?;
        Ok(locks.entry(cart_id).or_default().clone())
    }

    /// Lock handles for `ids`, in ascending id order.
    fn lock_handles(&self, ids: &BTreeSet<QuotaId>) -> Result<Vec<Arc<Mutex<()>>>, ReservationError> {
        let mut locks = self.locks.lock().map_err(|_| ReservationError::LockPoisoned)?;
        Ok(ids
            .iter()
            .map(|id| locks.entry(*id).or_default().clone())
            .collect())
    }
}

fn lock_all(handles: &[Arc<Mutex<()>>]) -> Result<Vec<MutexGuard<'_, ()>>, ReservationError> {
    handles
        .iter()
        .map(|h| h.lock().map_err(|_| ReservationError::LockPoisoned))
        .collect()
}

fn target_of(item_id: ItemId, variation_id: Option<VariationId>) -> StockTarget {
    match variation_id {
        Some(v) => StockTarget::Variation(v),
        None => StockTarget::Item(item_id),
    }
}

fn position_target(position: &CartPosition) -> StockTarget {
    target_of(position.item_id(), position.variation_id())
}
