use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boxoffice_core::{
    Aggregate, AggregateRoot, DomainError, EventId, ItemId, OrderId, OrderPositionId, VariationId,
};
use boxoffice_events::Event;

/// Order status lifecycle.
///
/// `Pending` → `Paid` → `Refunded`, or `Pending` → `Cancelled` / `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
    Expired,
    Refunded,
}

/// How an order's positions count against quotas at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockHold {
    /// Sold for good (paid).
    Confirmed,
    /// Awaiting payment, not yet past its expiry.
    Pending,
    /// Holds nothing (cancelled, expired, refunded, or pending past expiry).
    Released,
}

/// One ticket (or product unit) on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPosition {
    pub position_id: OrderPositionId,
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub variation_id: Option<VariationId>,
    /// Price in smallest currency unit (e.g., cents).
    pub price: u64,
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    event_id: Option<EventId>,
    status: OrderStatus,
    positions: Vec<OrderPosition>,
    expires: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-placed aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            event_id: None,
            status: OrderStatus::Pending,
            positions: Vec::new(),
            expires: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn event_id(&self) -> Option<EventId> {
        self.event_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn positions(&self) -> &[OrderPosition] {
        &self.positions
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    pub fn is_placed(&self) -> bool {
        self.created
    }

    pub fn total(&self) -> u64 {
        self.positions.iter().map(|p| p.price).sum()
    }

    /// Stock held by this order's positions at `now`.
    pub fn stock_hold(&self, now: DateTime<Utc>) -> StockHold {
        if !self.created {
            return StockHold::Released;
        }
        match self.status {
            OrderStatus::Paid => StockHold::Confirmed,
            OrderStatus::Pending if self.expires.is_some_and(|e| e > now) => StockHold::Pending,
            _ => StockHold::Released,
        }
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// A position to be created with the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPosition {
    pub position_id: OrderPositionId,
    pub item_id: ItemId,
    pub variation_id: Option<VariationId>,
    pub price: u64,
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub event_id: EventId,
    pub order_id: OrderId,
    pub positions: Vec<NewPosition>,
    pub expires: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkPaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPaid {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExpireOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RefundOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    MarkPaid(MarkPaid),
    CancelOrder(CancelOrder),
    ExpireOrder(ExpireOrder),
    RefundOrder(RefundOrder),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub event_id: EventId,
    pub order_id: OrderId,
    pub positions: Vec<OrderPosition>,
    pub expires: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderPaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaid {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderExpired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExpired {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderRefunded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRefunded {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderPaid(OrderPaid),
    OrderCancelled(OrderCancelled),
    OrderExpired(OrderExpired),
    OrderRefunded(OrderRefunded),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::OrderPaid(_) => "orders.order.paid",
            OrderEvent::OrderCancelled(_) => "orders.order.cancelled",
            OrderEvent::OrderExpired(_) => "orders.order.expired",
            OrderEvent::OrderRefunded(_) => "orders.order.refunded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderPaid(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
            OrderEvent::OrderExpired(e) => e.occurred_at,
            OrderEvent::OrderRefunded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.event_id = Some(e.event_id);
                self.status = OrderStatus::Pending;
                self.positions = e.positions.clone();
                self.expires = Some(e.expires);
                self.created = true;
            }
            OrderEvent::OrderPaid(_) => self.status = OrderStatus::Paid,
            OrderEvent::OrderCancelled(_) => self.status = OrderStatus::Cancelled,
            OrderEvent::OrderExpired(_) => self.status = OrderStatus::Expired,
            OrderEvent::OrderRefunded(_) => self.status = OrderStatus::Refunded,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::MarkPaid(cmd) => self.handle_mark_paid(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            OrderCommand::ExpireOrder(cmd) => self.handle_expire(cmd),
            OrderCommand::RefundOrder(cmd) => self.handle_refund(cmd),
        }
    }
}

impl Order {
    fn ensure_placed(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("order {order_id}")));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: OrderStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::conflict(format!(
                "cannot {action} an order that is {:?}",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.positions.is_empty() {
            return Err(DomainError::validation("an order needs at least one position"));
        }
        if cmd.expires <= cmd.occurred_at {
            return Err(DomainError::validation("order expiry must lie in the future"));
        }

        let positions = cmd
            .positions
            .iter()
            .map(|p| OrderPosition {
                position_id: p.position_id,
                order_id: cmd.order_id,
                item_id: p.item_id,
                variation_id: p.variation_id,
                price: p.price,
            })
            .collect();

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            event_id: cmd.event_id,
            order_id: cmd.order_id,
            positions,
            expires: cmd.expires,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_paid(&self, cmd: &MarkPaid) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_placed(cmd.order_id)?;
        self.ensure_status(OrderStatus::Pending, "pay")?;

        Ok(vec![OrderEvent::OrderPaid(OrderPaid {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_placed(cmd.order_id)?;
        self.ensure_status(OrderStatus::Pending, "cancel")?;

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_expire(&self, cmd: &ExpireOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_placed(cmd.order_id)?;
        self.ensure_status(OrderStatus::Pending, "expire")?;

        if self.expires.is_some_and(|e| e > cmd.occurred_at) {
            return Err(DomainError::invariant("order has not reached its expiry yet"));
        }

        Ok(vec![OrderEvent::OrderExpired(OrderExpired {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_refund(&self, cmd: &RefundOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_placed(cmd.order_id)?;
        self.ensure_status(OrderStatus::Paid, "refund")?;

        Ok(vec![OrderEvent::OrderRefunded(OrderRefunded {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
