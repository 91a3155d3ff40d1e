//! Orders domain module.
//!
//! Orders move through a finite status lifecycle and hold stock according to
//! that status; cart positions are time-limited reservations. Pure domain
//! logic (no IO, no storage).

pub mod cart;
pub mod order;

pub use cart::CartPosition;
pub use order::{
    CancelOrder, ExpireOrder, MarkPaid, NewPosition, Order, OrderCancelled, OrderCommand,
    OrderEvent, OrderExpired, OrderPaid, OrderPlaced, OrderPosition, OrderRefunded, OrderStatus,
    PlaceOrder, RefundOrder, StockHold,
};
