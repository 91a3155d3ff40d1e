//! Quota engine and availability calculator.
//!
//! Quotas are shared stock pools over items and variations. Availability of
//! an item or variation is derived on every query from the quotas covering
//! it and from the orders and cart reservations the ledger reports at `now`.

pub mod availability;
pub mod quota;
pub mod source;

pub use availability::{
    Availability, AvailabilityCalculator, QuotaAvailability, QuotaUsage, quota_availability,
};
pub use quota::{
    AddItem, AddVariation, CreateQuota, ItemAdded, ItemRemoved, Quota, QuotaCommand, QuotaCreated,
    QuotaEvent, QuotaResized, RemoveItem, RemoveVariation, ResizeQuota, VariationAdded,
    VariationRemoved,
};
pub use source::{CatalogSnapshot, LedgerSnapshot, StockCatalog, StockLedger, StockTarget};
