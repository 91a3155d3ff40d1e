//! Availability of items and variations at one instant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boxoffice_core::{DomainError, DomainResult, EventId};
use boxoffice_orders::{CartPosition, Order, StockHold};

use crate::quota::Quota;
use crate::source::{StockCatalog, StockLedger, StockTarget};

/// Availability status, ordered by severity (`Ok` least, `Gone` most).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// Capacity remains after paid, pending and reserved consumption.
    Ok,
    /// Only unexpired cart reservations exhaust the capacity.
    Reserved,
    /// Paid plus unexpired pending orders exhaust the capacity.
    Ordered,
    /// Paid orders alone exhaust the capacity.
    Gone,
}

impl Availability {
    /// Numeric code exposed to checkout and storefront callers.
    pub fn code(self) -> u8 {
        match self {
            Availability::Gone => 0,
            Availability::Ordered => 10,
            Availability::Reserved => 20,
            Availability::Ok => 100,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Availability::Ok
    }
}

impl core::fmt::Display for Availability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Availability::Ok => "ok",
            Availability::Reserved => "reserved",
            Availability::Ordered => "ordered",
            Availability::Gone => "gone",
        };
        f.pad(s)
    }
}

/// Status plus headroom. `remaining = None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaAvailability {
    pub status: Availability,
    pub remaining: Option<u64>,
}

impl QuotaAvailability {
    pub fn unlimited() -> Self {
        Self {
            status: Availability::Ok,
            remaining: None,
        }
    }

    pub fn sold_out() -> Self {
        Self {
            status: Availability::Gone,
            remaining: Some(0),
        }
    }

    /// The more restrictive of two results: higher severity, lower headroom.
    pub fn restrict(self, other: Self) -> Self {
        let remaining = match (self.remaining, other.remaining) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, None) => a,
            (None, b) => b,
        };
        Self {
            status: self.status.max(other.status),
            remaining,
        }
    }
}

/// Units a quota has given out at one instant, by kind of consumption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub paid: u64,
    pub pending: u64,
    pub reserved: u64,
}

impl QuotaUsage {
    /// Count positions covered by `quota` that hold stock at `now`.
    pub fn collect(quota: &Quota, orders: &[Order], carts: &[CartPosition], now: DateTime<Utc>) -> Self {
        let mut usage = Self::default();

        for order in orders {
            let covered = order
                .positions()
                .iter()
                .filter(|p| quota.covers(p.item_id, p.variation_id))
                .count() as u64;
            if covered == 0 {
                continue;
            }
            match order.stock_hold(now) {
                StockHold::Confirmed => usage.paid += covered,
                StockHold::Pending => usage.pending += covered,
                StockHold::Released => {}
            }
        }

        usage.reserved = carts
            .iter()
            .filter(|c| c.is_active(now) && quota.covers(c.item_id(), c.variation_id()))
            .count() as u64;

        usage
    }

    pub fn total(&self) -> u64 {
        self.paid + self.pending + self.reserved
    }

    /// Classify against a quota size (`None` = unlimited).
    pub fn classify(&self, size: Option<u64>) -> QuotaAvailability {
        let Some(size) = size else {
            return QuotaAvailability::unlimited();
        };

        let status = if self.paid >= size {
            Availability::Gone
        } else if self.paid + self.pending >= size {
            Availability::Ordered
        } else if self.total() >= size {
            Availability::Reserved
        } else {
            Availability::Ok
        };

        QuotaAvailability {
            status,
            remaining: Some(size.saturating_sub(self.total())),
        }
    }
}

/// Availability of one quota at `now`.
pub fn quota_availability(
    quota: &Quota,
    ledger: &impl StockLedger,
    now: DateTime<Utc>,
) -> QuotaAvailability {
    if quota.is_unlimited() {
        return QuotaAvailability::unlimited();
    }
    let Some(event_id) = quota.event_id() else {
        return QuotaAvailability::unlimited();
    };
    let orders = ledger.orders(event_id);
    let carts = ledger.cart_positions(event_id);
    QuotaUsage::collect(quota, &orders, &carts, now).classify(quota.size())
}

/// Derives availability from the catalog and the ledger.
///
/// Every call re-reads the ledger; nothing is cached between queries.
pub struct AvailabilityCalculator<'a, C, L> {
    catalog: &'a C,
    ledger: &'a L,
}

impl<'a, C, L> AvailabilityCalculator<'a, C, L>
where
    C: StockCatalog,
    L: StockLedger,
{
    pub fn new(catalog: &'a C, ledger: &'a L) -> Self {
        Self { catalog, ledger }
    }

    /// Availability of `target` at `now`, the most restrictive across every
    /// quota referencing it. A target no quota references is sold out.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown item or variation.
    /// - `Configuration` when `target` is an item with properties, or a
    ///   referencing quota is misconfigured (see [`Self::validate_quota`]).
    /// - `Integrity` when a quota references unknown records or another event.
    pub fn availability(
        &self,
        target: StockTarget,
        now: DateTime<Utc>,
    ) -> DomainResult<QuotaAvailability> {
        let event_id = self.resolve_event(target)?;
        let quotas = self.catalog.quotas_for(target);
        if quotas.is_empty() {
            tracing::debug!(%target, "no quota references target");
            return Ok(QuotaAvailability::sold_out());
        }

        for quota in &quotas {
            if quota.event_id() != Some(event_id) {
                return Err(DomainError::integrity(format!(
                    "quota '{}' belongs to another event than {target}",
                    quota.name()
                )));
            }
            self.validate_quota(quota)?;
        }

        let orders = self.ledger.orders(event_id);
        let carts = self.ledger.cart_positions(event_id);

        let result = quotas
            .iter()
            .map(|quota| {
                let usage = QuotaUsage::collect(quota, &orders, &carts, now);
                let state = usage.classify(quota.size());
                tracing::debug!(
                    quota = quota.name(),
                    size = ?quota.size(),
                    paid = usage.paid,
                    pending = usage.pending,
                    reserved = usage.reserved,
                    status = %state.status,
                    "quota evaluated"
                );
                state
            })
            .fold(QuotaAvailability::unlimited(), QuotaAvailability::restrict);

        Ok(result)
    }

    /// Check that a quota can be evaluated.
    ///
    /// An item with properties may only be linked together with at least one
    /// of its variations; stock for such an item is always booked per
    /// variation.
    pub fn validate_quota(&self, quota: &Quota) -> DomainResult<()> {
        for item_id in quota.items() {
            let item = self.catalog.item(*item_id).ok_or_else(|| {
                DomainError::integrity(format!(
                    "quota '{}' references unknown item {item_id}",
                    quota.name()
                ))
            })?;
            if item.has_properties()
                && !item
                    .variations()
                    .iter()
                    .any(|v| quota.variations().contains(&v.id_typed()))
            {
                return Err(DomainError::configuration(format!(
                    "item '{}' has properties and must be added to quota '{}' through its variations",
                    item.name(),
                    quota.name()
                )));
            }
        }

        for variation_id in quota.variations() {
            if self.catalog.variation(*variation_id).is_some() {
                continue;
            }
            if self.catalog.retired_variation(*variation_id).is_some() {
                tracing::debug!(
                    quota = quota.name(),
                    variation_id = %variation_id,
                    "quota lists a retired variation"
                );
                continue;
            }
            return Err(DomainError::integrity(format!(
                "quota '{}' references unknown variation {variation_id}",
                quota.name()
            )));
        }

        Ok(())
    }

    fn resolve_event(&self, target: StockTarget) -> DomainResult<EventId> {
        match target {
            StockTarget::Item(id) => {
                let item = self
                    .catalog
                    .item(id)
                    .ok_or_else(|| DomainError::not_found(format!("item {id}")))?;
                if item.has_properties() {
                    return Err(DomainError::configuration(format!(
                        "item '{}' has properties; query one of its variations",
                        item.name()
                    )));
                }
                Ok(item.event_id())
            }
            StockTarget::Variation(id) => {
                let variation = self
                    .catalog
                    .variation(id)
                    .ok_or_else(|| DomainError::not_found(format!("variation {id}")))?;
                let item = self.catalog.item(variation.item_id()).ok_or_else(|| {
                    DomainError::integrity(format!("variation {id} belongs to an unknown item"))
                })?;
                Ok(item.event_id())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(paid: u64, pending: u64, reserved: u64) -> QuotaUsage {
        QuotaUsage { paid, pending, reserved }
    }

    #[test]
    fn severity_order() {
        assert!(Availability::Ok < Availability::Reserved);
        assert!(Availability::Reserved < Availability::Ordered);
        assert!(Availability::Ordered < Availability::Gone);
    }

    #[test]
    fn codes() {
        assert_eq!(Availability::Gone.code(), 0);
        assert_eq!(Availability::Ordered.code(), 10);
        assert_eq!(Availability::Reserved.code(), 20);
        assert_eq!(Availability::Ok.code(), 100);
    }

    #[test]
    fn classify_boundaries() {
        assert_eq!(usage(0, 0, 0).classify(Some(2)).status, Availability::Ok);
        assert_eq!(usage(2, 0, 0).classify(Some(2)).status, Availability::Gone);
        assert_eq!(usage(1, 1, 0).classify(Some(2)).status, Availability::Ordered);
        assert_eq!(usage(1, 1, 1).classify(Some(3)).status, Availability::Reserved);
        assert_eq!(usage(1, 1, 0).classify(Some(3)).status, Availability::Ok);
        assert_eq!(usage(0, 0, 0).classify(Some(0)).status, Availability::Gone);
    }

    #[test]
    fn classify_reports_headroom() {
        assert_eq!(usage(1, 1, 0).classify(Some(5)).remaining, Some(3));
        assert_eq!(usage(4, 0, 3).classify(Some(5)).remaining, Some(0));
        assert_eq!(usage(100, 0, 0).classify(None), QuotaAvailability::unlimited());
    }

    #[test]
    fn restrict_keeps_the_tighter_result() {
        let ok = QuotaAvailability { status: Availability::Ok, remaining: Some(10) };
        let reserved = QuotaAvailability { status: Availability::Reserved, remaining: Some(0) };

        let combined = ok.restrict(reserved);
        assert_eq!(combined.status, Availability::Reserved);
        assert_eq!(combined.remaining, Some(0));

        let with_unlimited = QuotaAvailability::unlimited().restrict(ok);
        assert_eq!(with_unlimited, ok);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: more consumption never improves the status.
            #[test]
            fn status_is_monotonic_in_usage(
                paid in 0u64..10, pending in 0u64..10, reserved in 0u64..10,
                extra in 0u64..5, size in 0u64..20
            ) {
                let base = usage(paid, pending, reserved).classify(Some(size)).status;
                prop_assert!(usage(paid + extra, pending, reserved).classify(Some(size)).status >= base);
                prop_assert!(usage(paid, pending + extra, reserved).classify(Some(size)).status >= base);
                prop_assert!(usage(paid, pending, reserved + extra).classify(Some(size)).status >= base);
            }

            /// Property: OK exactly when total consumption is below the size.
            #[test]
            fn ok_iff_below_capacity(
                paid in 0u64..10, pending in 0u64..10, reserved in 0u64..10, size in 0u64..30
            ) {
                let u = usage(paid, pending, reserved);
                prop_assert_eq!(u.classify(Some(size)).status.is_ok(), u.total() < size);
            }
        }
    }
}
