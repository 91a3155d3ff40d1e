use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boxoffice_core::{
    CartId, CartPositionId, DomainError, DomainResult, Entity, EventId, ItemId, VariationId,
};

/// A buyer's time-limited reservation of one unit of an item or variation.
///
/// Holds stock only while `expires` is in the future. Expired positions are
/// not deleted here; they simply stop counting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartPosition {
    id: CartPositionId,
    cart_id: CartId,
    event_id: EventId,
    item_id: ItemId,
    variation_id: Option<VariationId>,
    /// Price in smallest currency unit (e.g., cents).
    price: u64,
    expires: DateTime<Utc>,
}

impl CartPosition {
    pub fn new(
        id: CartPositionId,
        cart_id: CartId,
        event_id: EventId,
        item_id: ItemId,
        variation_id: Option<VariationId>,
        price: u64,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            cart_id,
            event_id,
            item_id,
            variation_id,
            price,
            expires,
        }
    }

    pub fn id_typed(&self) -> CartPositionId {
        self.id
    }

    pub fn cart_id(&self) -> CartId {
        self.cart_id
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn variation_id(&self) -> Option<VariationId> {
        self.variation_id
    }

    pub fn price(&self) -> u64 {
        self.price
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    /// True while the reservation holds stock (`expires` strictly after `now`).
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires > now
    }

    /// Move the expiry forward. Only unexpired positions can be extended.
    pub fn extend(&mut self, until: DateTime<Utc>, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_active(now) {
            return Err(DomainError::invariant("cart position has already expired"));
        }
        if until <= self.expires {
            return Err(DomainError::validation("new expiry must be later than the current one"));
        }
        self.expires = until;
        Ok(())
    }
}

impl Entity for CartPosition {
    type Id = CartPositionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
