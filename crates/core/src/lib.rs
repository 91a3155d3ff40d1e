//! `boxoffice-core`: shared building blocks for the availability engine.
//!
//! Pure domain primitives only: identifiers, the error model, aggregate and
//! entity traits, and the clock abstraction used to produce "now".

pub mod aggregate;
pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    CartId, CartPositionId, EventId, ItemId, ItemVersionId, OrderId, OrderPositionId, PropertyId,
    PropertyValueId, QuotaId, VariationId,
};
pub use value_object::ValueObject;
