//! Domain events emitted by the quota and order aggregates.

pub mod event;
pub mod record;

pub use event::Event;
pub use record::RecordedEvent;
