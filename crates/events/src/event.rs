use chrono::{DateTime, Utc};

/// A fact emitted by a quota or order aggregate.
///
/// Events are never mutated once emitted. Their payload shape is tied to
/// `version`, and `event_type` stays stable across releases.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, `<crate>.<aggregate>.<fact>` (e.g. "quotas.quota.resized").
    fn event_type(&self) -> &'static str;

    /// Payload schema version.
    fn version(&self) -> u32;

    /// Business time of the fact.
    fn occurred_at(&self) -> DateTime<Utc>;
}
