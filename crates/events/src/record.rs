//! Serialized form of an applied event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::event::Event;

/// One applied event with its stream metadata and JSON payload.
///
/// `sequence_number` is assigned by whoever keeps the log and starts at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub sequence_number: u64,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl RecordedEvent {
    pub fn from_typed<E>(
        sequence_number: u64,
        aggregate_type: &str,
        aggregate_id: Uuid,
        event: &E,
    ) -> Result<Self, serde_json::Error>
    where
        E: Event + Serialize,
    {
        Ok(Self {
            sequence_number,
            aggregate_type: aggregate_type.to_string(),
            aggregate_id,
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload: serde_json::to_value(event)?,
        })
    }

    /// Decode the payload back into the typed event.
    pub fn to_typed<E>(&self) -> Result<E, serde_json::Error>
    where
        E: Event + serde::de::DeserializeOwned,
    {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Resized {
        size: Option<u64>,
        occurred_at: DateTime<Utc>,
    }

    impl Event for Resized {
        fn event_type(&self) -> &'static str {
            "quotas.quota.resized"
        }

        fn version(&self) -> u32 {
            2
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.occurred_at
        }
    }

    #[test]
    fn captures_metadata_and_payload() {
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let event = Resized {
            size: Some(40),
            occurred_at: at,
        };
        let id = Uuid::now_v7();

        let recorded = RecordedEvent::from_typed(7, "quota", id, &event).unwrap();
        assert_eq!(recorded.sequence_number, 7);
        assert_eq!(recorded.aggregate_id, id);
        assert_eq!(recorded.event_type, "quotas.quota.resized");
        assert_eq!(recorded.event_version, 2);
        assert_eq!(recorded.occurred_at, at);
        assert_eq!(recorded.payload["size"], 40);
        assert_eq!(recorded.to_typed::<Resized>().unwrap(), event);
    }
}
