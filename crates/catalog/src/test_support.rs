//! Shared catalog fixture: an event with "Size" (S, M, L) and "Color"
//! (black, blue).

use chrono::{DateTime, TimeZone, Utc};

use boxoffice_core::{EventId, ItemId, PropertyId};

use crate::item::Item;
use crate::property::{Property, PropertyValue};

pub(crate) struct Fixture {
    pub event_id: EventId,
    pub size: Property,
    pub color: Property,
}

impl Fixture {
    pub fn new() -> Self {
        let event_id = EventId::new();
        let mut size = Property::new(PropertyId::new(), event_id, "Size").unwrap();
        for v in ["S", "M", "L"] {
            size.add_value(v).unwrap();
        }
        let mut color = Property::new(PropertyId::new(), event_id, "Color").unwrap();
        for v in ["black", "blue"] {
            color.add_value(v).unwrap();
        }
        Self {
            event_id,
            size,
            color,
        }
    }

    pub fn properties(&self) -> Vec<Property> {
        vec![self.size.clone(), self.color.clone()]
    }

    pub fn size_value(&self, value: &str) -> PropertyValue {
        self.size.value_named(value).cloned().unwrap()
    }

    pub fn color_value(&self, value: &str) -> PropertyValue {
        self.color.value_named(value).cloned().unwrap()
    }

    pub fn item(&self, name: &str) -> Item {
        Item::new(ItemId::new(), self.event_id, name, 0, t0()).unwrap()
    }
}

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}
