use serde::{Deserialize, Serialize};

use boxoffice_core::{DomainError, DomainResult, Entity, EventId, PropertyId, PropertyValueId};

/// One discrete value on a property axis (e.g. "M" on "Size").
///
/// Immutable once created: orders and variations refer to it by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    id: PropertyValueId,
    property_id: PropertyId,
    value: String,
}

impl PropertyValue {
    pub fn new(id: PropertyValueId, property_id: PropertyId, value: impl Into<String>) -> Self {
        Self {
            id,
            property_id,
            value: value.into(),
        }
    }

    pub fn id(&self) -> PropertyValueId {
        self.id
    }

    pub fn property_id(&self) -> PropertyId {
        self.property_id
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Entity for PropertyValue {
    type Id = PropertyValueId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A named axis of variation (e.g. "Size"), owning its values in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    id: PropertyId,
    event_id: EventId,
    name: String,
    values: Vec<PropertyValue>,
}

impl Property {
    pub fn new(id: PropertyId, event_id: EventId, name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("property name cannot be empty"));
        }
        Ok(Self {
            id,
            event_id,
            name,
            values: Vec::new(),
        })
    }

    pub fn id_typed(&self) -> PropertyId {
        self.id
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Values in the order they were added.
    pub fn values(&self) -> &[PropertyValue] {
        &self.values
    }

    pub fn value(&self, id: PropertyValueId) -> Option<&PropertyValue> {
        self.values.iter().find(|v| v.id == id)
    }

    pub fn value_named(&self, value: &str) -> Option<&PropertyValue> {
        self.values.iter().find(|v| v.value == value)
    }

    /// Append a new value. Values are unique per property.
    pub fn add_value(&mut self, value: impl Into<String>) -> DomainResult<PropertyValue> {
        self.add_value_with_id(PropertyValueId::new(), value)
    }

    pub fn add_value_with_id(
        &mut self,
        id: PropertyValueId,
        value: impl Into<String>,
    ) -> DomainResult<PropertyValue> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::validation("property value cannot be empty"));
        }
        if self.value_named(&value).is_some() {
            return Err(DomainError::validation(format!(
                "property '{}' already has value '{}'",
                self.name, value
            )));
        }
        if self.value(id).is_some() {
            return Err(DomainError::conflict(format!("property value {id} already exists")));
        }

        let pv = PropertyValue::new(id, self.id, value);
        self.values.push(pv.clone());
        Ok(pv)
    }
}

impl Entity for Property {
    type Id = PropertyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
