use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boxoffice_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, EventId, ItemId, QuotaId, VariationId,
};
use boxoffice_events::Event;

use crate::source::StockTarget;

/// Aggregate root: Quota, a stock pool shared by items and variations.
///
/// `size = None` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    id: QuotaId,
    event_id: Option<EventId>,
    name: String,
    size: Option<u64>,
    items: BTreeSet<ItemId>,
    variations: BTreeSet<VariationId>,
    version: u64,
    created: bool,
}

impl Quota {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: QuotaId) -> Self {
        Self {
            id,
            event_id: None,
            name: String::new(),
            size: None,
            items: BTreeSet::new(),
            variations: BTreeSet::new(),
            version: 0,
            created: false,
        }
    }

    /// Run `CreateQuota` on a fresh instance.
    pub fn create(
        id: QuotaId,
        event_id: EventId,
        name: impl Into<String>,
        size: Option<u64>,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let mut quota = Self::empty(id);
        quota.execute(&QuotaCommand::CreateQuota(CreateQuota {
            event_id,
            quota_id: id,
            name: name.into(),
            size,
            occurred_at,
        }))?;
        Ok(quota)
    }

    pub fn add_item(&mut self, item_id: ItemId, occurred_at: DateTime<Utc>) -> DomainResult<()> {
        let quota_id = self.id;
        self.execute(&QuotaCommand::AddItem(AddItem {
            quota_id,
            item_id,
            occurred_at,
        }))
        .map(|_| ())
    }

    pub fn add_variation(
        &mut self,
        variation_id: VariationId,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let quota_id = self.id;
        self.execute(&QuotaCommand::AddVariation(AddVariation {
            quota_id,
            variation_id,
            occurred_at,
        }))
        .map(|_| ())
    }

    pub fn resize(&mut self, size: Option<u64>, occurred_at: DateTime<Utc>) -> DomainResult<()> {
        let quota_id = self.id;
        self.execute(&QuotaCommand::ResizeQuota(ResizeQuota {
            quota_id,
            size,
            occurred_at,
        }))
        .map(|_| ())
    }

    pub fn id_typed(&self) -> QuotaId {
        self.id
    }

    pub fn event_id(&self) -> Option<EventId> {
        self.event_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn is_unlimited(&self) -> bool {
        self.size.is_none()
    }

    pub fn items(&self) -> &BTreeSet<ItemId> {
        &self.items
    }

    pub fn variations(&self) -> &BTreeSet<VariationId> {
        &self.variations
    }

    /// Whether a position for `item_id`/`variation_id` draws from this quota.
    ///
    /// A position with a variation counts iff the variation is linked; a
    /// position without one counts iff the item is linked.
    pub fn covers(&self, item_id: ItemId, variation_id: Option<VariationId>) -> bool {
        match variation_id {
            Some(v) => self.variations.contains(&v),
            None => self.items.contains(&item_id),
        }
    }

    pub fn references(&self, target: StockTarget) -> bool {
        match target {
            StockTarget::Item(id) => self.items.contains(&id),
            StockTarget::Variation(id) => self.variations.contains(&id),
        }
    }
}

impl AggregateRoot for Quota {
    type Id = QuotaId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateQuota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateQuota {
    pub event_id: EventId,
    pub quota_id: QuotaId,
    pub name: String,
    pub size: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItem {
    pub quota_id: QuotaId,
    pub item_id: ItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddVariation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddVariation {
    pub quota_id: QuotaId,
    pub variation_id: VariationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveItem {
    pub quota_id: QuotaId,
    pub item_id: ItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveVariation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveVariation {
    pub quota_id: QuotaId,
    pub variation_id: VariationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResizeQuota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeQuota {
    pub quota_id: QuotaId,
    pub size: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaCommand {
    CreateQuota(CreateQuota),
    AddItem(AddItem),
    AddVariation(AddVariation),
    RemoveItem(RemoveItem),
    RemoveVariation(RemoveVariation),
    ResizeQuota(ResizeQuota),
}

/// Event: QuotaCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCreated {
    pub event_id: EventId,
    pub quota_id: QuotaId,
    pub name: String,
    pub size: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAdded {
    pub quota_id: QuotaId,
    pub item_id: ItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VariationAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationAdded {
    pub quota_id: QuotaId,
    pub variation_id: VariationId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRemoved {
    pub quota_id: QuotaId,
    pub item_id: ItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VariationRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationRemoved {
    pub quota_id: QuotaId,
    pub variation_id: VariationId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuotaResized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaResized {
    pub quota_id: QuotaId,
    pub size: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaEvent {
    QuotaCreated(QuotaCreated),
    ItemAdded(ItemAdded),
    VariationAdded(VariationAdded),
    ItemRemoved(ItemRemoved),
    VariationRemoved(VariationRemoved),
    QuotaResized(QuotaResized),
}

impl Event for QuotaEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QuotaEvent::QuotaCreated(_) => "quotas.quota.created",
            QuotaEvent::ItemAdded(_) => "quotas.quota.item_added",
            QuotaEvent::VariationAdded(_) => "quotas.quota.variation_added",
            QuotaEvent::ItemRemoved(_) => "quotas.quota.item_removed",
            QuotaEvent::VariationRemoved(_) => "quotas.quota.variation_removed",
            QuotaEvent::QuotaResized(_) => "quotas.quota.resized",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            QuotaEvent::QuotaCreated(e) => e.occurred_at,
            QuotaEvent::ItemAdded(e) => e.occurred_at,
            QuotaEvent::VariationAdded(e) => e.occurred_at,
            QuotaEvent::ItemRemoved(e) => e.occurred_at,
            QuotaEvent::VariationRemoved(e) => e.occurred_at,
            QuotaEvent::QuotaResized(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Quota {
    type Command = QuotaCommand;
    type Event = QuotaEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            QuotaEvent::QuotaCreated(e) => {
                self.id = e.quota_id;
                self.event_id = Some(e.event_id);
                self.name = e.name.clone();
                self.size = e.size;
                self.items.clear();
                self.variations.clear();
                self.created = true;
            }
            QuotaEvent::ItemAdded(e) => {
                self.items.insert(e.item_id);
            }
            QuotaEvent::VariationAdded(e) => {
                self.variations.insert(e.variation_id);
            }
            QuotaEvent::ItemRemoved(e) => {
                self.items.remove(&e.item_id);
            }
            QuotaEvent::VariationRemoved(e) => {
                self.variations.remove(&e.variation_id);
            }
            QuotaEvent::QuotaResized(e) => {
                self.size = e.size;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            QuotaCommand::CreateQuota(cmd) => self.handle_create(cmd),
            QuotaCommand::AddItem(cmd) => self.handle_add_item(cmd),
            QuotaCommand::AddVariation(cmd) => self.handle_add_variation(cmd),
            QuotaCommand::RemoveItem(cmd) => self.handle_remove_item(cmd),
            QuotaCommand::RemoveVariation(cmd) => self.handle_remove_variation(cmd),
            QuotaCommand::ResizeQuota(cmd) => self.handle_resize(cmd),
        }
    }
}

impl Quota {
    fn ensure_created(&self, quota_id: QuotaId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("quota {quota_id}")));
        }
        if self.id != quota_id {
            return Err(DomainError::invariant("quota_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateQuota) -> Result<Vec<QuotaEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("quota already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![QuotaEvent::QuotaCreated(QuotaCreated {
            event_id: cmd.event_id,
            quota_id: cmd.quota_id,
            name: cmd.name.clone(),
            size: cmd.size,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_item(&self, cmd: &AddItem) -> Result<Vec<QuotaEvent>, DomainError> {
        self.ensure_created(cmd.quota_id)?;
        if self.items.contains(&cmd.item_id) {
            return Err(DomainError::conflict(format!(
                "item {} is already in quota '{}'",
                cmd.item_id, self.name
            )));
        }

        Ok(vec![QuotaEvent::ItemAdded(ItemAdded {
            quota_id: cmd.quota_id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_variation(&self, cmd: &AddVariation) -> Result<Vec<QuotaEvent>, DomainError> {
        self.ensure_created(cmd.quota_id)?;
        if self.variations.contains(&cmd.variation_id) {
            return Err(DomainError::conflict(format!(
                "variation {} is already in quota '{}'",
                cmd.variation_id, self.name
            )));
        }

        Ok(vec![QuotaEvent::VariationAdded(VariationAdded {
            quota_id: cmd.quota_id,
            variation_id: cmd.variation_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_item(&self, cmd: &RemoveItem) -> Result<Vec<QuotaEvent>, DomainError> {
        self.ensure_created(cmd.quota_id)?;
        if !self.items.contains(&cmd.item_id) {
            return Err(DomainError::not_found(format!("item {} in quota", cmd.item_id)));
        }

        Ok(vec![QuotaEvent::ItemRemoved(ItemRemoved {
            quota_id: cmd.quota_id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_variation(
        &self,
        cmd: &RemoveVariation,
    ) -> Result<Vec<QuotaEvent>, DomainError> {
        self.ensure_created(cmd.quota_id)?;
        if !self.variations.contains(&cmd.variation_id) {
            return Err(DomainError::not_found(format!(
                "variation {} in quota",
                cmd.variation_id
            )));
        }

        Ok(vec![QuotaEvent::VariationRemoved(VariationRemoved {
            quota_id: cmd.quota_id,
            variation_id: cmd.variation_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_resize(&self, cmd: &ResizeQuota) -> Result<Vec<QuotaEvent>, DomainError> {
        self.ensure_created(cmd.quota_id)?;
        if self.size == cmd.size {
            return Err(DomainError::conflict("quota already has this size"));
        }

        Ok(vec![QuotaEvent::QuotaResized(QuotaResized {
            quota_id: cmd.quota_id,
            size: cmd.size,
            occurred_at: cmd.occurred_at,
        })])
    }
}
