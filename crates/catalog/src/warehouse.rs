use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use stockflow_events::Event;

/// Warehouse identifier.
///
/// Ordering matters: the allocation engine's cross-warehouse fallback scans
/// warehouses in ascending id order, and UUIDv7 ids sort by creation time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseId(pub AggregateId);

impl WarehouseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for WarehouseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Warehouse.
///
/// Only active warehouses participate in allocation and replenishment, and
/// inactive warehouses reject ledger mutations (checked at the application
/// boundary, since stock records live in their own aggregates).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warehouse {
    id: WarehouseId,
    name: String,
    active: bool,
    version: u64,
    created: bool,
}

impl Warehouse {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: WarehouseId) -> Self {
        Self {
            id,
            name: String::new(),
            active: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> WarehouseId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn exists(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterWarehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWarehouse {
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateWarehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateWarehouse {
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ActivateWarehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateWarehouse {
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseCommand {
    RegisterWarehouse(RegisterWarehouse),
    DeactivateWarehouse(DeactivateWarehouse),
    ActivateWarehouse(ActivateWarehouse),
}

/// Event: WarehouseRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseRegistered {
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WarehouseDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseDeactivated {
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WarehouseActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseActivated {
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseEvent {
    WarehouseRegistered(WarehouseRegistered),
    WarehouseDeactivated(WarehouseDeactivated),
    WarehouseActivated(WarehouseActivated),
}

impl Event for WarehouseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WarehouseEvent::WarehouseRegistered(_) => "catalog.warehouse.registered",
            WarehouseEvent::WarehouseDeactivated(_) => "catalog.warehouse.deactivated",
            WarehouseEvent::WarehouseActivated(_) => "catalog.warehouse.activated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WarehouseEvent::WarehouseRegistered(e) => e.occurred_at,
            WarehouseEvent::WarehouseDeactivated(e) => e.occurred_at,
            WarehouseEvent::WarehouseActivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Warehouse {
    type Command = WarehouseCommand;
    type Event = WarehouseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WarehouseEvent::WarehouseRegistered(e) => {
                self.id = e.warehouse_id;
                self.name = e.name.clone();
                self.active = true;
                self.created = true;
            }
            WarehouseEvent::WarehouseDeactivated(_) => {
                self.active = false;
            }
            WarehouseEvent::WarehouseActivated(_) => {
                self.active = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WarehouseCommand::RegisterWarehouse(cmd) => self.handle_register(cmd),
            WarehouseCommand::DeactivateWarehouse(cmd) => self.handle_deactivate(cmd),
            WarehouseCommand::ActivateWarehouse(cmd) => self.handle_activate(cmd),
        }
    }
}

impl Warehouse {
    fn ensure_warehouse_id(&self, warehouse_id: WarehouseId) -> Result<(), DomainError> {
        if self.id != warehouse_id {
            return Err(DomainError::invariant("warehouse_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(
        &self,
        cmd: &RegisterWarehouse,
    ) -> Result<Vec<WarehouseEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("warehouse already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![WarehouseEvent::WarehouseRegistered(
            WarehouseRegistered {
                warehouse_id: cmd.warehouse_id,
                name: cmd.name.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_deactivate(
        &self,
        cmd: &DeactivateWarehouse,
    ) -> Result<Vec<WarehouseEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found("warehouse"));
        }
        self.ensure_warehouse_id(cmd.warehouse_id)?;

        if !self.active {
            return Err(DomainError::invalid_state("warehouse is already inactive"));
        }

        Ok(vec![WarehouseEvent::WarehouseDeactivated(
            WarehouseDeactivated {
                warehouse_id: cmd.warehouse_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_activate(
        &self,
        cmd: &ActivateWarehouse,
    ) -> Result<Vec<WarehouseEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found("warehouse"));
        }
        self.ensure_warehouse_id(cmd.warehouse_id)?;

        if self.active {
            return Err(DomainError::invalid_state("warehouse is already active"));
        }

        Ok(vec![WarehouseEvent::WarehouseActivated(WarehouseActivated {
            warehouse_id: cmd.warehouse_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::AggregateId;

    fn test_warehouse_id() -> WarehouseId {
        WarehouseId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn register_warehouse_starts_active() {
        let id = test_warehouse_id();
        let mut warehouse = Warehouse::empty(id);

        let events = warehouse
            .handle(&WarehouseCommand::RegisterWarehouse(RegisterWarehouse {
                warehouse_id: id,
                name: "Main".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        warehouse.apply(&events[0]);

        assert!(warehouse.is_active());
        assert_eq!(warehouse.name(), "Main");
        assert_eq!(warehouse.version(), 1);
    }

    #[test]
    fn warehouse_ids_order_by_uuid_bytes() {
        let low = WarehouseId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(1)));
        let high = WarehouseId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(2)));
        // The cross-warehouse scan relies on this ordering.
        assert!(low < high);
    }

    #[test]
    fn deactivate_flips_active_flag() {
        let id = test_warehouse_id();
        let mut warehouse = Warehouse::empty(id);

        let events = warehouse
            .handle(&WarehouseCommand::RegisterWarehouse(RegisterWarehouse {
                warehouse_id: id,
                name: "Main".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        warehouse.apply(&events[0]);

        let events = warehouse
            .handle(&WarehouseCommand::DeactivateWarehouse(DeactivateWarehouse {
                warehouse_id: id,
                occurred_at: test_time(),
            }))
            .unwrap();
        warehouse.apply(&events[0]);
        assert!(!warehouse.is_active());
    }
}
