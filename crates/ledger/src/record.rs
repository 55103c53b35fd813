use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_catalog::{ProductId, WarehouseId};
use stockflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ValueObject};
use stockflow_events::Event;

/// Stock record identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockRecordId(pub AggregateId);

impl StockRecordId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StockRecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Inbound,
    Outbound,
}

/// One line of the movement log (immutable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub kind: MovementKind,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
    pub note: String,
}

impl ValueObject for Movement {}

/// Aggregate root: StockRecord.
///
/// One record per (warehouse, product) pair; the pairing uniqueness is
/// enforced by the application index, not here. Invariants held by the
/// aggregate: `on_hand >= 0`, `reserved >= 0`, `reserved <= on_hand`.
/// Available quantity is `on_hand - reserved`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRecord {
    id: StockRecordId,
    warehouse_id: Option<WarehouseId>,
    product_id: Option<ProductId>,
    on_hand: i64,
    reserved: i64,
    movements: Vec<Movement>,
    closed: bool,
    version: u64,
    created: bool,
}

impl StockRecord {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StockRecordId) -> Self {
        Self {
            id,
            warehouse_id: None,
            product_id: None,
            on_hand: 0,
            reserved: 0,
            movements: Vec::new(),
            closed: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StockRecordId {
        self.id
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    pub fn reserved(&self) -> i64 {
        self.reserved
    }

    /// Quantity an allocation may still consume.
    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }

    /// Ordered movement log, oldest first.
    pub fn movements(&self) -> &[Movement] {
        &self.movements
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn exists(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for StockRecord {
    type Id = StockRecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenRecord.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRecord {
    pub record_id: StockRecordId,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub initial_on_hand: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddStock {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveStock {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStock {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseRecord.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRecord {
    pub record_id: StockRecordId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockRecordCommand {
    OpenRecord(OpenRecord),
    AddStock(AddStock),
    RemoveStock(RemoveStock),
    ReserveStock(ReserveStock),
    ReleaseStock(ReleaseStock),
    CloseRecord(CloseRecord),
}

/// Event: RecordOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOpened {
    pub record_id: StockRecordId,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReceived (inbound movement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockIssued (outbound movement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockIssued {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleased {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecordClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordClosed {
    pub record_id: StockRecordId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockRecordEvent {
    RecordOpened(RecordOpened),
    StockReceived(StockReceived),
    StockIssued(StockIssued),
    StockReserved(StockReserved),
    StockReleased(StockReleased),
    RecordClosed(RecordClosed),
}

impl Event for StockRecordEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockRecordEvent::RecordOpened(_) => "ledger.record.opened",
            StockRecordEvent::StockReceived(_) => "ledger.record.stock_received",
            StockRecordEvent::StockIssued(_) => "ledger.record.stock_issued",
            StockRecordEvent::StockReserved(_) => "ledger.record.stock_reserved",
            StockRecordEvent::StockReleased(_) => "ledger.record.stock_released",
            StockRecordEvent::RecordClosed(_) => "ledger.record.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockRecordEvent::RecordOpened(e) => e.occurred_at,
            StockRecordEvent::StockReceived(e) => e.occurred_at,
            StockRecordEvent::StockIssued(e) => e.occurred_at,
            StockRecordEvent::StockReserved(e) => e.occurred_at,
            StockRecordEvent::StockReleased(e) => e.occurred_at,
            StockRecordEvent::RecordClosed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockRecord {
    type Command = StockRecordCommand;
    type Event = StockRecordEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockRecordEvent::RecordOpened(e) => {
                self.id = e.record_id;
                self.warehouse_id = Some(e.warehouse_id);
                self.product_id = Some(e.product_id);
                self.on_hand = 0;
                self.reserved = 0;
                self.created = true;
            }
            StockRecordEvent::StockReceived(e) => {
                self.on_hand += e.quantity;
                self.movements.push(Movement {
                    kind: MovementKind::Inbound,
                    quantity: e.quantity,
                    occurred_at: e.occurred_at,
                    note: e.note.clone(),
                });
            }
            StockRecordEvent::StockIssued(e) => {
                self.on_hand -= e.quantity;
                self.movements.push(Movement {
                    kind: MovementKind::Outbound,
                    quantity: e.quantity,
                    occurred_at: e.occurred_at,
                    note: e.note.clone(),
                });
            }
            StockRecordEvent::StockReserved(e) => {
                self.reserved += e.quantity;
            }
            StockRecordEvent::StockReleased(e) => {
                self.reserved -= e.quantity;
            }
            StockRecordEvent::RecordClosed(_) => {
                self.closed = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockRecordCommand::OpenRecord(cmd) => self.handle_open(cmd),
            StockRecordCommand::AddStock(cmd) => self.handle_add(cmd),
            StockRecordCommand::RemoveStock(cmd) => self.handle_remove(cmd),
            StockRecordCommand::ReserveStock(cmd) => self.handle_reserve(cmd),
            StockRecordCommand::ReleaseStock(cmd) => self.handle_release(cmd),
            StockRecordCommand::CloseRecord(cmd) => self.handle_close(cmd),
        }
    }
}

impl StockRecord {
    fn ensure_open(&self, record_id: StockRecordId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("stock record"));
        }
        if self.id != record_id {
            return Err(DomainError::invariant("record_id mismatch"));
        }
        if self.closed {
            return Err(DomainError::invalid_state("stock record is closed"));
        }
        Ok(())
    }

    fn ensure_positive(quantity: i64) -> Result<(), DomainError> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenRecord) -> Result<Vec<StockRecordEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("stock record already exists"));
        }
        if cmd.initial_on_hand < 0 {
            return Err(DomainError::validation("initial_on_hand cannot be negative"));
        }

        let mut events = vec![StockRecordEvent::RecordOpened(RecordOpened {
            record_id: cmd.record_id,
            warehouse_id: cmd.warehouse_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })];

        // A non-zero opening balance is itself an inbound movement, so the
        // log accounts for every unit ever held.
        if cmd.initial_on_hand > 0 {
            events.push(StockRecordEvent::StockReceived(StockReceived {
                record_id: cmd.record_id,
                quantity: cmd.initial_on_hand,
                note: "initial stock".to_string(),
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_add(&self, cmd: &AddStock) -> Result<Vec<StockRecordEvent>, DomainError> {
        self.ensure_open(cmd.record_id)?;
        Self::ensure_positive(cmd.quantity)?;

        Ok(vec![StockRecordEvent::StockReceived(StockReceived {
            record_id: cmd.record_id,
            quantity: cmd.quantity,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveStock) -> Result<Vec<StockRecordEvent>, DomainError> {
        self.ensure_open(cmd.record_id)?;
        Self::ensure_positive(cmd.quantity)?;

        if self.available() < cmd.quantity {
            return Err(DomainError::insufficient_stock(format!(
                "requested {} but only {} available",
                cmd.quantity,
                self.available()
            )));
        }

        Ok(vec![StockRecordEvent::StockIssued(StockIssued {
            record_id: cmd.record_id,
            quantity: cmd.quantity,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveStock) -> Result<Vec<StockRecordEvent>, DomainError> {
        self.ensure_open(cmd.record_id)?;
        Self::ensure_positive(cmd.quantity)?;

        if self.available() < cmd.quantity {
            return Err(DomainError::insufficient_stock(format!(
                "requested {} but only {} available",
                cmd.quantity,
                self.available()
            )));
        }

        Ok(vec![StockRecordEvent::StockReserved(StockReserved {
            record_id: cmd.record_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseStock) -> Result<Vec<StockRecordEvent>, DomainError> {
        self.ensure_open(cmd.record_id)?;
        Self::ensure_positive(cmd.quantity)?;

        if self.reserved < cmd.quantity {
            return Err(DomainError::invalid_state(format!(
                "cannot release {} with only {} reserved",
                cmd.quantity, self.reserved
            )));
        }

        Ok(vec![StockRecordEvent::StockReleased(StockReleased {
            record_id: cmd.record_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &CloseRecord) -> Result<Vec<StockRecordEvent>, DomainError> {
        self.ensure_open(cmd.record_id)?;

        if self.reserved > 0 {
            return Err(DomainError::invalid_state(
                "cannot close a record with reserved stock",
            ));
        }

        Ok(vec![StockRecordEvent::RecordClosed(RecordClosed {
            record_id: cmd.record_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stockflow_core::AggregateId;

    fn test_record_id() -> StockRecordId {
        StockRecordId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn open_record(initial_on_hand: i64) -> StockRecord {
        let id = test_record_id();
        let mut record = StockRecord::empty(id);
        let events = record
            .handle(&StockRecordCommand::OpenRecord(OpenRecord {
                record_id: id,
                warehouse_id: WarehouseId::new(AggregateId::new()),
                product_id: ProductId::new(AggregateId::new()),
                initial_on_hand,
                occurred_at: test_time(),
            }))
            .unwrap();
        for e in &events {
            record.apply(e);
        }
        record
    }

    fn run(record: &mut StockRecord, cmd: StockRecordCommand) -> Result<(), DomainError> {
        let events = record.handle(&cmd)?;
        for e in &events {
            record.apply(e);
        }
        Ok(())
    }

    #[test]
    fn open_with_initial_stock_logs_an_inbound_movement() {
        let record = open_record(10);
        assert_eq!(record.on_hand(), 10);
        assert_eq!(record.reserved(), 0);
        assert_eq!(record.movements().len(), 1);
        assert_eq!(record.movements()[0].kind, MovementKind::Inbound);
        assert_eq!(record.movements()[0].quantity, 10);
        // RecordOpened + StockReceived.
        assert_eq!(record.version(), 2);
    }

    #[test]
    fn open_with_zero_initial_stock_logs_nothing() {
        let record = open_record(0);
        assert_eq!(record.on_hand(), 0);
        assert!(record.movements().is_empty());
        assert_eq!(record.version(), 1);
    }

    #[test]
    fn add_then_remove_restores_on_hand_and_appends_two_movements() {
        let mut record = open_record(5);
        let id = record.id_typed();

        run(
            &mut record,
            StockRecordCommand::AddStock(AddStock {
                record_id: id,
                quantity: 7,
                note: "delivery".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        run(
            &mut record,
            StockRecordCommand::RemoveStock(RemoveStock {
                record_id: id,
                quantity: 7,
                note: "shipment".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert_eq!(record.on_hand(), 5);
        assert_eq!(record.movements().len(), 3);
        assert_eq!(record.movements()[1].kind, MovementKind::Inbound);
        assert_eq!(record.movements()[2].kind, MovementKind::Outbound);
    }

    #[test]
    fn remove_beyond_available_is_rejected_and_leaves_record_unchanged() {
        let mut record = open_record(3);
        let id = record.id_typed();
        let before = record.clone();

        let err = run(
            &mut record,
            StockRecordCommand::RemoveStock(RemoveStock {
                record_id: id,
                quantity: 4,
                note: "shipment".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();

        assert!(matches!(err, DomainError::InsufficientStock(_)));
        assert_eq!(record, before);
    }

    #[test]
    fn reserve_counts_against_available() {
        let mut record = open_record(10);
        let id = record.id_typed();

        run(
            &mut record,
            StockRecordCommand::ReserveStock(ReserveStock {
                record_id: id,
                quantity: 6,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(record.available(), 4);

        let err = run(
            &mut record,
            StockRecordCommand::RemoveStock(RemoveStock {
                record_id: id,
                quantity: 5,
                note: "shipment".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock(_)));
    }

    #[test]
    fn release_beyond_reserved_is_rejected() {
        let mut record = open_record(10);
        let id = record.id_typed();

        run(
            &mut record,
            StockRecordCommand::ReserveStock(ReserveStock {
                record_id: id,
                quantity: 2,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = run(
            &mut record,
            StockRecordCommand::ReleaseStock(ReleaseStock {
                record_id: id,
                quantity: 3,
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn close_is_blocked_while_stock_is_reserved() {
        let mut record = open_record(10);
        let id = record.id_typed();

        run(
            &mut record,
            StockRecordCommand::ReserveStock(ReserveStock {
                record_id: id,
                quantity: 1,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = run(
            &mut record,
            StockRecordCommand::CloseRecord(CloseRecord {
                record_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));

        run(
            &mut record,
            StockRecordCommand::ReleaseStock(ReleaseStock {
                record_id: id,
                quantity: 1,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        run(
            &mut record,
            StockRecordCommand::CloseRecord(CloseRecord {
                record_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert!(record.is_closed());
    }

    #[test]
    fn closed_record_rejects_mutations() {
        let mut record = open_record(0);
        let id = record.id_typed();

        run(
            &mut record,
            StockRecordCommand::CloseRecord(CloseRecord {
                record_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = run(
            &mut record,
            StockRecordCommand::AddStock(AddStock {
                record_id: id,
                quantity: 1,
                note: "delivery".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        let mut record = open_record(5);
        let id = record.id_typed();

        for quantity in [0, -3] {
            let err = run(
                &mut record,
                StockRecordCommand::AddStock(AddStock {
                    record_id: id,
                    quantity,
                    note: "delivery".to_string(),
                    occurred_at: test_time(),
                }),
            )
            .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(i64),
        Remove(i64),
        Reserve(i64),
        Release(i64),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..100).prop_map(Op::Add),
            (1i64..100).prop_map(Op::Remove),
            (1i64..100).prop_map(Op::Reserve),
            (1i64..100).prop_map(Op::Release),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: no command sequence can break `0 <= reserved <= on_hand`,
        /// and the signed movement sum always equals on_hand.
        #[test]
        fn invariants_hold_under_arbitrary_command_sequences(
            initial in 0i64..100,
            ops in prop::collection::vec(arb_op(), 1..40)
        ) {
            let mut record = open_record(initial);
            let id = record.id_typed();

            for op in ops {
                let cmd = match op {
                    Op::Add(q) => StockRecordCommand::AddStock(AddStock {
                        record_id: id,
                        quantity: q,
                        note: "delivery".to_string(),
                        occurred_at: test_time(),
                    }),
                    Op::Remove(q) => StockRecordCommand::RemoveStock(RemoveStock {
                        record_id: id,
                        quantity: q,
                        note: "shipment".to_string(),
                        occurred_at: test_time(),
                    }),
                    Op::Reserve(q) => StockRecordCommand::ReserveStock(ReserveStock {
                        record_id: id,
                        quantity: q,
                        occurred_at: test_time(),
                    }),
                    Op::Release(q) => StockRecordCommand::ReleaseStock(ReleaseStock {
                        record_id: id,
                        quantity: q,
                        occurred_at: test_time(),
                    }),
                };

                // Rejected commands must leave the record untouched.
                let before = record.clone();
                if run(&mut record, cmd).is_err() {
                    prop_assert_eq!(&record, &before);
                }

                prop_assert!(record.reserved() >= 0);
                prop_assert!(record.reserved() <= record.on_hand());

                let movement_sum: i64 = record
                    .movements()
                    .iter()
                    .map(|m| match m.kind {
                        MovementKind::Inbound => m.quantity,
                        MovementKind::Outbound => -m.quantity,
                    })
                    .sum();
                prop_assert_eq!(movement_sum, record.on_hand());
            }
        }
    }
}
