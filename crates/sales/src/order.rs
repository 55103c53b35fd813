use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_catalog::{ProductId, WarehouseId};
use stockflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Entity, UserId, ValueObject};
use stockflow_events::Event;

/// Sales order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SalesOrderId(pub AggregateId);

impl SalesOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SalesOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Sales order status lifecycle.
///
/// `Created -> Reserved -> Shipped -> Delivered`, with `Canceled` reachable
/// from every non-terminal status. `Delivered` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SalesOrderStatus {
    Created,
    Reserved,
    Shipped,
    Delivered,
    Canceled,
}

impl SalesOrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SalesOrderStatus::Delivered | SalesOrderStatus::Canceled)
    }
}

/// Order line: product, ordered quantity, reserved quantity, unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub qty_ordered: i64,
    /// Filled in by allocation; zero until the order is confirmed.
    pub qty_reserved: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
}

impl Entity for OrderLine {
    type Id = u32;

    fn id(&self) -> &Self::Id {
        &self.line_no
    }
}

/// Per-line allocation outcome reported back by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineReservation {
    pub line_no: u32,
    pub qty_reserved: i64,
}

impl ValueObject for LineReservation {}

/// Aggregate root: SalesOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesOrder {
    id: SalesOrderId,
    client_id: Option<UserId>,
    warehouse_id: Option<WarehouseId>,
    status: SalesOrderStatus,
    lines: Vec<OrderLine>,
    version: u64,
    created: bool,
}

impl SalesOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SalesOrderId) -> Self {
        Self {
            id,
            client_id: None,
            warehouse_id: None,
            status: SalesOrderStatus::Created,
            lines: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SalesOrderId {
        self.id
    }

    pub fn client_id(&self) -> Option<UserId> {
        self.client_id
    }

    /// Home warehouse: the first warehouse allocation draws from.
    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn status(&self) -> SalesOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, SalesOrderStatus::Created)
    }
}

impl AggregateRoot for SalesOrder {
    type Id = SalesOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateSalesOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSalesOrder {
    pub order_id: SalesOrderId,
    pub client_id: UserId,
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub order_id: SalesOrderId,
    pub product_id: ProductId,
    pub qty_ordered: i64,
    pub unit_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkReserved. Records the allocation outcome per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReserved {
    pub order_id: SalesOrderId,
    pub reservations: Vec<LineReservation>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ShipOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipOrder {
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeliverOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverOrder {
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderCommand {
    CreateSalesOrder(CreateSalesOrder),
    AddLine(AddLine),
    MarkReserved(MarkReserved),
    ShipOrder(ShipOrder),
    DeliverOrder(DeliverOrder),
    CancelOrder(CancelOrder),
}

/// Event: SalesOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderCreated {
    pub order_id: SalesOrderId,
    pub client_id: UserId,
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub order_id: SalesOrderId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub qty_ordered: i64,
    pub unit_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReserved {
    pub order_id: SalesOrderId,
    pub reservations: Vec<LineReservation>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderShipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCanceled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCanceled {
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderEvent {
    SalesOrderCreated(SalesOrderCreated),
    LineAdded(LineAdded),
    OrderReserved(OrderReserved),
    OrderShipped(OrderShipped),
    OrderDelivered(OrderDelivered),
    OrderCanceled(OrderCanceled),
}

impl Event for SalesOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SalesOrderEvent::SalesOrderCreated(_) => "sales.order.created",
            SalesOrderEvent::LineAdded(_) => "sales.order.line_added",
            SalesOrderEvent::OrderReserved(_) => "sales.order.reserved",
            SalesOrderEvent::OrderShipped(_) => "sales.order.shipped",
            SalesOrderEvent::OrderDelivered(_) => "sales.order.delivered",
            SalesOrderEvent::OrderCanceled(_) => "sales.order.canceled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SalesOrderEvent::SalesOrderCreated(e) => e.occurred_at,
            SalesOrderEvent::LineAdded(e) => e.occurred_at,
            SalesOrderEvent::OrderReserved(e) => e.occurred_at,
            SalesOrderEvent::OrderShipped(e) => e.occurred_at,
            SalesOrderEvent::OrderDelivered(e) => e.occurred_at,
            SalesOrderEvent::OrderCanceled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SalesOrder {
    type Command = SalesOrderCommand;
    type Event = SalesOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SalesOrderEvent::SalesOrderCreated(e) => {
                self.id = e.order_id;
                self.client_id = Some(e.client_id);
                self.warehouse_id = Some(e.warehouse_id);
                self.status = SalesOrderStatus::Created;
                self.lines.clear();
                self.created = true;
            }
            SalesOrderEvent::LineAdded(e) => {
                self.lines.push(OrderLine {
                    line_no: e.line_no,
                    product_id: e.product_id,
                    qty_ordered: e.qty_ordered,
                    qty_reserved: 0,
                    unit_price: e.unit_price,
                });
            }
            SalesOrderEvent::OrderReserved(e) => {
                for reservation in &e.reservations {
                    if let Some(line) = self
                        .lines
                        .iter_mut()
                        .find(|l| l.line_no == reservation.line_no)
                    {
                        line.qty_reserved = reservation.qty_reserved;
                    }
                }
                self.status = SalesOrderStatus::Reserved;
            }
            SalesOrderEvent::OrderShipped(_) => {
                self.status = SalesOrderStatus::Shipped;
            }
            SalesOrderEvent::OrderDelivered(_) => {
                self.status = SalesOrderStatus::Delivered;
            }
            SalesOrderEvent::OrderCanceled(_) => {
                self.status = SalesOrderStatus::Canceled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SalesOrderCommand::CreateSalesOrder(cmd) => self.handle_create(cmd),
            SalesOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            SalesOrderCommand::MarkReserved(cmd) => self.handle_mark_reserved(cmd),
            SalesOrderCommand::ShipOrder(cmd) => self.handle_ship(cmd),
            SalesOrderCommand::DeliverOrder(cmd) => self.handle_deliver(cmd),
            SalesOrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl SalesOrder {
    fn ensure_exists(&self, order_id: SalesOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("sales order"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateSalesOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sales order already exists"));
        }

        Ok(vec![SalesOrderEvent::SalesOrderCreated(SalesOrderCreated {
            order_id: cmd.order_id,
            client_id: cmd.client_id,
            warehouse_id: cmd.warehouse_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if !self.is_modifiable() {
            return Err(DomainError::invalid_state(
                "lines can only be added before confirmation",
            ));
        }
        if cmd.qty_ordered <= 0 {
            return Err(DomainError::validation("qty_ordered must be positive"));
        }
        if cmd.unit_price == 0 {
            return Err(DomainError::validation("unit_price must be positive"));
        }

        let next_line_no = (self.lines.len() as u32) + 1;

        Ok(vec![SalesOrderEvent::LineAdded(LineAdded {
            order_id: cmd.order_id,
            line_no: next_line_no,
            product_id: cmd.product_id,
            qty_ordered: cmd.qty_ordered,
            unit_price: cmd.unit_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_reserved(
        &self,
        cmd: &MarkReserved,
    ) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if self.status != SalesOrderStatus::Created {
            return Err(DomainError::invalid_state(format!(
                "only created orders can be confirmed, status is {:?}",
                self.status
            )));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot confirm an order without lines"));
        }

        // Every line must be covered exactly once, in full.
        for line in &self.lines {
            let reservation = cmd
                .reservations
                .iter()
                .find(|r| r.line_no == line.line_no)
                .ok_or_else(|| {
                    DomainError::invariant(format!("line {} has no reservation", line.line_no))
                })?;
            if reservation.qty_reserved != line.qty_ordered {
                return Err(DomainError::invariant(format!(
                    "line {} reserved {} of {} ordered",
                    line.line_no, reservation.qty_reserved, line.qty_ordered
                )));
            }
        }
        if cmd.reservations.len() != self.lines.len() {
            return Err(DomainError::invariant(
                "reservation count does not match line count",
            ));
        }

        Ok(vec![SalesOrderEvent::OrderReserved(OrderReserved {
            order_id: cmd.order_id,
            reservations: cmd.reservations.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_ship(&self, cmd: &ShipOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if self.status != SalesOrderStatus::Reserved {
            return Err(DomainError::invalid_state(
                "only reserved orders can be shipped",
            ));
        }

        Ok(vec![SalesOrderEvent::OrderShipped(OrderShipped {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deliver(&self, cmd: &DeliverOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if self.status != SalesOrderStatus::Shipped {
            return Err(DomainError::invalid_state(
                "only shipped orders can be delivered",
            ));
        }

        Ok(vec![SalesOrderEvent::OrderDelivered(OrderDelivered {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if self.status.is_terminal() {
            return Err(DomainError::invalid_state(format!(
                "cannot cancel an order in terminal status {:?}",
                self.status
            )));
        }

        Ok(vec![SalesOrderEvent::OrderCanceled(OrderCanceled {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::AggregateId;

    fn test_order_id() -> SalesOrderId {
        SalesOrderId::new(AggregateId::new())
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_order_with_line(qty_ordered: i64) -> SalesOrder {
        let id = test_order_id();
        let mut order = SalesOrder::empty(id);

        let events = order
            .handle(&SalesOrderCommand::CreateSalesOrder(CreateSalesOrder {
                order_id: id,
                client_id: UserId::new(),
                warehouse_id: WarehouseId::new(AggregateId::new()),
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);

        let events = order
            .handle(&SalesOrderCommand::AddLine(AddLine {
                order_id: id,
                product_id: test_product_id(),
                qty_ordered,
                unit_price: 100,
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);

        order
    }

    fn mark_reserved(order: &mut SalesOrder) {
        let reservations = order
            .lines()
            .iter()
            .map(|l| LineReservation {
                line_no: l.line_no,
                qty_reserved: l.qty_ordered,
            })
            .collect();
        let events = order
            .handle(&SalesOrderCommand::MarkReserved(MarkReserved {
                order_id: order.id_typed(),
                reservations,
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);
    }

    #[test]
    fn lines_are_numbered_in_submission_order() {
        let mut order = created_order_with_line(2);
        let id = order.id_typed();

        let events = order
            .handle(&SalesOrderCommand::AddLine(AddLine {
                order_id: id,
                product_id: test_product_id(),
                qty_ordered: 5,
                unit_price: 250,
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);

        let line_nos: Vec<u32> = order.lines().iter().map(|l| l.line_no).collect();
        assert_eq!(line_nos, vec![1, 2]);
        assert!(order.lines().iter().all(|l| l.qty_reserved == 0));
    }

    #[test]
    fn mark_reserved_fills_line_reservations() {
        let mut order = created_order_with_line(4);
        mark_reserved(&mut order);

        assert_eq!(order.status(), SalesOrderStatus::Reserved);
        assert_eq!(order.lines()[0].qty_reserved, 4);
    }

    #[test]
    fn reconfirming_a_reserved_order_is_rejected() {
        let mut order = created_order_with_line(4);
        mark_reserved(&mut order);

        let err = order
            .handle(&SalesOrderCommand::MarkReserved(MarkReserved {
                order_id: order.id_typed(),
                reservations: vec![LineReservation {
                    line_no: 1,
                    qty_reserved: 4,
                }],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn partial_reservation_is_rejected() {
        let order = created_order_with_line(4);

        let err = order
            .handle(&SalesOrderCommand::MarkReserved(MarkReserved {
                order_id: order.id_typed(),
                reservations: vec![LineReservation {
                    line_no: 1,
                    qty_reserved: 3,
                }],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn lines_cannot_be_added_after_confirmation() {
        let mut order = created_order_with_line(1);
        mark_reserved(&mut order);

        let err = order
            .handle(&SalesOrderCommand::AddLine(AddLine {
                order_id: order.id_typed(),
                product_id: test_product_id(),
                qty_ordered: 1,
                unit_price: 100,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn full_lifecycle_created_to_delivered() {
        let mut order = created_order_with_line(2);
        assert_eq!(order.status(), SalesOrderStatus::Created);

        mark_reserved(&mut order);
        assert_eq!(order.status(), SalesOrderStatus::Reserved);

        let events = order
            .handle(&SalesOrderCommand::ShipOrder(ShipOrder {
                order_id: order.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);
        assert_eq!(order.status(), SalesOrderStatus::Shipped);

        let events = order
            .handle(&SalesOrderCommand::DeliverOrder(DeliverOrder {
                order_id: order.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);
        assert_eq!(order.status(), SalesOrderStatus::Delivered);
    }

    #[test]
    fn cancel_is_allowed_from_any_non_terminal_status() {
        for reserve_first in [false, true] {
            let mut order = created_order_with_line(1);
            if reserve_first {
                mark_reserved(&mut order);
            }

            let events = order
                .handle(&SalesOrderCommand::CancelOrder(CancelOrder {
                    order_id: order.id_typed(),
                    occurred_at: test_time(),
                }))
                .unwrap();
            order.apply(&events[0]);
            assert_eq!(order.status(), SalesOrderStatus::Canceled);
        }
    }

    #[test]
    fn terminal_statuses_reject_cancel() {
        let mut order = created_order_with_line(1);
        let events = order
            .handle(&SalesOrderCommand::CancelOrder(CancelOrder {
                order_id: order.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);

        let err = order
            .handle(&SalesOrderCommand::CancelOrder(CancelOrder {
                order_id: order.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let order = created_order_with_line(1);
        let before = order.clone();

        let cmd = SalesOrderCommand::AddLine(AddLine {
            order_id: order.id_typed(),
            product_id: test_product_id(),
            qty_ordered: 1,
            unit_price: 100,
            occurred_at: test_time(),
        });

        let events1 = order.handle(&cmd).unwrap();
        let events2 = order.handle(&cmd).unwrap();

        assert_eq!(order, before);
        assert_eq!(events1, events2);
    }

    #[test]
    fn apply_is_deterministic() {
        let order_id = test_order_id();
        let product_id = test_product_id();
        let client_id = UserId::new();
        let warehouse_id = WarehouseId::new(AggregateId::new());

        let events = vec![
            SalesOrderEvent::SalesOrderCreated(SalesOrderCreated {
                order_id,
                client_id,
                warehouse_id,
                occurred_at: test_time(),
            }),
            SalesOrderEvent::LineAdded(LineAdded {
                order_id,
                line_no: 1,
                product_id,
                qty_ordered: 2,
                unit_price: 100,
                occurred_at: test_time(),
            }),
            SalesOrderEvent::OrderReserved(OrderReserved {
                order_id,
                reservations: vec![LineReservation {
                    line_no: 1,
                    qty_reserved: 2,
                }],
                occurred_at: test_time(),
            }),
        ];

        let mut order1 = SalesOrder::empty(order_id);
        let mut order2 = SalesOrder::empty(order_id);
        for e in &events {
            order1.apply(e);
            order2.apply(e);
        }

        assert_eq!(order1, order2);
        assert_eq!(order1.status(), SalesOrderStatus::Reserved);
        assert_eq!(order1.version(), 3);
    }
}
