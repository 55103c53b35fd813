//! Greedy allocation over the warehouse network.
//!
//! One confirmation walks each order line in submission order through three
//! passes: the order's home warehouse, then the other active warehouses in
//! ascending id order, then a synchronous replenishment purchase for any
//! residual shortfall. Everything is staged on the caller's session, so the
//! whole confirmation commits atomically or not at all.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use stockflow_catalog::{ProductId, WarehouseId};
use stockflow_core::AggregateId;
use stockflow_ledger::{
    AddStock, OpenRecord, RemoveStock, StockRecord, StockRecordCommand, StockRecordId,
};
use stockflow_purchasing::{
    AddPurchaseLine, ApproveOrder, CreatePurchaseOrder, PurchaseOrder, PurchaseOrderCommand,
    PurchaseOrderId, ReceiveGoods,
};
use stockflow_sales::{LineReservation, MarkReserved, SalesOrder, SalesOrderCommand, SalesOrderId};

use crate::error::AppError;
use crate::event_store::EventStore;
use crate::read_model::Directory;
use crate::session::{Session, aggregate_types};

/// How one order line was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineAllocation {
    pub line_no: u32,
    pub product_id: ProductId,
    pub requested: i64,
    /// Consumed from the order's home warehouse.
    pub from_home: i64,
    /// Consumed from other warehouses, in the order they were drained.
    pub transfers: Vec<(WarehouseId, i64)>,
    /// Covered by a synthetic purchase order.
    pub replenished: i64,
}

/// Outcome of a full confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationReport {
    pub order_id: SalesOrderId,
    pub lines: Vec<LineAllocation>,
    /// Synthetic purchase orders raised by the replenishment trigger.
    pub purchase_orders: Vec<PurchaseOrderId>,
    /// Stock records opened during replenishment (missing destination).
    pub opened_records: Vec<(WarehouseId, ProductId, StockRecordId)>,
}

/// Allocate every line of the order and stage `MarkReserved` on it.
///
/// The session carries all staged events; the caller decides when to commit.
pub fn allocate_order<S: EventStore>(
    session: &mut Session<'_, S>,
    directory: &Directory,
    order: &SalesOrder,
    now: DateTime<Utc>,
) -> Result<AllocationReport, AppError> {
    let order_id = order.id_typed();
    let home = order
        .warehouse_id()
        .ok_or_else(|| AppError::InvariantViolation("order has no home warehouse".to_string()))?;

    // Records opened during this confirmation, invisible to the directory
    // until the commit lands.
    let mut opened: HashMap<(WarehouseId, ProductId), StockRecordId> = HashMap::new();
    let mut opened_records = Vec::new();
    let mut purchase_orders = Vec::new();
    let mut lines = Vec::new();
    let mut reservations = Vec::new();

    for line in order.lines() {
        if !directory.product_known(line.product_id) {
            return Err(AppError::NotFound("product".to_string()));
        }

        let mut needed = line.qty_ordered;
        let mut allocation = LineAllocation {
            line_no: line.line_no,
            product_id: line.product_id,
            requested: line.qty_ordered,
            from_home: 0,
            transfers: Vec::new(),
            replenished: 0,
        };

        // Pass 1: home warehouse.
        if let Some(record_id) = lookup_record(directory, &opened, home, line.product_id) {
            let taken = consume(
                session,
                record_id,
                needed,
                format!("reservation for sales order {order_id}"),
                now,
            )?;
            allocation.from_home = taken;
            needed -= taken;
        }

        // Pass 2: other active warehouses, ascending id.
        if needed > 0 {
            for (warehouse_id, record_id) in directory.records_for_product(line.product_id) {
                if needed == 0 {
                    break;
                }
                if warehouse_id == home || !directory.warehouse_active(warehouse_id) {
                    continue;
                }

                let taken = consume(
                    session,
                    record_id,
                    needed,
                    format!("transfer reservation for sales order {order_id}"),
                    now,
                )?;
                if taken > 0 {
                    allocation.transfers.push((warehouse_id, taken));
                    needed -= taken;
                }
            }
        }

        // Pass 3: replenish the residual shortfall at the home warehouse.
        if needed > 0 {
            debug!(
                order_id = %order_id,
                line_no = line.line_no,
                shortfall = needed,
                "allocation short, triggering replenishment"
            );

            let po_id = replenish(
                session,
                directory,
                line.product_id,
                needed,
                line.unit_price,
                home,
                order_id,
                &mut opened,
                &mut opened_records,
                now,
            )?;
            purchase_orders.push(po_id);
            allocation.replenished = needed;
            needed = 0;
        }

        debug_assert_eq!(needed, 0);
        reservations.push(LineReservation {
            line_no: line.line_no,
            qty_reserved: line.qty_ordered,
        });
        lines.push(allocation);
    }

    session.execute::<SalesOrder>(
        order_id.0,
        aggregate_types::SALES_ORDER,
        &SalesOrderCommand::MarkReserved(MarkReserved {
            order_id,
            reservations,
            occurred_at: now,
        }),
        || SalesOrder::empty(order_id),
    )?;

    Ok(AllocationReport {
        order_id,
        lines,
        purchase_orders,
        opened_records,
    })
}

fn lookup_record(
    directory: &Directory,
    opened: &HashMap<(WarehouseId, ProductId), StockRecordId>,
    warehouse_id: WarehouseId,
    product_id: ProductId,
) -> Option<StockRecordId> {
    opened
        .get(&(warehouse_id, product_id))
        .copied()
        .or_else(|| directory.record_for(warehouse_id, product_id))
}

/// Consume up to `wanted` from one record; returns the quantity taken.
fn consume<S: EventStore>(
    session: &mut Session<'_, S>,
    record_id: StockRecordId,
    wanted: i64,
    note: String,
    now: DateTime<Utc>,
) -> Result<i64, AppError> {
    let record: StockRecord = session.load(record_id.0, aggregate_types::STOCK_RECORD, || {
        StockRecord::empty(record_id)
    })?;
    if record.is_closed() {
        return Ok(0);
    }

    let taken = wanted.min(record.available());
    if taken <= 0 {
        return Ok(0);
    }

    session.execute::<StockRecord>(
        record_id.0,
        aggregate_types::STOCK_RECORD,
        &StockRecordCommand::RemoveStock(RemoveStock {
            record_id,
            quantity: taken,
            note,
            occurred_at: now,
        }),
        || StockRecord::empty(record_id),
    )?;

    Ok(taken)
}

/// Raise a synthetic purchase order for the shortfall, receive it into the
/// destination record (opening one if missing) and consume it immediately.
#[allow(clippy::too_many_arguments)]
fn replenish<S: EventStore>(
    session: &mut Session<'_, S>,
    directory: &Directory,
    product_id: ProductId,
    shortfall: i64,
    unit_price: u64,
    destination: WarehouseId,
    order_id: SalesOrderId,
    opened: &mut HashMap<(WarehouseId, ProductId), StockRecordId>,
    opened_records: &mut Vec<(WarehouseId, ProductId, StockRecordId)>,
    now: DateTime<Utc>,
) -> Result<PurchaseOrderId, AppError> {
    let supplier_id = directory.first_active_supplier().ok_or_else(|| {
        AppError::InsufficientStock(format!(
            "shortfall of {shortfall} and no active supplier to replenish from"
        ))
    })?;

    let po_id = PurchaseOrderId::new(AggregateId::new());
    let po_commands = [
        PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
            order_id: po_id,
            supplier_id,
            occurred_at: now,
        }),
        PurchaseOrderCommand::AddPurchaseLine(AddPurchaseLine {
            order_id: po_id,
            product_id,
            quantity_ordered: shortfall,
            unit_price,
            occurred_at: now,
        }),
        PurchaseOrderCommand::ApproveOrder(ApproveOrder {
            order_id: po_id,
            occurred_at: now,
        }),
        PurchaseOrderCommand::ReceiveGoods(ReceiveGoods {
            order_id: po_id,
            warehouse_id: destination,
            occurred_at: now,
        }),
    ];
    for command in &po_commands {
        session.execute::<PurchaseOrder>(
            po_id.0,
            aggregate_types::PURCHASE_ORDER,
            command,
            || PurchaseOrder::empty(po_id),
        )?;
    }

    let record_id = match lookup_record(directory, opened, destination, product_id) {
        Some(record_id) => record_id,
        None => {
            let record_id = StockRecordId::new(AggregateId::new());
            session.execute::<StockRecord>(
                record_id.0,
                aggregate_types::STOCK_RECORD,
                &StockRecordCommand::OpenRecord(OpenRecord {
                    record_id,
                    warehouse_id: destination,
                    product_id,
                    initial_on_hand: 0,
                    occurred_at: now,
                }),
                || StockRecord::empty(record_id),
            )?;
            opened.insert((destination, product_id), record_id);
            opened_records.push((destination, product_id, record_id));
            record_id
        }
    };

    session.execute::<StockRecord>(
        record_id.0,
        aggregate_types::STOCK_RECORD,
        &StockRecordCommand::AddStock(AddStock {
            record_id,
            quantity: shortfall,
            note: format!("replenishment receipt for purchase order {po_id}"),
            occurred_at: now,
        }),
        || StockRecord::empty(record_id),
    )?;
    session.execute::<StockRecord>(
        record_id.0,
        aggregate_types::STOCK_RECORD,
        &StockRecordCommand::RemoveStock(RemoveStock {
            record_id,
            quantity: shortfall,
            note: format!("reservation for sales order {order_id}"),
            occurred_at: now,
        }),
        || StockRecord::empty(record_id),
    )?;

    Ok(po_id)
}
