//! The `App` facade: the boundary an HTTP or CLI layer would call.
//!
//! Every operation runs as one unit of work against the event store and, on
//! success, folds the outcome into the `Directory`. Confirmation retries a
//! bounded number of times when it loses an optimistic-concurrency race.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use stockflow_catalog::{
    ActivateProduct, ActivateWarehouse, DeactivateProduct, DeactivateSupplier, DeactivateWarehouse,
    Product, ProductCommand, ProductId, RegisterProduct, RegisterSupplier, RegisterWarehouse,
    Supplier, SupplierCommand, SupplierId, Warehouse, WarehouseCommand, WarehouseId,
};
use stockflow_core::{AggregateId, UserId};
use stockflow_events::EventEnvelope;
use stockflow_ledger::{
    AddStock, CloseRecord, Movement, OpenRecord, ReleaseStock, RemoveStock, ReserveStock,
    StockRecord, StockRecordCommand, StockRecordId,
};
use stockflow_purchasing::{
    AddPurchaseLine, ApproveOrder, CancelPurchaseOrder, CreatePurchaseOrder, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderId, ReceiveGoods,
};
use stockflow_sales::{
    AddLine, CancelOrder, CreateSalesOrder, DeliverOrder, SalesOrder, SalesOrderCommand,
    SalesOrderId, SalesOrderStatus, ShipOrder,
};

use crate::engine::{self, AllocationReport};
use crate::error::AppError;
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::read_model::Directory;
use crate::session::{Session, aggregate_types};

/// How many times a confirmation re-runs after losing a concurrency race.
const CONFIRM_ATTEMPTS: usize = 3;

/// Application facade over the event store and the directory index.
pub struct App<S: EventStore = InMemoryEventStore> {
    store: Arc<S>,
    directory: Arc<RwLock<Directory>>,
}

impl<S: EventStore> Clone for App<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            directory: Arc::clone(&self.directory),
        }
    }
}

impl App<InMemoryEventStore> {
    pub fn in_memory() -> Self {
        Self::new(InMemoryEventStore::new())
    }
}

impl<S: EventStore> App<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            directory: Arc::new(RwLock::new(Directory::new())),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn directory_read(&self) -> Result<RwLockReadGuard<'_, Directory>, AppError> {
        self.directory
            .read()
            .map_err(|_| AppError::InvariantViolation("directory lock poisoned".to_string()))
    }

    fn directory_write(&self) -> Result<RwLockWriteGuard<'_, Directory>, AppError> {
        self.directory
            .write()
            .map_err(|_| AppError::InvariantViolation("directory lock poisoned".to_string()))
    }

    // --- catalog ---

    pub fn register_product(&self, sku: &str, name: &str) -> Result<ProductId, AppError> {
        if self.directory_read()?.sku_taken(sku) {
            return Err(AppError::Conflict(format!("sku '{sku}' already registered")));
        }

        let product_id = ProductId::new(AggregateId::new());
        let mut session = Session::new(&*self.store);
        session.execute::<Product>(
            product_id.0,
            aggregate_types::PRODUCT,
            &ProductCommand::RegisterProduct(RegisterProduct {
                product_id,
                sku: sku.to_string(),
                name: name.to_string(),
                occurred_at: Utc::now(),
            }),
            || Product::empty(product_id),
        )?;
        session.commit()?;

        self.directory_write()?
            .insert_product(product_id, sku.to_string());
        info!(%product_id, sku, "product registered");
        Ok(product_id)
    }

    /// Deactivate a product. Blocked while any stock record holds a
    /// reservation for it or an order referencing it is mid-fulfillment.
    pub fn deactivate_product(&self, product_id: ProductId) -> Result<(), AppError> {
        {
            let directory = self.directory_read()?;
            if !directory.product_known(product_id) {
                return Err(AppError::NotFound("product".to_string()));
            }
            if directory.has_open_demand(product_id) {
                return Err(AppError::InvalidState(
                    "product is referenced by an order in fulfillment".to_string(),
                ));
            }
            for (_, record_id) in directory.records_for_product(product_id) {
                if self.load_record(record_id)?.reserved() > 0 {
                    return Err(AppError::InvalidState(
                        "product has reserved stock".to_string(),
                    ));
                }
            }
        }

        let mut session = Session::new(&*self.store);
        session.execute::<Product>(
            product_id.0,
            aggregate_types::PRODUCT,
            &ProductCommand::DeactivateProduct(DeactivateProduct {
                product_id,
                occurred_at: Utc::now(),
            }),
            || Product::empty(product_id),
        )?;
        session.commit()?;

        self.directory_write()?.set_product_active(product_id, false);
        Ok(())
    }

    pub fn activate_product(&self, product_id: ProductId) -> Result<(), AppError> {
        let mut session = Session::new(&*self.store);
        session.execute::<Product>(
            product_id.0,
            aggregate_types::PRODUCT,
            &ProductCommand::ActivateProduct(ActivateProduct {
                product_id,
                occurred_at: Utc::now(),
            }),
            || Product::empty(product_id),
        )?;
        session.commit()?;

        self.directory_write()?.set_product_active(product_id, true);
        Ok(())
    }

    pub fn register_warehouse(&self, name: &str) -> Result<WarehouseId, AppError> {
        let warehouse_id = WarehouseId::new(AggregateId::new());
        let mut session = Session::new(&*self.store);
        session.execute::<Warehouse>(
            warehouse_id.0,
            aggregate_types::WAREHOUSE,
            &WarehouseCommand::RegisterWarehouse(RegisterWarehouse {
                warehouse_id,
                name: name.to_string(),
                occurred_at: Utc::now(),
            }),
            || Warehouse::empty(warehouse_id),
        )?;
        session.commit()?;

        self.directory_write()?.insert_warehouse(warehouse_id);
        info!(%warehouse_id, name, "warehouse registered");
        Ok(warehouse_id)
    }

    pub fn deactivate_warehouse(&self, warehouse_id: WarehouseId) -> Result<(), AppError> {
        let mut session = Session::new(&*self.store);
        session.execute::<Warehouse>(
            warehouse_id.0,
            aggregate_types::WAREHOUSE,
            &WarehouseCommand::DeactivateWarehouse(DeactivateWarehouse {
                warehouse_id,
                occurred_at: Utc::now(),
            }),
            || Warehouse::empty(warehouse_id),
        )?;
        session.commit()?;

        self.directory_write()?
            .set_warehouse_active(warehouse_id, false);
        Ok(())
    }

    pub fn activate_warehouse(&self, warehouse_id: WarehouseId) -> Result<(), AppError> {
        let mut session = Session::new(&*self.store);
        session.execute::<Warehouse>(
            warehouse_id.0,
            aggregate_types::WAREHOUSE,
            &WarehouseCommand::ActivateWarehouse(ActivateWarehouse {
                warehouse_id,
                occurred_at: Utc::now(),
            }),
            || Warehouse::empty(warehouse_id),
        )?;
        session.commit()?;

        self.directory_write()?
            .set_warehouse_active(warehouse_id, true);
        Ok(())
    }

    pub fn register_supplier(&self, name: &str) -> Result<SupplierId, AppError> {
        let supplier_id = SupplierId::new(AggregateId::new());
        let mut session = Session::new(&*self.store);
        session.execute::<Supplier>(
            supplier_id.0,
            aggregate_types::SUPPLIER,
            &SupplierCommand::RegisterSupplier(RegisterSupplier {
                supplier_id,
                name: name.to_string(),
                occurred_at: Utc::now(),
            }),
            || Supplier::empty(supplier_id),
        )?;
        session.commit()?;

        self.directory_write()?.insert_supplier(supplier_id);
        Ok(supplier_id)
    }

    pub fn deactivate_supplier(&self, supplier_id: SupplierId) -> Result<(), AppError> {
        let mut session = Session::new(&*self.store);
        session.execute::<Supplier>(
            supplier_id.0,
            aggregate_types::SUPPLIER,
            &SupplierCommand::DeactivateSupplier(DeactivateSupplier {
                supplier_id,
                occurred_at: Utc::now(),
            }),
            || Supplier::empty(supplier_id),
        )?;
        session.commit()?;

        self.directory_write()?.set_supplier_active(supplier_id, false);
        Ok(())
    }

    // --- inventory ledger ---

    /// Open a stock record for a (warehouse, product) pair.
    pub fn open_record(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        initial_on_hand: i64,
    ) -> Result<StockRecordId, AppError> {
        {
            let directory = self.directory_read()?;
            if !directory.warehouse_known(warehouse_id) {
                return Err(AppError::NotFound("warehouse".to_string()));
            }
            if !directory.warehouse_active(warehouse_id) {
                return Err(AppError::InvalidState("warehouse is inactive".to_string()));
            }
            if !directory.product_known(product_id) {
                return Err(AppError::NotFound("product".to_string()));
            }
            if directory.record_for(warehouse_id, product_id).is_some() {
                return Err(AppError::Conflict(
                    "stock record already exists for this warehouse and product".to_string(),
                ));
            }
        }

        let record_id = StockRecordId::new(AggregateId::new());
        let mut session = Session::new(&*self.store);
        session.execute::<StockRecord>(
            record_id.0,
            aggregate_types::STOCK_RECORD,
            &StockRecordCommand::OpenRecord(OpenRecord {
                record_id,
                warehouse_id,
                product_id,
                initial_on_hand,
                occurred_at: Utc::now(),
            }),
            || StockRecord::empty(record_id),
        )?;
        session.commit()?;

        self.directory_write()?
            .insert_record(warehouse_id, product_id, record_id);
        Ok(record_id)
    }

    pub fn add_stock(
        &self,
        record_id: StockRecordId,
        quantity: i64,
        note: &str,
    ) -> Result<(), AppError> {
        self.mutate_record(
            record_id,
            StockRecordCommand::AddStock(AddStock {
                record_id,
                quantity,
                note: note.to_string(),
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn remove_stock(
        &self,
        record_id: StockRecordId,
        quantity: i64,
        note: &str,
    ) -> Result<(), AppError> {
        self.mutate_record(
            record_id,
            StockRecordCommand::RemoveStock(RemoveStock {
                record_id,
                quantity,
                note: note.to_string(),
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn reserve_stock(&self, record_id: StockRecordId, quantity: i64) -> Result<(), AppError> {
        self.mutate_record(
            record_id,
            StockRecordCommand::ReserveStock(ReserveStock {
                record_id,
                quantity,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn release_stock(&self, record_id: StockRecordId, quantity: i64) -> Result<(), AppError> {
        self.mutate_record(
            record_id,
            StockRecordCommand::ReleaseStock(ReleaseStock {
                record_id,
                quantity,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn close_record(&self, record_id: StockRecordId) -> Result<(), AppError> {
        self.mutate_record(
            record_id,
            StockRecordCommand::CloseRecord(CloseRecord {
                record_id,
                occurred_at: Utc::now(),
            }),
        )?;
        self.directory_write()?.remove_record(record_id);
        Ok(())
    }

    fn mutate_record(
        &self,
        record_id: StockRecordId,
        command: StockRecordCommand,
    ) -> Result<(), AppError> {
        {
            let directory = self.directory_read()?;
            let (warehouse_id, _) = directory
                .record_key(record_id)
                .ok_or_else(|| AppError::NotFound("stock record".to_string()))?;
            if !directory.warehouse_active(warehouse_id) {
                return Err(AppError::InvalidState("warehouse is inactive".to_string()));
            }
        }

        let mut session = Session::new(&*self.store);
        session.execute::<StockRecord>(
            record_id.0,
            aggregate_types::STOCK_RECORD,
            &command,
            || StockRecord::empty(record_id),
        )?;
        session.commit()?;
        Ok(())
    }

    pub fn record_for(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<Option<StockRecordId>, AppError> {
        Ok(self.directory_read()?.record_for(warehouse_id, product_id))
    }

    /// Available quantity at one warehouse; zero when no record exists.
    pub fn available_for(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<i64, AppError> {
        let record_id = match self.directory_read()?.record_for(warehouse_id, product_id) {
            Some(record_id) => record_id,
            None => return Ok(0),
        };
        Ok(self.load_record(record_id)?.available())
    }

    /// Total availability over active warehouses, each clamped at zero.
    pub fn available_across_warehouses(&self, product_id: ProductId) -> Result<i64, AppError> {
        let records: Vec<StockRecordId> = {
            let directory = self.directory_read()?;
            directory
                .records_for_product(product_id)
                .filter(|(warehouse_id, _)| directory.warehouse_active(*warehouse_id))
                .map(|(_, record_id)| record_id)
                .collect()
        };

        let mut total = 0i64;
        for record_id in records {
            total += self.load_record(record_id)?.available().max(0);
        }
        Ok(total)
    }

    /// Ordered movement log for a record.
    pub fn movements(&self, record_id: StockRecordId) -> Result<Vec<Movement>, AppError> {
        Ok(self.load_record(record_id)?.movements().to_vec())
    }

    /// Raw audit trail for any aggregate stream.
    pub fn event_log(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope<JsonValue>>, AppError> {
        let stream = self.store.load_stream(aggregate_id)?;
        Ok(stream.iter().map(|e| e.to_envelope()).collect())
    }

    fn load_record(&self, record_id: StockRecordId) -> Result<StockRecord, AppError> {
        let mut session = Session::new(&*self.store);
        let record: StockRecord = session.load(record_id.0, aggregate_types::STOCK_RECORD, || {
            StockRecord::empty(record_id)
        })?;
        if !record.exists() {
            return Err(AppError::NotFound("stock record".to_string()));
        }
        Ok(record)
    }

    // --- sales orders ---

    /// Create a sales order with its lines in submission order.
    pub fn create_sales_order(
        &self,
        client_id: UserId,
        warehouse_id: WarehouseId,
        lines: &[(ProductId, i64, u64)],
    ) -> Result<SalesOrderId, AppError> {
        {
            let directory = self.directory_read()?;
            if !directory.warehouse_known(warehouse_id) {
                return Err(AppError::NotFound("warehouse".to_string()));
            }
            if !directory.warehouse_active(warehouse_id) {
                return Err(AppError::InvalidState("warehouse is inactive".to_string()));
            }
            for (product_id, _, _) in lines {
                if !directory.product_known(*product_id) {
                    return Err(AppError::NotFound("product".to_string()));
                }
                if !directory.product_active(*product_id) {
                    return Err(AppError::InvalidState("product is inactive".to_string()));
                }
            }
        }

        let order_id = SalesOrderId::new(AggregateId::new());
        let now = Utc::now();
        let mut session = Session::new(&*self.store);
        session.execute::<SalesOrder>(
            order_id.0,
            aggregate_types::SALES_ORDER,
            &SalesOrderCommand::CreateSalesOrder(CreateSalesOrder {
                order_id,
                client_id,
                warehouse_id,
                occurred_at: now,
            }),
            || SalesOrder::empty(order_id),
        )?;
        for (product_id, qty_ordered, unit_price) in lines {
            session.execute::<SalesOrder>(
                order_id.0,
                aggregate_types::SALES_ORDER,
                &SalesOrderCommand::AddLine(AddLine {
                    order_id,
                    product_id: *product_id,
                    qty_ordered: *qty_ordered,
                    unit_price: *unit_price,
                    occurred_at: now,
                }),
                || SalesOrder::empty(order_id),
            )?;
        }
        session.commit()?;

        self.directory_write()?
            .insert_order(order_id, lines.iter().map(|(p, _, _)| *p).collect());
        Ok(order_id)
    }

    /// Confirm an order: allocate every line, then mark it reserved.
    ///
    /// Runs as one atomic unit of work. On an optimistic-concurrency loss the
    /// whole allocation re-runs against the fresh ledger, a bounded number of
    /// times.
    pub fn confirm_sales_order(&self, order_id: SalesOrderId) -> Result<AllocationReport, AppError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_confirm(order_id) {
                Ok(report) => {
                    info!(
                        %order_id,
                        lines = report.lines.len(),
                        replenishments = report.purchase_orders.len(),
                        "sales order confirmed"
                    );
                    return Ok(report);
                }
                Err(AppError::Concurrency(msg)) if attempt < CONFIRM_ATTEMPTS => {
                    warn!(%order_id, attempt, %msg, "confirmation lost a concurrency race, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn try_confirm(&self, order_id: SalesOrderId) -> Result<AllocationReport, AppError> {
        let now = Utc::now();
        let mut session = Session::new(&*self.store);

        let order: SalesOrder = session.load(order_id.0, aggregate_types::SALES_ORDER, || {
            SalesOrder::empty(order_id)
        })?;
        if !order.exists() {
            return Err(AppError::NotFound("sales order".to_string()));
        }
        if order.status() != SalesOrderStatus::Created {
            return Err(AppError::InvalidState(format!(
                "only created orders can be confirmed, status is {:?}",
                order.status()
            )));
        }

        let report = {
            let directory = self.directory_read()?;
            let home = order.warehouse_id().ok_or_else(|| {
                AppError::InvariantViolation("order has no home warehouse".to_string())
            })?;
            if !directory.warehouse_active(home) {
                return Err(AppError::InvalidState("warehouse is inactive".to_string()));
            }
            engine::allocate_order(&mut session, &directory, &order, now)?
        };

        session.commit()?;

        let mut directory = self.directory_write()?;
        directory.set_order_status(order_id, SalesOrderStatus::Reserved);
        for (warehouse_id, product_id, record_id) in &report.opened_records {
            directory.insert_record(*warehouse_id, *product_id, *record_id);
        }
        Ok(report)
    }

    pub fn cancel_sales_order(&self, order_id: SalesOrderId) -> Result<(), AppError> {
        self.transition_order(
            order_id,
            SalesOrderCommand::CancelOrder(CancelOrder {
                order_id,
                occurred_at: Utc::now(),
            }),
            SalesOrderStatus::Canceled,
        )
    }

    pub fn ship_sales_order(&self, order_id: SalesOrderId) -> Result<(), AppError> {
        self.transition_order(
            order_id,
            SalesOrderCommand::ShipOrder(ShipOrder {
                order_id,
                occurred_at: Utc::now(),
            }),
            SalesOrderStatus::Shipped,
        )
    }

    pub fn deliver_sales_order(&self, order_id: SalesOrderId) -> Result<(), AppError> {
        self.transition_order(
            order_id,
            SalesOrderCommand::DeliverOrder(DeliverOrder {
                order_id,
                occurred_at: Utc::now(),
            }),
            SalesOrderStatus::Delivered,
        )
    }

    pub fn sales_order(&self, order_id: SalesOrderId) -> Result<SalesOrder, AppError> {
        let mut session = Session::new(&*self.store);
        let order: SalesOrder = session.load(order_id.0, aggregate_types::SALES_ORDER, || {
            SalesOrder::empty(order_id)
        })?;
        if !order.exists() {
            return Err(AppError::NotFound("sales order".to_string()));
        }
        Ok(order)
    }

    fn transition_order(
        &self,
        order_id: SalesOrderId,
        command: SalesOrderCommand,
        resulting: SalesOrderStatus,
    ) -> Result<(), AppError> {
        let mut session = Session::new(&*self.store);
        session.execute::<SalesOrder>(
            order_id.0,
            aggregate_types::SALES_ORDER,
            &command,
            || SalesOrder::empty(order_id),
        )?;
        session.commit()?;

        self.directory_write()?.set_order_status(order_id, resulting);
        Ok(())
    }

    // --- purchase orders ---

    pub fn create_purchase_order(
        &self,
        supplier_id: SupplierId,
        lines: &[(ProductId, i64, u64)],
    ) -> Result<PurchaseOrderId, AppError> {
        {
            let directory = self.directory_read()?;
            if !directory.supplier_known(supplier_id) {
                return Err(AppError::NotFound("supplier".to_string()));
            }
            if !directory.supplier_active(supplier_id) {
                return Err(AppError::InvalidState("supplier is inactive".to_string()));
            }
            for (product_id, _, _) in lines {
                if !directory.product_known(*product_id) {
                    return Err(AppError::NotFound("product".to_string()));
                }
            }
        }

        let order_id = PurchaseOrderId::new(AggregateId::new());
        let now = Utc::now();
        let mut session = Session::new(&*self.store);
        session.execute::<PurchaseOrder>(
            order_id.0,
            aggregate_types::PURCHASE_ORDER,
            &PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                order_id,
                supplier_id,
                occurred_at: now,
            }),
            || PurchaseOrder::empty(order_id),
        )?;
        for (product_id, quantity_ordered, unit_price) in lines {
            session.execute::<PurchaseOrder>(
                order_id.0,
                aggregate_types::PURCHASE_ORDER,
                &PurchaseOrderCommand::AddPurchaseLine(AddPurchaseLine {
                    order_id,
                    product_id: *product_id,
                    quantity_ordered: *quantity_ordered,
                    unit_price: *unit_price,
                    occurred_at: now,
                }),
                || PurchaseOrder::empty(order_id),
            )?;
        }
        session.commit()?;
        Ok(order_id)
    }

    pub fn approve_purchase_order(&self, order_id: PurchaseOrderId) -> Result<(), AppError> {
        let mut session = Session::new(&*self.store);
        session.execute::<PurchaseOrder>(
            order_id.0,
            aggregate_types::PURCHASE_ORDER,
            &PurchaseOrderCommand::ApproveOrder(ApproveOrder {
                order_id,
                occurred_at: Utc::now(),
            }),
            || PurchaseOrder::empty(order_id),
        )?;
        session.commit()?;
        Ok(())
    }

    /// Receive an approved purchase order into a warehouse: every line is
    /// received in full, creating stock records for missing pairs.
    pub fn receive_purchase_order(
        &self,
        order_id: PurchaseOrderId,
        warehouse_id: WarehouseId,
    ) -> Result<(), AppError> {
        {
            let directory = self.directory_read()?;
            if !directory.warehouse_known(warehouse_id) {
                return Err(AppError::NotFound("warehouse".to_string()));
            }
            if !directory.warehouse_active(warehouse_id) {
                return Err(AppError::InvalidState("warehouse is inactive".to_string()));
            }
        }

        let now = Utc::now();
        let mut session = Session::new(&*self.store);
        let order = session.execute::<PurchaseOrder>(
            order_id.0,
            aggregate_types::PURCHASE_ORDER,
            &PurchaseOrderCommand::ReceiveGoods(ReceiveGoods {
                order_id,
                warehouse_id,
                occurred_at: now,
            }),
            || PurchaseOrder::empty(order_id),
        )?;

        let mut opened = Vec::new();
        for line in order.lines() {
            let existing = self
                .directory_read()?
                .record_for(warehouse_id, line.product_id)
                .or_else(|| {
                    opened
                        .iter()
                        .find(|(p, _)| *p == line.product_id)
                        .map(|(_, r)| *r)
                });
            let record_id = match existing {
                Some(record_id) => record_id,
                None => {
                    let record_id = StockRecordId::new(AggregateId::new());
                    session.execute::<StockRecord>(
                        record_id.0,
                        aggregate_types::STOCK_RECORD,
                        &StockRecordCommand::OpenRecord(OpenRecord {
                            record_id,
                            warehouse_id,
                            product_id: line.product_id,
                            initial_on_hand: 0,
                            occurred_at: now,
                        }),
                        || StockRecord::empty(record_id),
                    )?;
                    opened.push((line.product_id, record_id));
                    record_id
                }
            };

            session.execute::<StockRecord>(
                record_id.0,
                aggregate_types::STOCK_RECORD,
                &StockRecordCommand::AddStock(AddStock {
                    record_id,
                    quantity: line.quantity_ordered,
                    note: format!("receipt for purchase order {order_id}"),
                    occurred_at: now,
                }),
                || StockRecord::empty(record_id),
            )?;
        }
        session.commit()?;

        let mut directory = self.directory_write()?;
        for (product_id, record_id) in opened {
            directory.insert_record(warehouse_id, product_id, record_id);
        }
        info!(%order_id, %warehouse_id, "purchase order received");
        Ok(())
    }

    pub fn cancel_purchase_order(&self, order_id: PurchaseOrderId) -> Result<(), AppError> {
        let mut session = Session::new(&*self.store);
        session.execute::<PurchaseOrder>(
            order_id.0,
            aggregate_types::PURCHASE_ORDER,
            &PurchaseOrderCommand::CancelPurchaseOrder(CancelPurchaseOrder {
                order_id,
                occurred_at: Utc::now(),
            }),
            || PurchaseOrder::empty(order_id),
        )?;
        session.commit()?;
        Ok(())
    }

    pub fn purchase_order(&self, order_id: PurchaseOrderId) -> Result<PurchaseOrder, AppError> {
        let mut session = Session::new(&*self.store);
        let order: PurchaseOrder = session.load(order_id.0, aggregate_types::PURCHASE_ORDER, || {
            PurchaseOrder::empty(order_id)
        })?;
        if !order.exists() {
            return Err(AppError::NotFound("purchase order".to_string()));
        }
        Ok(order)
    }
}
