//! Catalog and inventory index.
//!
//! The `Directory` answers the cross-aggregate questions the aggregates
//! themselves cannot: which SKUs are taken, which warehouses hold a product,
//! which supplier replenishment should source from, which orders still
//! reference a product. The `App` keeps it in step with committed events.

use std::collections::{BTreeMap, HashMap};

use stockflow_catalog::{ProductId, SupplierId, WarehouseId};
use stockflow_ledger::StockRecordId;
use stockflow_sales::{SalesOrderId, SalesOrderStatus};

#[derive(Debug, Clone)]
struct ProductEntry {
    sku: String,
    active: bool,
}

/// In-memory index over the catalog, the ledger and open sales orders.
#[derive(Debug, Default)]
pub struct Directory {
    products: HashMap<ProductId, ProductEntry>,
    skus: HashMap<String, ProductId>,
    warehouses: BTreeMap<WarehouseId, bool>,
    suppliers: BTreeMap<SupplierId, bool>,

    records: HashMap<(WarehouseId, ProductId), StockRecordId>,
    by_product: HashMap<ProductId, BTreeMap<WarehouseId, StockRecordId>>,
    record_keys: HashMap<StockRecordId, (WarehouseId, ProductId)>,

    order_status: HashMap<SalesOrderId, SalesOrderStatus>,
    order_products: HashMap<SalesOrderId, Vec<ProductId>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    // --- products ---

    pub fn insert_product(&mut self, product_id: ProductId, sku: String) {
        self.skus.insert(sku.clone(), product_id);
        self.products.insert(product_id, ProductEntry { sku, active: true });
    }

    pub fn set_product_active(&mut self, product_id: ProductId, active: bool) {
        if let Some(entry) = self.products.get_mut(&product_id) {
            entry.active = active;
        }
    }

    pub fn product_known(&self, product_id: ProductId) -> bool {
        self.products.contains_key(&product_id)
    }

    pub fn product_active(&self, product_id: ProductId) -> bool {
        self.products.get(&product_id).is_some_and(|e| e.active)
    }

    pub fn sku_taken(&self, sku: &str) -> bool {
        self.skus.contains_key(sku)
    }

    // --- warehouses ---

    pub fn insert_warehouse(&mut self, warehouse_id: WarehouseId) {
        self.warehouses.insert(warehouse_id, true);
    }

    pub fn set_warehouse_active(&mut self, warehouse_id: WarehouseId, active: bool) {
        if let Some(entry) = self.warehouses.get_mut(&warehouse_id) {
            *entry = active;
        }
    }

    pub fn warehouse_known(&self, warehouse_id: WarehouseId) -> bool {
        self.warehouses.contains_key(&warehouse_id)
    }

    pub fn warehouse_active(&self, warehouse_id: WarehouseId) -> bool {
        self.warehouses.get(&warehouse_id).copied().unwrap_or(false)
    }

    // --- suppliers ---

    pub fn insert_supplier(&mut self, supplier_id: SupplierId) {
        self.suppliers.insert(supplier_id, true);
    }

    pub fn set_supplier_active(&mut self, supplier_id: SupplierId, active: bool) {
        if let Some(entry) = self.suppliers.get_mut(&supplier_id) {
            *entry = active;
        }
    }

    pub fn supplier_known(&self, supplier_id: SupplierId) -> bool {
        self.suppliers.contains_key(&supplier_id)
    }

    pub fn supplier_active(&self, supplier_id: SupplierId) -> bool {
        self.suppliers.get(&supplier_id).copied().unwrap_or(false)
    }

    /// First active supplier in ascending id order.
    pub fn first_active_supplier(&self) -> Option<SupplierId> {
        self.suppliers
            .iter()
            .find(|(_, active)| **active)
            .map(|(id, _)| *id)
    }

    // --- stock records ---

    pub fn insert_record(
        &mut self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        record_id: StockRecordId,
    ) {
        self.records.insert((warehouse_id, product_id), record_id);
        self.by_product
            .entry(product_id)
            .or_default()
            .insert(warehouse_id, record_id);
        self.record_keys
            .insert(record_id, (warehouse_id, product_id));
    }

    /// Drop the pair mapping for a closed record. The reverse mapping stays
    /// so the movement log remains reachable; the pair may be reopened.
    pub fn remove_record(&mut self, record_id: StockRecordId) {
        if let Some((warehouse_id, product_id)) = self.record_keys.get(&record_id).copied() {
            self.records.remove(&(warehouse_id, product_id));
            if let Some(per_warehouse) = self.by_product.get_mut(&product_id) {
                per_warehouse.remove(&warehouse_id);
            }
        }
    }

    pub fn record_for(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Option<StockRecordId> {
        self.records.get(&(warehouse_id, product_id)).copied()
    }

    /// Records holding a product, in ascending warehouse id order.
    pub fn records_for_product(
        &self,
        product_id: ProductId,
    ) -> impl Iterator<Item = (WarehouseId, StockRecordId)> + '_ {
        self.by_product
            .get(&product_id)
            .into_iter()
            .flat_map(|m| m.iter().map(|(w, r)| (*w, *r)))
    }

    pub fn record_key(&self, record_id: StockRecordId) -> Option<(WarehouseId, ProductId)> {
        self.record_keys.get(&record_id).copied()
    }

    // --- sales orders ---

    pub fn insert_order(&mut self, order_id: SalesOrderId, products: Vec<ProductId>) {
        self.order_status.insert(order_id, SalesOrderStatus::Created);
        self.order_products.insert(order_id, products);
    }

    pub fn set_order_status(&mut self, order_id: SalesOrderId, status: SalesOrderStatus) {
        self.order_status.insert(order_id, status);
    }

    /// True when some order referencing the product sits in a state between
    /// confirmation and delivery. Such demand blocks product deactivation.
    pub fn has_open_demand(&self, product_id: ProductId) -> bool {
        self.order_products.iter().any(|(order_id, products)| {
            products.contains(&product_id)
                && matches!(
                    self.order_status.get(order_id),
                    Some(SalesOrderStatus::Reserved) | Some(SalesOrderStatus::Shipped)
                )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::AggregateId;
    use uuid::Uuid;

    fn warehouse(n: u128) -> WarehouseId {
        WarehouseId::new(AggregateId::from_uuid(Uuid::from_u128(n)))
    }

    #[test]
    fn records_for_product_iterates_in_ascending_warehouse_order() {
        let mut directory = Directory::new();
        let product = ProductId::new(AggregateId::new());

        for n in [3u128, 1, 2] {
            let wh = warehouse(n);
            directory.insert_warehouse(wh);
            directory.insert_record(wh, product, StockRecordId::new(AggregateId::new()));
        }

        let order: Vec<WarehouseId> = directory
            .records_for_product(product)
            .map(|(w, _)| w)
            .collect();
        assert_eq!(order, vec![warehouse(1), warehouse(2), warehouse(3)]);
    }

    #[test]
    fn first_active_supplier_skips_deactivated_ones() {
        let mut directory = Directory::new();
        let first = SupplierId::new(AggregateId::from_uuid(Uuid::from_u128(1)));
        let second = SupplierId::new(AggregateId::from_uuid(Uuid::from_u128(2)));
        directory.insert_supplier(first);
        directory.insert_supplier(second);

        assert_eq!(directory.first_active_supplier(), Some(first));

        directory.set_supplier_active(first, false);
        assert_eq!(directory.first_active_supplier(), Some(second));
    }

    #[test]
    fn open_demand_tracks_order_status() {
        let mut directory = Directory::new();
        let product = ProductId::new(AggregateId::new());
        let order = SalesOrderId::new(AggregateId::new());

        directory.insert_order(order, vec![product]);
        assert!(!directory.has_open_demand(product));

        directory.set_order_status(order, SalesOrderStatus::Reserved);
        assert!(directory.has_open_demand(product));

        directory.set_order_status(order, SalesOrderStatus::Delivered);
        assert!(!directory.has_open_demand(product));
    }
}
