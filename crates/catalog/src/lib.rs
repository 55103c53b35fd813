//! Catalog domain module: products, warehouses, suppliers.
//!
//! This crate contains business rules for the catalog entities that the
//! allocation engine consults, implemented purely as deterministic domain
//! logic (no IO, no HTTP, no storage).

pub mod product;
pub mod supplier;
pub mod warehouse;

pub use product::{
    ActivateProduct, DeactivateProduct, Product, ProductCommand, ProductEvent, ProductId,
    RegisterProduct,
};
pub use supplier::{
    DeactivateSupplier, RegisterSupplier, Supplier, SupplierCommand, SupplierEvent, SupplierId,
};
pub use warehouse::{
    ActivateWarehouse, DeactivateWarehouse, RegisterWarehouse, Warehouse, WarehouseCommand,
    WarehouseEvent, WarehouseId,
};
