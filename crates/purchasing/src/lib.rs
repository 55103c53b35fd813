//! Purchase orders: the supply side, including the synthetic orders raised
//! by the replenishment trigger.

pub mod order;

pub use order::{
    AddPurchaseLine, ApproveOrder, CancelPurchaseOrder, CreatePurchaseOrder, GoodsReceived,
    OrderApproved, PurchaseLine, PurchaseLineAdded, PurchaseOrder, PurchaseOrderCanceled,
    PurchaseOrderCommand, PurchaseOrderCreated, PurchaseOrderEvent, PurchaseOrderId,
    PurchaseOrderStatus, ReceiveGoods,
};
