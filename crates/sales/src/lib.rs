//! Sales orders: the demand side of the allocation engine.

pub mod order;

pub use order::{
    AddLine, CancelOrder, CreateSalesOrder, DeliverOrder, LineAdded, LineReservation,
    MarkReserved, OrderCanceled, OrderDelivered, OrderLine, OrderReserved, OrderShipped,
    SalesOrder, SalesOrderCommand, SalesOrderCreated, SalesOrderEvent, SalesOrderId,
    SalesOrderStatus, ShipOrder,
};
