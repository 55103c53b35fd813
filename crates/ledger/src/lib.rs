//! Inventory ledger: one `StockRecord` aggregate per (warehouse, product)
//! pair. The record's event stream is the immutable movement log; `on_hand`
//! and `reserved` are folds over it.

pub mod record;

pub use record::{
    AddStock, CloseRecord, Movement, MovementKind, OpenRecord, RecordClosed, RecordOpened,
    ReleaseStock, RemoveStock, ReserveStock, StockIssued, StockReceived, StockRecord,
    StockRecordCommand, StockRecordEvent, StockRecordId, StockReleased, StockReserved,
};
