//! Application layer: event store, unit of work, catalog/inventory index,
//! the allocation engine, and the `App` facade that ties them together.

pub mod app;
pub mod engine;
pub mod error;
pub mod event_store;
pub mod read_model;
pub mod session;


pub use app::App;
pub use engine::{AllocationReport, LineAllocation};
pub use error::AppError;
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, StreamAppend, UncommittedEvent};
pub use read_model::Directory;
pub use session::Session;
