//! Domain events: the `Event` trait and the persisted envelope shape.
//!
//! Events in this system are **facts**: append-only, immutable records of
//! what happened to an aggregate. The inventory movement log is literally the
//! event stream of a stock record, so this crate is the contract between the
//! domain crates and the store that persists their history.

pub mod envelope;
pub mod event;

pub use envelope::EventEnvelope;
pub use event::Event;
