//! Multi-stream unit of work.
//!
//! A `Session` stages command execution across any number of aggregate
//! streams and commits them in one atomic `append_many` call. Each stream's
//! history is snapshotted on first touch; the version observed then is the
//! version the commit insists on, so a concurrent writer on any touched
//! stream fails the whole unit of work with `AppError::Concurrency` and
//! nothing is persisted.

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use stockflow_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};

use crate::error::AppError;
use crate::event_store::{EventStore, StoredEvent, StreamAppend, UncommittedEvent};

/// Names for the stream types this application writes.
pub mod aggregate_types {
    pub const PRODUCT: &str = "catalog.product";
    pub const WAREHOUSE: &str = "catalog.warehouse";
    pub const SUPPLIER: &str = "catalog.supplier";
    pub const STOCK_RECORD: &str = "ledger.record";
    pub const SALES_ORDER: &str = "sales.order";
    pub const PURCHASE_ORDER: &str = "purchasing.order";
}

struct StagedStream {
    aggregate_id: AggregateId,
    aggregate_type: String,
    base_version: u64,
    history: Vec<StoredEvent>,
    staged: Vec<UncommittedEvent>,
}

/// One unit of work against the event store.
pub struct Session<'a, S: EventStore> {
    store: &'a S,
    streams: Vec<StagedStream>,
}

impl<'a, S: EventStore> Session<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            streams: Vec::new(),
        }
    }

    /// Rehydrate an aggregate from its history plus any events already
    /// staged in this session.
    pub fn load<A>(
        &mut self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        make_aggregate: impl FnOnce() -> A,
    ) -> Result<A, AppError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stockflow_events::Event + Serialize + DeserializeOwned,
    {
        let idx = self.touch(aggregate_id, aggregate_type)?;
        let stream = &self.streams[idx];

        let mut aggregate = make_aggregate();
        for stored in &stream.history {
            let ev: A::Event = serde_json::from_value(stored.payload.clone())
                .map_err(|e| AppError::Deserialize(e.to_string()))?;
            aggregate.apply(&ev);
        }
        for uncommitted in &stream.staged {
            let ev: A::Event = serde_json::from_value(uncommitted.payload.clone())
                .map_err(|e| AppError::Deserialize(e.to_string()))?;
            aggregate.apply(&ev);
        }

        Ok(aggregate)
    }

    /// Execute a command: rehydrate, decide, stage the decided events.
    ///
    /// Returns the aggregate with the new events applied, so callers can
    /// chain decisions against up-to-date state.
    pub fn execute<A>(
        &mut self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce() -> A,
    ) -> Result<A, AppError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stockflow_events::Event + Serialize + DeserializeOwned,
    {
        let mut aggregate = self.load(aggregate_id, aggregate_type, make_aggregate)?;

        let decided = aggregate.handle(command).map_err(AppError::from)?;
        for ev in &decided {
            aggregate.apply(ev);
        }

        let idx = self.touch(aggregate_id, aggregate_type)?;
        for ev in &decided {
            let uncommitted = UncommittedEvent::from_typed(
                aggregate_id,
                aggregate_type,
                Uuid::now_v7(),
                ev,
            )?;
            self.streams[idx].staged.push(uncommitted);
        }

        Ok(aggregate)
    }

    /// Commit every staged stream atomically.
    pub fn commit(self) -> Result<Vec<StoredEvent>, AppError> {
        let batches: Vec<StreamAppend> = self
            .streams
            .into_iter()
            .filter(|s| !s.staged.is_empty())
            .map(|s| StreamAppend {
                expected_version: ExpectedVersion::Exact(s.base_version),
                events: s.staged,
            })
            .collect();

        if batches.is_empty() {
            return Ok(vec![]);
        }

        Ok(self.store.append_many(batches)?)
    }

    /// True if nothing has been staged yet.
    pub fn is_empty(&self) -> bool {
        self.streams.iter().all(|s| s.staged.is_empty())
    }

    fn touch(&mut self, aggregate_id: AggregateId, aggregate_type: &str) -> Result<usize, AppError> {
        if let Some(idx) = self
            .streams
            .iter()
            .position(|s| s.aggregate_id == aggregate_id)
        {
            if self.streams[idx].aggregate_type != aggregate_type {
                return Err(AppError::InvariantViolation(format!(
                    "stream {aggregate_id} touched as '{}' and '{}'",
                    self.streams[idx].aggregate_type, aggregate_type
                )));
            }
            return Ok(idx);
        }

        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let base_version = history.last().map(|e| e.sequence_number).unwrap_or(0);

        self.streams.push(StagedStream {
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            base_version,
            history,
            staged: Vec::new(),
        });
        Ok(self.streams.len() - 1)
    }
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), AppError> {
    // Guard against a buggy backend: wrong stream or broken ordering.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(AppError::InvariantViolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(AppError::InvariantViolation(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}
