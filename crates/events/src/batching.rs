//! Event batches: atomic units of intake and publication.
//!
//! A batch groups the events produced by one causal moment. `accept`
//! appends; `complete` hands the whole set to the log in one call, so the
//! log never observes a partially-flushed batch. Sub-batching splits an
//! oversized batch into fixed-size chunks, each forwarded as its own
//! complete unit, preserving overall order.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::event::Event;
use crate::logging::EventLog;
use crate::storage::EventStoreError;

pub trait EventBatch: Send {
    /// Time-ordered identifier of this batch.
    fn id(&self) -> Uuid;

    fn accept(&mut self, event: Event) -> Result<(), EventStoreError>;

    /// Flush everything accepted so far and close the batch.
    fn complete(self: Box<Self>) -> Result<(), EventStoreError>;
}

/// Buffers every accepted event and applies them to the log as one call
/// on completion.
pub struct BufferingEventBatch {
    id: Uuid,
    events: Vec<Event>,
    log: Arc<dyn EventLog>,
}

impl BufferingEventBatch {
    pub fn draining_to(id: Uuid, log: Arc<dyn EventLog>) -> Self {
        Self {
            id,
            events: Vec::new(),
            log,
        }
    }
}

impl EventBatch for BufferingEventBatch {
    fn id(&self) -> Uuid {
        self.id
    }

    fn accept(&mut self, event: Event) -> Result<(), EventStoreError> {
        self.events.push(event);
        Ok(())
    }

    fn complete(self: Box<Self>) -> Result<(), EventStoreError> {
        if self.events.is_empty() {
            return Ok(());
        }
        self.log.apply(self.events)?;
        Ok(())
    }
}

/// Forwards accepted events to the log in fixed-size chunks, flushing
/// eagerly whenever a chunk fills and flushing the remainder on
/// completion.
pub struct SubBatchingEventBatch {
    id: Uuid,
    size: usize,
    chunk: Vec<Event>,
    log: Arc<dyn EventLog>,
}

impl SubBatchingEventBatch {
    pub fn chunking_to(id: Uuid, size: usize, log: Arc<dyn EventLog>) -> Self {
        assert!(size > 0, "sub-batch size must be at least 1");
        Self {
            id,
            size,
            chunk: Vec::with_capacity(size),
            log,
        }
    }

    fn flush(&mut self) -> Result<(), EventStoreError> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        let chunk = core::mem::replace(&mut self.chunk, Vec::with_capacity(self.size));
        debug!(batch = %self.id, count = chunk.len(), "sub-batch flushed");
        self.log.apply(chunk)?;
        Ok(())
    }
}

impl EventBatch for SubBatchingEventBatch {
    fn id(&self) -> Uuid {
        self.id
    }

    fn accept(&mut self, event: Event) -> Result<(), EventStoreError> {
        self.chunk.push(event);
        if self.chunk.len() == self.size {
            self.flush()?;
        }
        Ok(())
    }

    fn complete(mut self: Box<Self>) -> Result<(), EventStoreError> {
        self.flush()
    }
}

/// Wraps a batch to observe or alter its accepts and completion.
pub trait EventBatchFilter: Send + Sync {
    fn wrap(&self, batch: Box<dyn EventBatch>) -> Box<dyn EventBatch>;
}

/// Emits tracing events for every accept and for completion.
pub struct TracingEventBatch {
    inner: Box<dyn EventBatch>,
}

impl TracingEventBatch {
    pub fn around(inner: Box<dyn EventBatch>) -> Self {
        Self { inner }
    }
}

impl EventBatch for TracingEventBatch {
    fn id(&self) -> Uuid {
        self.inner.id()
    }

    fn accept(&mut self, event: Event) -> Result<(), EventStoreError> {
        debug!(batch = %self.inner.id(), event = %event.identity(), "event accepted");
        self.inner.accept(event)
    }

    fn complete(self: Box<Self>) -> Result<(), EventStoreError> {
        debug!(batch = %self.inner.id(), "batch completing");
        self.inner.complete()
    }
}

/// A filter installing [`TracingEventBatch`] around every batch.
pub struct TracingBatchFilter;

impl EventBatchFilter for TracingBatchFilter {
    fn wrap(&self, batch: Box<dyn EventBatch>) -> Box<dyn EventBatch> {
        Box::new(TracingEventBatch::around(batch))
    }
}
