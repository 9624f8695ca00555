//! The event bus: where newly-produced events enter the pipeline.
//!
//! A bus opens batches; callers either drive a batch by hand, dispatch a
//! closure against one, or push a single event through a one-shot batch.
//! Bus filters wrap batch creation, which is where logging and
//! asynchronous completion hook in.

use std::sync::Arc;
use std::sync::mpsc;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;

use tracing::{debug, error};
use uuid::Uuid;

use strata_core::TimeUuidGenerator;

use crate::batching::{
    BufferingEventBatch, EventBatch, EventBatchFilter, SubBatchingEventBatch, TracingEventBatch,
};
use crate::event::Event;
use crate::logging::EventLog;
use crate::storage::EventStoreError;

pub trait EventBus: Send + Sync {
    fn start_batch(&self) -> Box<dyn EventBatch>;
}

impl<T: EventBus + ?Sized> EventBus for Arc<T> {
    fn start_batch(&self) -> Box<dyn EventBatch> {
        (**self).start_batch()
    }
}

/// Batch-driving conveniences available on every bus.
pub trait EventBusExt: EventBus {
    /// Open a batch, hand it to the closure, then complete it.
    fn dispatch(
        &self,
        f: impl FnOnce(&mut dyn EventBatch) -> Result<(), EventStoreError>,
    ) -> Result<(), EventStoreError> {
        let mut batch = self.start_batch();
        f(batch.as_mut())?;
        batch.complete()
    }

    /// Push one event through a single-event batch.
    fn accept(&self, event: Event) -> Result<(), EventStoreError> {
        self.dispatch(|batch| batch.accept(event))
    }
}

impl<T: EventBus + ?Sized> EventBusExt for T {}

/// The standard bus: batches drain into an [`EventLog`], batch ids are
/// time-ordered, and optional sub-batching bounds how many events reach
/// the log in one call.
pub struct ProcessingEventBus {
    log: Arc<dyn EventLog>,
    ids: Arc<TimeUuidGenerator>,
    sub_batch_size: Option<usize>,
    batch_filters: Vec<Arc<dyn EventBatchFilter>>,
}

impl ProcessingEventBus {
    pub fn publishing_to(log: Arc<dyn EventLog>, ids: Arc<TimeUuidGenerator>) -> Self {
        Self {
            log,
            ids,
            sub_batch_size: None,
            batch_filters: Vec::new(),
        }
    }

    /// Forward events to the log in chunks of at most `size`.
    pub fn sub_batching(mut self, size: usize) -> Self {
        self.sub_batch_size = Some(size);
        self
    }

    /// Install a batch filter; filters wrap batches in declaration order,
    /// outermost first.
    pub fn filtered_with(mut self, filter: Arc<dyn EventBatchFilter>) -> Self {
        self.batch_filters.push(filter);
        self
    }
}

impl EventBus for ProcessingEventBus {
    fn start_batch(&self) -> Box<dyn EventBatch> {
        let id = self.ids.next();
        let mut batch: Box<dyn EventBatch> = match self.sub_batch_size {
            Some(size) => Box::new(SubBatchingEventBatch::chunking_to(
                id,
                size,
                Arc::clone(&self.log),
            )),
            None => Box::new(BufferingEventBatch::draining_to(id, Arc::clone(&self.log))),
        };
        for filter in self.batch_filters.iter().rev() {
            batch = filter.wrap(batch);
        }
        batch
    }
}

/// A bus filter tracing batch lifecycles.
pub struct LoggingEventBus {
    inner: Arc<dyn EventBus>,
}

impl LoggingEventBus {
    pub fn around(inner: Arc<dyn EventBus>) -> Self {
        Self { inner }
    }
}

impl EventBus for LoggingEventBus {
    fn start_batch(&self) -> Box<dyn EventBatch> {
        let batch = self.inner.start_batch();
        debug!(batch = %batch.id(), "batch started");
        Box::new(TracingEventBatch::around(batch))
    }
}

/// A bus filter moving batch completion off the caller's thread.
///
/// Completed batches are handed to a single background worker which
/// dispatches them to the wrapped bus. Completion errors cannot reach the
/// submitting caller; they are logged. Dropping the bus flushes and joins
/// the worker.
pub struct AsyncEventBus {
    ids: Arc<TimeUuidGenerator>,
    sender: Option<Sender<Vec<Event>>>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncEventBus {
    pub fn around(inner: Arc<dyn EventBus>, ids: Arc<TimeUuidGenerator>) -> Self {
        let (sender, receiver) = mpsc::channel::<Vec<Event>>();
        let worker = std::thread::spawn(move || {
            while let Ok(events) = receiver.recv() {
                let result = inner.dispatch(|batch| {
                    for event in events {
                        batch.accept(event)?;
                    }
                    Ok(())
                });
                if let Err(e) = result {
                    error!(error = %e, "asynchronous batch completion failed");
                }
            }
        });

        Self {
            ids,
            sender: Some(sender),
            worker: Some(worker),
        }
    }
}

impl EventBus for AsyncEventBus {
    fn start_batch(&self) -> Box<dyn EventBatch> {
        Box::new(SendingEventBatch {
            id: self.ids.next(),
            events: Vec::new(),
            sender: self.sender.clone(),
        })
    }
}

impl Drop for AsyncEventBus {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

struct SendingEventBatch {
    id: Uuid,
    events: Vec<Event>,
    sender: Option<Sender<Vec<Event>>>,
}

impl EventBatch for SendingEventBatch {
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
        self.sender
            .as_ref()
            .ok_or(EventStoreError::Closed)?
            .send(self.events)
            .map_err(|_| EventStoreError::Closed)
    }
}
