//! Command execution: processing, worker pools, and partitioned routing.
//!
//! Every executor receives a command plus the promise that resolves the
//! submitter's future. Business failures never escape: the processing
//! executor converts them into a failed [`CommandResult`]. Only
//! infrastructure failures (a pool that can no longer accept work) reach
//! the future as an [`ExecutorError`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;

use serde_json::Value;
use tracing::{debug, warn};

use strata_core::{AggregateId, TimeUuidGenerator};

use crate::command::{Command, CommandError};
use crate::future::{CommandPromise, ExecutorError};

/// Business logic invoked per command. Emitting events, if any, happens
/// inside the processor via whatever event bus it holds.
pub trait CommandProcessor: Send + Sync {
    fn process(&self, command: &Command) -> Result<Option<Value>, CommandError>;
}

impl<F> CommandProcessor for F
where
    F: Fn(&Command) -> Result<Option<Value>, CommandError> + Send + Sync,
{
    fn process(&self, command: &Command) -> Result<Option<Value>, CommandError> {
        self(command)
    }
}

pub trait CommandExecutor: Send + Sync {
    fn execute(&self, command: Command, promise: CommandPromise);
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for Arc<T> {
    fn execute(&self, command: Command, promise: CommandPromise) {
        (**self).execute(command, promise)
    }
}

/// The synchronous executor: runs the processor on the caller's thread.
///
/// Assigns a processing id when the command arrives without one, and
/// converts every processor error into a failed result on the promise.
/// Other executors wrap this one to add threading and routing.
pub struct ProcessingCommandExecutor {
    processor: Arc<dyn CommandProcessor>,
    ids: Arc<TimeUuidGenerator>,
}

impl ProcessingCommandExecutor {
    pub fn processing_with(
        processor: Arc<dyn CommandProcessor>,
        ids: Arc<TimeUuidGenerator>,
    ) -> Self {
        Self { processor, ids }
    }
}

impl CommandExecutor for ProcessingCommandExecutor {
    fn execute(&self, command: Command, promise: CommandPromise) {
        let command = match command.processing_id() {
            Some(_) => command,
            None => command.processed(self.ids.next()),
        };
        let processed_at = command
            .processing_time()
            .unwrap_or_else(chrono::Utc::now);

        let result = match self.processor.process(&command) {
            Ok(value) => command
                .complete(processed_at, value)
                .unwrap_or_else(|mismatch| {
                    warn!(command = %command, error = %mismatch, "result value mismatch");
                    command.fail(processed_at, mismatch.to_string())
                }),
            Err(error) => {
                debug!(command = %command, error = %error, "command failed");
                command.fail(processed_at, error.to_string())
            }
        };
        promise.complete(result);
    }
}

type Job = (Command, CommandPromise);

/// Runs commands on a fixed pool of worker threads.
///
/// Cross-aggregate ordering is unordered; any worker may pick up any
/// command. Submission after shutdown fails the promise with
/// [`ExecutorError::Rejected`]. Dropping the pool drains queued work and
/// joins the workers.
pub struct ThreadpoolCommandExecutor {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadpoolCommandExecutor {
    pub fn with_workers(inner: Arc<dyn CommandExecutor>, workers: usize) -> Self {
        assert!(workers > 0, "a worker pool needs at least one thread");

        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..workers)
            .map(|_| {
                let inner = Arc::clone(&inner);
                let receiver = Arc::clone(&receiver);
                std::thread::spawn(move || worker_loop(inner, receiver))
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            workers: handles,
        }
    }

    /// A pool of exactly one thread: all commands it receives execute in
    /// submission order.
    pub fn single_threaded(inner: Arc<dyn CommandExecutor>) -> Self {
        Self::with_workers(inner, 1)
    }

    /// Stop accepting work; queued commands still run.
    pub fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

fn worker_loop(inner: Arc<dyn CommandExecutor>, receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = {
            let Ok(guard) = receiver.lock() else { break };
            guard.recv()
        };
        match job {
            Ok((command, promise)) => inner.execute(command, promise),
            Err(_) => break,
        }
    }
}

impl CommandExecutor for ThreadpoolCommandExecutor {
    fn execute(&self, command: Command, promise: CommandPromise) {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        let Some(sender) = sender else {
            promise.fail(ExecutorError::rejected("worker pool is shut down"));
            return;
        };
        if let Err(mpsc::SendError((_, promise))) = sender.send((command, promise)) {
            promise.fail(ExecutorError::rejected("worker pool is shut down"));
        }
    }
}

impl Drop for ThreadpoolCommandExecutor {
    fn drop(&mut self) {
        self.shutdown();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Routes every command deterministically by its aggregate id, so all
/// commands for one aggregate land on the same sub-executor.
///
/// With single-threaded sub-executors this is the only mode that
/// guarantees no two commands for the same aggregate ever execute
/// concurrently, while different aggregates still run in parallel with no
/// global lock.
pub struct PartitioningCommandExecutor {
    partitions: Vec<Box<dyn CommandExecutor>>,
}

impl PartitioningCommandExecutor {
    pub fn over(partitions: Vec<Box<dyn CommandExecutor>>) -> Self {
        assert!(!partitions.is_empty(), "at least one partition is required");
        Self { partitions }
    }

    /// The standard construction: `partitions` single-threaded pools, all
    /// draining into the same inner executor.
    pub fn threaded(inner: Arc<dyn CommandExecutor>, partitions: usize) -> Self {
        Self::over(
            (0..partitions)
                .map(|_| {
                    Box::new(ThreadpoolCommandExecutor::single_threaded(Arc::clone(&inner)))
                        as Box<dyn CommandExecutor>
                })
                .collect(),
        )
    }

    fn partition_of(&self, aggregate_id: &AggregateId) -> usize {
        let mut hasher = DefaultHasher::new();
        aggregate_id.hash(&mut hasher);
        (hasher.finish() % self.partitions.len() as u64) as usize
    }
}

impl CommandExecutor for PartitioningCommandExecutor {
    fn execute(&self, command: Command, promise: CommandPromise) {
        let partition = self.partition_of(command.aggregate_id());
        debug!(aggregate = %command.aggregate_id(), partition, "command routed");
        self.partitions[partition].execute(command, promise);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strata_core::tuple::{SlotType, TupleSchema};
    use strata_core::{StreamTimestamp, VersionedName};

    use crate::command::{CommandType, ResultType};
    use crate::future::command_future;

    fn command_for(aggregate: &str, result_type: ResultType) -> Command {
        let schema = TupleSchema::new("noop", vec![]).unwrap();
        Command::new(
            AggregateId::new("order", aggregate),
            StreamTimestamp::now(),
            CommandType::new("order", VersionedName::new("noop")),
            schema.make(vec![]).unwrap(),
            result_type,
        )
    }

    fn ok_none(_: &Command) -> Result<Option<Value>, CommandError> {
        Ok(None)
    }

    fn processing(processor: Arc<dyn CommandProcessor>) -> Arc<ProcessingCommandExecutor> {
        Arc::new(ProcessingCommandExecutor::processing_with(
            processor,
            Arc::new(TimeUuidGenerator::new()),
        ))
    }

    #[test]
    fn assigns_a_processing_id_and_completes() {
        let executor = processing(Arc::new(ok_none));
        let (promise, future) = command_future();
        executor.execute(command_for("o-1", ResultType::Void), promise);

        let result = future.wait().unwrap();
        assert!(result.succeeded());
        assert!(strata_core::timeuuid::is_time_ordered(&result.processing_id()));
    }

    #[test]
    fn processor_errors_become_failed_results_not_future_failures() {
        let executor = processing(Arc::new(|_: &Command| -> Result<Option<Value>, CommandError> {
            Err(CommandError::processing("out of stock"))
        }));
        let (promise, future) = command_future();
        executor.execute(command_for("o-1", ResultType::Void), promise);

        let result = future.wait().unwrap();
        assert!(!result.succeeded());
        assert_eq!(result.error(), Some("command processing failed: out of stock"));
    }

    #[test]
    fn result_type_mismatches_become_failed_results() {
        let executor = processing(Arc::new(|_: &Command| -> Result<Option<Value>, CommandError> { Ok(Some(json!(1))) }));
        let (promise, future) = command_future();
        executor.execute(command_for("o-1", ResultType::Void), promise);

        assert!(!future.wait().unwrap().succeeded());
    }

    #[test]
    fn value_returning_commands_carry_their_value() {
        let executor = processing(Arc::new(|_: &Command| -> Result<Option<Value>, CommandError> {
            Ok(Some(json!("confirmed")))
        }));
        let (promise, future) = command_future();
        executor.execute(
            command_for("o-1", ResultType::Value(SlotType::String)),
            promise,
        );

        assert_eq!(
            future.wait().unwrap().result_value(),
            Some(&json!("confirmed"))
        );
    }

    #[test]
    fn pool_submission_after_shutdown_fails_the_future() {
        let pool =
            ThreadpoolCommandExecutor::with_workers(processing(Arc::new(ok_none)), 2);
        pool.shutdown();

        let (promise, future) = command_future();
        pool.execute(command_for("o-1", ResultType::Void), promise);
        assert!(matches!(future.wait(), Err(ExecutorError::Rejected(_))));
    }

    #[test]
    fn pool_executes_submitted_commands() {
        let pool =
            ThreadpoolCommandExecutor::with_workers(processing(Arc::new(ok_none)), 4);

        let futures: Vec<_> = (0..100)
            .map(|i| {
                let (promise, future) = command_future();
                pool.execute(command_for(&format!("o-{i}"), ResultType::Void), promise);
                future
            })
            .collect();

        for future in futures {
            assert!(future.wait().unwrap().succeeded());
        }
    }

    /// A non-reentrant-lock double: any overlapping execution for the
    /// same aggregate shows up as a failed try_lock.
    struct OverlapDetector {
        lock: Mutex<()>,
        overlaps: AtomicUsize,
    }

    impl CommandProcessor for OverlapDetector {
        fn process(&self, _: &Command) -> Result<Option<Value>, CommandError> {
            match self.lock.try_lock() {
                Ok(_guard) => {
                    std::thread::yield_now();
                    Ok(None)
                }
                Err(_) => {
                    self.overlaps.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            }
        }
    }

    #[test]
    fn partitioning_serializes_commands_for_one_aggregate() {
        let detector = Arc::new(OverlapDetector {
            lock: Mutex::new(()),
            overlaps: AtomicUsize::new(0),
        });
        let executor = PartitioningCommandExecutor::threaded(
            processing(Arc::clone(&detector) as Arc<dyn CommandProcessor>),
            4,
        );

        let futures: Vec<_> = (0..1_000)
            .map(|_| {
                let (promise, future) = command_future();
                executor.execute(command_for("o-contended", ResultType::Void), promise);
                future
            })
            .collect();
        for future in futures {
            future.wait().unwrap();
        }

        assert_eq!(detector.overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn routing_is_deterministic_per_aggregate() {
        let executor = PartitioningCommandExecutor::threaded(
            processing(Arc::new(ok_none)),
            4,
        );

        let id = AggregateId::new("order", "o-1");
        let first = executor.partition_of(&id);
        for _ in 0..100 {
            assert_eq!(executor.partition_of(&id), first);
        }
    }

    #[test]
    fn different_aggregates_run_in_parallel_across_partitions() {
        // Two aggregates in different partitions: a command for the second
        // completes while the first partition's worker is blocked.
        let (release, held) = mpsc::channel::<()>();
        let release = Mutex::new(Some((release, held)));
        let blocking = Arc::new(move |command: &Command| -> Result<Option<Value>, CommandError> {
            if command.aggregate_id().id() == "blocker"
                && let Ok(mut slot) = release.lock()
                && let Some((_tx, held)) = slot.take()
            {
                let _ = held.recv_timeout(std::time::Duration::from_millis(200));
            }
            Ok(None)
        });

        let executor = Arc::new(PartitioningCommandExecutor::threaded(
            processing(blocking),
            8,
        ));
        let blocker_partition = executor.partition_of(&AggregateId::new("order", "blocker"));
        let other = (0..100)
            .map(|i| format!("o-{i}"))
            .find(|id| {
                executor.partition_of(&AggregateId::new("order", id)) != blocker_partition
            })
            .unwrap();

        let (promise, _blocked) = command_future();
        executor.execute(command_for("blocker", ResultType::Void), promise);

        let (promise, future) = command_future();
        executor.execute(command_for(&other, ResultType::Void), promise);
        assert!(
            future
                .wait_timeout(std::time::Duration::from_millis(150))
                .unwrap()
                .succeeded()
        );
    }
}
