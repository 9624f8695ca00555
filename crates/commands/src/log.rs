//! Recording commands and their terminal results.

use std::sync::Arc;

use tracing::info;

use strata_core::TimeUuidGenerator;

use crate::command::{Command, CommandResult};
use crate::executor::CommandExecutor;
use crate::future::CommandPromise;

/// Records both sides of a command's lifecycle: the command as accepted
/// (now bearing a processing id) and its terminal result.
pub trait CommandLog: Send + Sync {
    /// Record an incoming command, assigning it a processing id if it
    /// lacks one. Returns the command as recorded.
    fn log_command(&self, command: Command) -> Command;

    fn log_result(&self, result: &CommandResult);
}

/// Emits both lifecycle sides as structured tracing events.
pub struct TracingCommandLog {
    ids: Arc<TimeUuidGenerator>,
}

impl TracingCommandLog {
    pub fn with_ids(ids: Arc<TimeUuidGenerator>) -> Self {
        Self { ids }
    }
}

impl CommandLog for TracingCommandLog {
    fn log_command(&self, command: Command) -> Command {
        let command = match command.processing_id() {
            Some(_) => command,
            None => command.processed(self.ids.next()),
        };
        info!(
            command = %command,
            processing_id = %command.processing_id().unwrap_or_default(),
            "command accepted"
        );
        command
    }

    fn log_result(&self, result: &CommandResult) {
        match result.error() {
            None => info!(
                processing_id = %result.processing_id(),
                "command succeeded"
            ),
            Some(error) => info!(
                processing_id = %result.processing_id(),
                error,
                "command failed"
            ),
        }
    }
}

/// Wraps any executor to log each command on the way in and its result on
/// the way out.
pub struct LoggingCommandExecutor {
    log: Arc<dyn CommandLog>,
    inner: Arc<dyn CommandExecutor>,
}

impl LoggingCommandExecutor {
    pub fn around(inner: Arc<dyn CommandExecutor>, log: Arc<dyn CommandLog>) -> Self {
        Self { log, inner }
    }
}

impl CommandExecutor for LoggingCommandExecutor {
    fn execute(&self, command: Command, promise: CommandPromise) {
        let command = self.log.log_command(command);
        let log = Arc::clone(&self.log);
        let promise = promise.inspecting(move |outcome| {
            if let Ok(result) = outcome {
                log.log_result(result);
            }
        });
        self.inner.execute(command, promise);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::Mutex;
    use strata_core::tuple::TupleSchema;
    use strata_core::{AggregateId, StreamTimestamp, VersionedName};
    use uuid::Uuid;

    use crate::command::{CommandError, CommandType, ResultType};
    use crate::executor::ProcessingCommandExecutor;
    use crate::future::command_future;

    struct RecordingLog {
        ids: Arc<TimeUuidGenerator>,
        commands: Mutex<Vec<Uuid>>,
        results: Mutex<Vec<bool>>,
    }

    impl CommandLog for RecordingLog {
        fn log_command(&self, command: Command) -> Command {
            let command = match command.processing_id() {
                Some(_) => command,
                None => command.processed(self.ids.next()),
            };
            self.commands
                .lock()
                .unwrap()
                .push(command.processing_id().unwrap());
            command
        }

        fn log_result(&self, result: &CommandResult) {
            self.results.lock().unwrap().push(result.succeeded());
        }
    }

    #[test]
    fn both_sides_of_the_lifecycle_are_recorded() {
        let ids = Arc::new(TimeUuidGenerator::new());
        let log = Arc::new(RecordingLog {
            ids: Arc::clone(&ids),
            commands: Mutex::new(Vec::new()),
            results: Mutex::new(Vec::new()),
        });
        let executor = LoggingCommandExecutor::around(
            Arc::new(ProcessingCommandExecutor::processing_with(
                Arc::new(|_: &Command| -> Result<Option<Value>, CommandError> { Ok(None) }),
                ids,
            )),
            Arc::clone(&log) as Arc<dyn CommandLog>,
        );

        let schema = TupleSchema::new("noop", vec![]).unwrap();
        let command = Command::new(
            AggregateId::new("order", "o-1"),
            StreamTimestamp::now(),
            CommandType::new("order", VersionedName::new("noop")),
            schema.make(vec![]).unwrap(),
            ResultType::Void,
        );

        let (promise, future) = command_future();
        executor.execute(command, promise);
        let result = future.wait().unwrap();

        assert_eq!(log.commands.lock().unwrap().len(), 1);
        assert_eq!(*log.results.lock().unwrap(), vec![true]);
        // The executor kept the id the log assigned.
        assert_eq!(log.commands.lock().unwrap()[0], result.processing_id());
    }
}
