//! The command side of the event-sourcing kernel.
//!
//! A submitter hands a [`command::Command`] to the [`bus::CommandBus`] and
//! receives a [`future::CommandFuture`]. The executor family decides where
//! the work runs: inline on the caller's thread, on a worker pool, or
//! routed through [`executor::PartitioningCommandExecutor`] for
//! per-aggregate serialized execution. Business failures always resolve
//! the future with a failed [`command::CommandResult`]; only executor
//! infrastructure failures surface as [`future::ExecutorError`].

pub mod bus;
pub mod command;
pub mod executor;
pub mod future;
pub mod log;

pub use bus::CommandBus;
pub use command::{Command, CommandError, CommandResult, CommandType, ResultType};
pub use executor::{
    CommandExecutor, CommandProcessor, PartitioningCommandExecutor, ProcessingCommandExecutor,
    ThreadpoolCommandExecutor,
};
pub use future::{CommandFuture, CommandPromise, ExecutorError, command_future};
pub use log::{CommandLog, LoggingCommandExecutor, TracingCommandLog};
