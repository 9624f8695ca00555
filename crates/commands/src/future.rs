//! One-shot promise/future pairs carrying command results.
//!
//! A submitter always receives a resolved future holding a definitive
//! succeeded/failed [`CommandResult`], except when the executor
//! infrastructure itself could not accept or finish the work, which
//! surfaces as an [`ExecutorError`] on the future instead.

use std::sync::mpsc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use thiserror::Error;

use crate::command::CommandResult;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("command executor rejected the work: {0}")]
    Rejected(String),

    #[error("command executor shut down before delivering a result")]
    Dropped,

    #[error("timed out waiting for a command result")]
    Timeout,
}

impl ExecutorError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// Create a linked promise/future pair.
pub fn command_future() -> (CommandPromise, CommandFuture) {
    let (sender, receiver) = mpsc::channel();
    let promise = CommandPromise {
        // The submitter may have dropped the future; delivery to nobody
        // is not an error.
        deliver: Box::new(move |outcome| {
            let _ = sender.send(outcome);
        }),
    };
    (promise, CommandFuture { receiver })
}

/// The write side: completed exactly once, by whichever executor ends up
/// owning the command.
pub struct CommandPromise {
    deliver: Box<dyn FnOnce(Result<CommandResult, ExecutorError>) + Send>,
}

impl CommandPromise {
    pub fn complete(self, result: CommandResult) {
        (self.deliver)(Ok(result));
    }

    pub fn fail(self, error: ExecutorError) {
        (self.deliver)(Err(error));
    }

    /// A promise that observes the outcome before forwarding it here;
    /// how result logging hooks into an executor chain.
    pub fn inspecting(
        self,
        observer: impl FnOnce(&Result<CommandResult, ExecutorError>) + Send + 'static,
    ) -> CommandPromise {
        let deliver = self.deliver;
        CommandPromise {
            deliver: Box::new(move |outcome| {
                observer(&outcome);
                deliver(outcome);
            }),
        }
    }
}

/// The read side held by the command submitter.
pub struct CommandFuture {
    receiver: Receiver<Result<CommandResult, ExecutorError>>,
}

impl CommandFuture {
    /// Block until the command reaches a terminal state.
    pub fn wait(self) -> Result<CommandResult, ExecutorError> {
        self.receiver.recv().map_err(|_| ExecutorError::Dropped)?
    }

    /// Block for at most `timeout`. The kernel defines no cancellation:
    /// timing out abandons the result but does not stop the command.
    pub fn wait_timeout(self, timeout: Duration) -> Result<CommandResult, ExecutorError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ExecutorError::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ExecutorError::Dropped),
        }
    }
}
