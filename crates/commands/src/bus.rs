//! The command bus: the submitter-facing entry point.

use std::sync::Arc;

use tracing::debug;

use crate::command::Command;
use crate::executor::CommandExecutor;
use crate::future::{CommandFuture, command_future};

/// Turns a command into a future result via whatever executor it was
/// built over.
#[derive(Clone)]
pub struct CommandBus {
    executor: Arc<dyn CommandExecutor>,
}

impl CommandBus {
    pub fn executing_with(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Submit a command; the returned future resolves once the command
    /// reaches a terminal state.
    pub fn apply(&self, command: Command) -> CommandFuture {
        debug!(command = %command, "command submitted");
        let (promise, future) = command_future();
        self.executor.execute(command, promise);
        future
    }
}
