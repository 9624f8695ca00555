//! The command data model: types, the command value, and its terminal
//! result.
//!
//! Commands are immutable; assigning a processing id produces a copy.
//! A command reaches exactly one terminal state, captured as a
//! [`CommandResult`]: succeeded with an optional value, or failed with an
//! error description.

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use strata_core::timeuuid;
use strata_core::tuple::{SlotType, Tuple};
use strata_core::{AggregateId, StreamTimestamp, VersionedName};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// A business-level failure raised by command processing.
    #[error("command processing failed: {0}")]
    Processing(String),

    #[error("a void command cannot complete with a result value")]
    UnexpectedResultValue,

    #[error("a value-returning command must complete with a result value")]
    MissingResultValue,
}

impl CommandError {
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing(message.into())
    }
}

/// What a command's processor is declared to return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultType {
    Void,
    Value(SlotType),
}

impl ResultType {
    pub fn expects_value(&self) -> bool {
        matches!(self, ResultType::Value(_))
    }
}

/// The type of a command: which aggregate type it addresses and its
/// versioned name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandType {
    aggregate_type: String,
    name: VersionedName,
}

impl CommandType {
    pub fn new(aggregate_type: impl Into<String>, name: VersionedName) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            name,
        }
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn name(&self) -> &VersionedName {
        &self.name
    }
}

impl core::fmt::Display for CommandType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.aggregate_type, self.name)
    }
}

/// A request to change one aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    aggregate_id: AggregateId,
    timestamp: StreamTimestamp,
    processing_id: Option<Uuid>,
    command_type: CommandType,
    parameters: Tuple,
    result_type: ResultType,
}

impl Command {
    pub fn new(
        aggregate_id: AggregateId,
        timestamp: StreamTimestamp,
        command_type: CommandType,
        parameters: Tuple,
        result_type: ResultType,
    ) -> Self {
        Self {
            aggregate_id,
            timestamp,
            processing_id: None,
            command_type,
            parameters,
            result_type,
        }
    }

    pub fn aggregate_id(&self) -> &AggregateId {
        &self.aggregate_id
    }

    pub fn timestamp(&self) -> &StreamTimestamp {
        &self.timestamp
    }

    pub fn command_type(&self) -> &CommandType {
        &self.command_type
    }

    pub fn parameters(&self) -> &Tuple {
        &self.parameters
    }

    pub fn result_type(&self) -> &ResultType {
        &self.result_type
    }

    pub fn processing_id(&self) -> Option<Uuid> {
        self.processing_id
    }

    /// The instant at which the command was accepted for processing,
    /// decoded from its processing id.
    pub fn processing_time(&self) -> Option<DateTime<Utc>> {
        self.processing_id
            .and_then(|id| timeuuid::instant_of(&id).ok())
    }

    /// A copy of this command carrying the supplied processing id.
    ///
    /// Panics when the id is not time-ordered.
    pub fn processed(&self, processing_id: Uuid) -> Self {
        assert!(
            timeuuid::is_time_ordered(&processing_id),
            "processing id {processing_id} is not a time-ordered uuid"
        );
        Self {
            processing_id: Some(processing_id),
            ..self.clone()
        }
    }

    fn require_processing_id(&self) -> Uuid {
        self.processing_id.unwrap_or_else(|| {
            panic!(
                "command {} has no processing id; it cannot reach a terminal state",
                self.command_type
            )
        })
    }

    /// The successful terminal result of this command.
    ///
    /// The value's presence must match the declared result type; a
    /// mismatch is rejected at construction. Panics when the command has
    /// no processing id yet.
    pub fn complete(
        &self,
        processed_at: DateTime<Utc>,
        value: Option<Value>,
    ) -> Result<CommandResult, CommandError> {
        let processing_id = self.require_processing_id();
        match (self.result_type.expects_value(), value.is_some()) {
            (true, false) => Err(CommandError::MissingResultValue),
            (false, true) => Err(CommandError::UnexpectedResultValue),
            _ => Ok(CommandResult {
                processing_id,
                processed_at,
                result_type: self.result_type.clone(),
                outcome: CommandOutcome::Succeeded(value),
            }),
        }
    }

    /// The failed terminal result of this command. Panics when the
    /// command has no processing id yet.
    pub fn fail(&self, processed_at: DateTime<Utc>, error: impl Into<String>) -> CommandResult {
        CommandResult {
            processing_id: self.require_processing_id(),
            processed_at,
            result_type: self.result_type.clone(),
            outcome: CommandOutcome::Failed(error.into()),
        }
    }
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {} {}", self.command_type, self.aggregate_id, self.parameters)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum CommandOutcome {
    Succeeded(Option<Value>),
    Failed(String),
}

/// The terminal state of one processed command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    processing_id: Uuid,
    processed_at: DateTime<Utc>,
    result_type: ResultType,
    outcome: CommandOutcome,
}

impl CommandResult {
    pub fn processing_id(&self) -> Uuid {
        self.processing_id
    }

    pub fn processed_at(&self) -> DateTime<Utc> {
        self.processed_at
    }

    pub fn result_type(&self) -> &ResultType {
        &self.result_type
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, CommandOutcome::Succeeded(_))
    }

    pub fn result_value(&self) -> Option<&Value> {
        match &self.outcome {
            CommandOutcome::Succeeded(value) => value.as_ref(),
            CommandOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            CommandOutcome::Succeeded(_) => None,
            CommandOutcome::Failed(error) => Some(error),
        }
    }
}
