//! Error types shared across the crate.
//!
//! Validation failures are not errors here: they are reported through
//! [`ValidationOutcome`](crate::validation::ValidationOutcome) and collected
//! in an [`ErrorsContainer`](crate::validation::ErrorsContainer).

use thiserror::Error;

/// Failure of a single command invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A `SequentialReject` command was invoked while already running.
    #[error("Command '{command}' is already executing")]
    Busy { command: String },

    /// The command body returned an error.
    #[error("Command '{command}' failed: {source}")]
    Execution {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    /// `try_execute` was called while `can_execute` was false.
    #[error("Command '{command}' cannot execute in its current state")]
    Disabled { command: String },

    /// The owning lifecycle scope has been disposed.
    #[error("Command '{command}' belongs to a disposed scope")]
    Disposed { command: String },

    /// The cancellation token fired before the body was dispatched.
    #[error("Command '{command}' was cancelled before dispatch")]
    Cancelled { command: String },
}

impl CommandError {
    /// Name of the command that produced this error.
    pub fn command(&self) -> &str {
        match self {
            CommandError::Busy { command }
            | CommandError::Execution { command, .. }
            | CommandError::Disabled { command }
            | CommandError::Disposed { command }
            | CommandError::Cancelled { command } => command,
        }
    }

    /// Returns true if the body actually ran and failed.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, CommandError::Execution { .. })
    }
}

/// Failure of an interaction request round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InteractionError {
    /// Raised while no consumer was attached and the policy dropped it.
    #[error("Interaction '{request}' has no attached consumer")]
    NoConsumer { request: String },

    /// Every responder was dropped without answering.
    #[error("Interaction '{request}' was abandoned without a response")]
    Abandoned { request: String },
}

/// Lifecycle contract violations reported by the view-model host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("View-model '{name}' was already initialized")]
    AlreadyInitialized { name: String },

    #[error("View-model '{name}' has been destroyed")]
    Destroyed { name: String },

    #[error("View-model '{name}' is not a target for '{target}'")]
    NotNavigationTarget { name: String, target: String },

    #[error("View-model '{name}' failed to initialize: {message}")]
    Initialization { name: String, message: String },
}

/// Error returned by a [`Disposable`](crate::lifecycle::Disposable) that
/// failed to release. Logged and skipped by the scope.
#[derive(Debug, Error)]
#[error("Failed to dispose '{resource}': {message}")]
pub struct DisposeError {
    pub resource: String,
    pub message: String,
}

impl DisposeError {
    pub fn new(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            message: message.into(),
        }
    }
}
