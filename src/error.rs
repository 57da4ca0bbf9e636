//! Error types.

use std::time::Duration;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong in a task or in the executor.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Graphics-context failure raised by a task.
    #[error("graphics context error: {0}")]
    GlContext(String),

    /// Processing failure raised by a task.
    #[error("processing error: {0}")]
    Processing(String),

    /// A task panicked; carries the panic message.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// An owned worker missed the release grace period.
    #[error("release timed out after {0:?}, resources may not be cleaned up properly")]
    ReleaseTimeout(Duration),

    /// The execution context refused a job.
    #[error("execution context rejected the job: {0}")]
    Rejected(String),

    /// The executor has been released.
    #[error("executor already released")]
    Released,

    /// A completion signal was dropped before it fired.
    #[error("interrupted: {0}")]
    Interrupted(String),

    /// Misuse of the executor or its context, or a worker spawn failure.
    #[error("executor error: {0}")]
    Executor(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Builds an [`Error::GlContext`].
    pub fn gl_context<S: Into<String>>(msg: S) -> Self {
        Error::GlContext(msg.into())
    }

    /// Builds an [`Error::Processing`].
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Error::Processing(msg.into())
    }

    /// Builds an [`Error::Rejected`].
    pub fn rejected<S: Into<String>>(msg: S) -> Self {
        Error::Rejected(msg.into())
    }

    /// Builds an [`Error::Interrupted`].
    pub fn interrupted<S: Into<String>>(msg: S) -> Self {
        Error::Interrupted(msg.into())
    }

    /// Builds an [`Error::Executor`].
    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    /// Builds an [`Error::Config`].
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}

/// Coarse classification of a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// From [`Error::GlContext`].
    GlContext,
    /// From [`Error::Processing`].
    Processing,
    /// From [`Error::Panicked`].
    Panic,
    /// From [`Error::ReleaseTimeout`].
    ReleaseTimeout,
    /// Executor-side failures: rejection, interruption, misuse.
    Scheduling,
}

/// The single failure type handed to a [`Listener`](crate::Listener).
///
/// Every [`Error`] normalizes into one of these; the original message is kept
/// verbatim so nothing is lost on the way to the listener.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProcessingError {
    kind: FailureKind,
    message: String,
}

impl ProcessingError {
    /// Builds a failure of `kind` with `message`.
    pub fn new<S: Into<String>>(kind: FailureKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// What kind of failure this is.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this reports a release timeout.
    pub fn is_release_timeout(&self) -> bool {
        self.kind == FailureKind::ReleaseTimeout
    }
}

impl From<Error> for ProcessingError {
    fn from(error: Error) -> Self {
        let kind = match &error {
            Error::GlContext(_) => FailureKind::GlContext,
            Error::Processing(_) => FailureKind::Processing,
            Error::Panicked(_) => FailureKind::Panic,
            Error::ReleaseTimeout(_) => FailureKind::ReleaseTimeout,
            Error::Rejected(_)
            | Error::Released
            | Error::Interrupted(_)
            | Error::Executor(_)
            | Error::Config(_) => FailureKind::Scheduling,
        };
        ProcessingError::new(kind, error.to_string())
    }
}
