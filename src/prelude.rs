//! Convenience re-exports: `use taskline::prelude::*;`.

pub use crate::config::{ExecutorConfig, ExecutorConfigBuilder};
pub use crate::error::{Error, FailureKind, ProcessingError, Result};
pub use crate::executor::{ExecutionContext, SerialWorker, StatsSnapshot, TaskExecutor};
pub use crate::listener::{Listener, LoggingListener};
