//! Task execution infrastructure.
//!
//! This module provides the serial execution context, the task unit, and the
//! [`TaskExecutor`] that layers priority overrides, flush and release on top.

pub mod panic_handler;
pub mod stats;
pub mod task;
pub mod task_executor;
pub mod worker;

pub use stats::{ExecutorStats, StatsSnapshot};
pub use task::Task;
pub use task_executor::TaskExecutor;
pub use worker::{ExecutionContext, Job, SerialWorker};
