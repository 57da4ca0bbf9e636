//! taskline - serial task execution for real-time media pipelines
//!
//! A [`TaskExecutor`] runs GPU/CPU work strictly one task at a time on a single
//! worker, while letting control operations jump the queue or cancel it.
//!
//! # Quick Start
//!
//! ```no_run
//! use taskline::prelude::*;
//!
//! let executor = TaskExecutor::new(ExecutorConfig::default(), |error: ProcessingError| {
//!     eprintln!("pipeline failed: {}", error);
//! })
//! .unwrap();
//!
//! executor.submit(|| {
//!     // draw a frame
//!     Ok(())
//! });
//! executor.submit_with_high_priority(|| {
//!     // e.g. return an output texture
//!     Ok(())
//! });
//!
//! executor.flush().unwrap();
//! executor.release(|| Ok(()));
//! ```
//!
//! # Features
//!
//! - **Strict ordering**: FIFO among ordinary tasks, at most one task active
//! - **Priority overrides**: high-priority tasks drain before the next
//!   ordinary task body
//! - **Flush**: discard pending work and resume
//! - **Release**: terminal shutdown with a bounded wait on the worker
//! - **Single error channel**: the first failure cancels pending work and is
//!   reported once to the [`Listener`]

// Lint configuration
#![warn(missing_docs, missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod executor;
pub mod listener;
pub mod prelude;

// Re-export key types at crate root
pub use config::{ExecutorConfig, ExecutorConfigBuilder, DEFAULT_RELEASE_TIMEOUT};
pub use error::{Error, FailureKind, ProcessingError, Result};
pub use executor::{ExecutionContext, SerialWorker, StatsSnapshot, Task, TaskExecutor};
pub use listener::{Listener, LoggingListener};
