//! Executor configuration.

use crate::error::{Error, Result};
use std::time::Duration;

/// Grace period an owned worker gets to terminate during release.
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_millis(500);

const MIN_STACK_SIZE: usize = 64 * 1024;

/// Settings for a [`TaskExecutor`](crate::TaskExecutor) and its worker.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// How long `release` waits for an owned worker to terminate.
    pub release_timeout: Duration,
    /// Name of the dedicated worker thread.
    pub thread_name: String,
    /// Worker stack size in bytes; `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            release_timeout: DEFAULT_RELEASE_TIMEOUT,
            thread_name: "taskline-worker".to_string(),
            stack_size: Some(2 * 1024 * 1024),
        }
    }
}

impl ExecutorConfig {
    /// Starts a builder from the defaults.
    pub fn builder() -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::new()
    }

    /// Checks every field, returning [`Error::Config`] on the first bad one.
    pub fn validate(&self) -> Result<()> {
        if self.release_timeout.is_zero() {
            return Err(Error::config("release_timeout must be > 0"));
        }

        if self.thread_name.is_empty() {
            return Err(Error::config("thread_name must not be empty"));
        }

        if let Some(size) = self.stack_size {
            if size < MIN_STACK_SIZE {
                return Err(Error::config(format!(
                    "stack_size too small (min {} bytes)",
                    MIN_STACK_SIZE
                )));
            }
        }

        Ok(())
    }
}

/// Builder for [`ExecutorConfig`].
#[derive(Debug, Default)]
pub struct ExecutorConfigBuilder {
    config: ExecutorConfig,
}

impl ExecutorConfigBuilder {
    /// Builder holding the default config.
    pub fn new() -> Self {
        Self {
            config: ExecutorConfig::default(),
        }
    }

    /// Sets [`ExecutorConfig::release_timeout`].
    pub fn release_timeout(mut self, timeout: Duration) -> Self {
        self.config.release_timeout = timeout;
        self
    }

    /// Sets [`ExecutorConfig::thread_name`].
    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Sets [`ExecutorConfig::stack_size`].
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Use the platform default stack size for the worker thread.
    pub fn default_stack_size(mut self) -> Self {
        self.config.stack_size = None;
        self
    }

    /// Validates and returns the config.
    pub fn build(self) -> Result<ExecutorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
