//! Error listener registered with a [`TaskExecutor`](crate::TaskExecutor).

use crate::error::ProcessingError;

/// Receives failures raised while the executor runs tasks.
///
/// `on_error` is called at most once per originating failure. It runs on the
/// worker thread, or on the thread calling `release` for a release timeout.
/// It is never called concurrently with itself and never while the
/// executor's internal lock is held, so it may call back into the executor.
pub trait Listener: Send + Sync {
    /// Called with the normalized failure.
    fn on_error(&self, error: ProcessingError);
}

impl<F> Listener for F
where
    F: Fn(ProcessingError) + Send + Sync,
{
    fn on_error(&self, error: ProcessingError) {
        self(error)
    }
}

/// Listener that only logs. Useful when the embedding pipeline polls
/// [`TaskExecutor::is_cancelling`](crate::TaskExecutor::is_cancelling) instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl Listener for LoggingListener {
    fn on_error(&self, error: ProcessingError) {
        tracing::error!(kind = ?error.kind(), "task executor failure: {}", error);
    }
}
