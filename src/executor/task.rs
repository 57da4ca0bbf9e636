//! Task representation and execution.

use crate::error::Result;

/// A unit of work for the executor.
///
/// Tasks carry no identity beyond their queue position. They run once, are
/// never retried and are dropped after execution.
pub struct Task {
    func: Box<dyn FnOnce() -> Result<()> + Send + 'static>,
}

impl Task {
    /// Wraps a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Task { func: Box::new(f) }
    }

    /// Task that does nothing. Scheduling one still drains the high-priority
    /// queue when it runs.
    pub fn noop() -> Self {
        Task::new(|| Ok(()))
    }

    /// Runs the task, consuming it.
    pub fn run(self) -> Result<()> {
        (self.func)()
    }
}

impl<F> From<F> for Task
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    fn from(f: F) -> Self {
        Task::new(f)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}
