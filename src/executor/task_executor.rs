//! Serial task executor with high-priority overrides.
//!
//! [`TaskExecutor`] runs every task on one [`ExecutionContext`], one at a
//! time. Ordinary tasks run in submission order. Tasks submitted with
//! [`TaskExecutor::submit_with_high_priority`] go to an override queue that is
//! drained before the body of the next scheduled unit runs, so they overtake
//! ordinary work that has not started yet.
//!
//! The first task failure sets a cancellation flag and is reported once to the
//! [`Listener`]. While the flag is set nothing new is admitted and queued
//! ordinary units are skipped. [`TaskExecutor::flush`] clears the flag,
//! [`TaskExecutor::release`] sets it for good.
//!
//! All public methods may be called from any thread.

use super::panic_handler::run_guarded;
use super::stats::{ExecutorStats, StatsSnapshot};
use super::task::Task;
use super::worker::{ExecutionContext, Job, SerialWorker};
use crate::config::ExecutorConfig;
use crate::error::{Error, ProcessingError, Result};
use crate::listener::Listener;
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Whether a scheduled unit may run while cancellation is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitKind {
    Ordinary,
    FlushOrRelease,
}

thread_local! {
    // Set while this thread hands a job to the context under the state lock.
    static SCHEDULING: Cell<bool> = const { Cell::new(false) };
    // Set by a job that found itself running inside that call.
    static RAN_INLINE: Cell<bool> = const { Cell::new(false) };
}

struct SchedulingGuard;

impl SchedulingGuard {
    fn enter() -> Self {
        SCHEDULING.with(|flag| flag.set(true));
        SchedulingGuard
    }
}

impl Drop for SchedulingGuard {
    fn drop(&mut self) {
        SCHEDULING.with(|flag| flag.set(false));
    }
}

struct State {
    high_priority: VecDeque<Task>,
    should_cancel: bool,
    released: bool,
}

struct Shared {
    // Held only for flag checks and queue push/pop, never while a task runs.
    state: Mutex<State>,
    // Serializes listener callbacks. Separate from `state`, which is never
    // held during a callback.
    notify_lock: Mutex<()>,
    listener: Arc<dyn Listener>,
    stats: ExecutorStats,
}

/// Serial executor for GPU/CPU work with high-priority overrides, flush and
/// release. See the [module docs](self) for the execution model.
pub struct TaskExecutor {
    shared: Arc<Shared>,
    context: Arc<dyn ExecutionContext>,
    owns_context: bool,
    release_timeout: Duration,
}

impl TaskExecutor {
    /// Creates an executor with its own [`SerialWorker`] thread. `release`
    /// shuts that thread down.
    pub fn new<L>(config: ExecutorConfig, listener: L) -> Result<Self>
    where
        L: Listener + 'static,
    {
        let worker = SerialWorker::new(&config)?;
        Self::with_context(Arc::new(worker), true, &config, listener)
    }

    /// Creates an executor on a caller-supplied context.
    ///
    /// With `owns_context == false`, `release` only runs the cleanup task and
    /// leaves the context alive.
    pub fn with_context<L>(
        context: Arc<dyn ExecutionContext>,
        owns_context: bool,
        config: &ExecutorConfig,
        listener: L,
    ) -> Result<Self>
    where
        L: Listener + 'static,
    {
        config.validate()?;

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    high_priority: VecDeque::new(),
                    should_cancel: false,
                    released: false,
                }),
                notify_lock: Mutex::new(()),
                listener: Arc::new(listener),
                stats: ExecutorStats::new(),
            }),
            context,
            owns_context,
            release_timeout: config.release_timeout,
        })
    }

    /// Schedules `task` after all pending work. Never blocks.
    ///
    /// Silently dropped while cancellation is in effect. A failure inside the
    /// task goes to the listener, not to the caller.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.submit_task(Task::new(task));
    }

    /// Schedules `task` like [`submit`](Self::submit) and blocks until it has
    /// been attempted.
    ///
    /// Returns `Ok(())` if the task succeeded or was dropped because the
    /// executor is cancelling. A failure is reported to the listener and also
    /// returned here.
    ///
    /// Must not be called from the worker thread.
    pub fn submit_and_wait<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        if self.context.is_current() {
            return Err(Error::executor(
                "submit_and_wait called from the worker thread",
            ));
        }

        let (done_tx, done_rx) = bounded(1);
        let scheduled = {
            let state = self.shared.state.lock();
            if state.should_cancel {
                return Ok(());
            }
            self.execute_locked(wrap(
                self.shared.clone(),
                Task::new(task),
                UnitKind::Ordinary,
                Some(done_tx),
            ))
        };

        if let Err(e) = scheduled {
            tracing::warn!("task rejected by execution context: {}", e);
            self.shared.handle_error(e.clone());
            return Err(e);
        }

        match done_rx.recv() {
            Ok(result) => result,
            Err(_) => {
                let e = Error::interrupted("task discarded before it ran");
                self.shared.handle_error(e.clone());
                Err(e)
            }
        }
    }

    /// Queues `task` ahead of all ordinary work that has not started yet.
    ///
    /// It runs after the currently running unit and after any high-priority
    /// task queued before it. Dropped while cancellation is in effect.
    pub fn submit_with_high_priority<F>(&self, task: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        {
            let mut state = self.shared.state.lock();
            if state.should_cancel {
                return;
            }
            state.high_priority.push_back(Task::new(task));
        }
        // Queued ordinary units drain the override queue anyway; this one
        // covers the case where nothing else is scheduled.
        self.submit_task(Task::noop());
    }

    /// Discards all pending work and waits until the worker has caught up.
    ///
    /// Submissions made while the flush is in progress are dropped. When this
    /// returns `Ok`, the executor accepts work again, even if it had been
    /// cancelled by a failure.
    ///
    /// Must not be called from the worker thread.
    pub fn flush(&self) -> Result<()> {
        if self.context.is_current() {
            return Err(Error::executor("flush called from the worker thread"));
        }

        let discarded = {
            let mut state = self.shared.state.lock();
            if state.released {
                return Err(Error::Released);
            }
            state.should_cancel = true;
            std::mem::take(&mut state.high_priority)
        };
        tracing::debug!(
            discarded_high_priority = discarded.len(),
            "flush started"
        );
        drop(discarded);

        let (done_tx, done_rx) = bounded::<()>(1);
        let shared = self.shared.clone();
        let sentinel = Task::new(move || {
            shared.finish_flush();
            let _ = done_tx.send(());
            Ok(())
        });

        self.context.execute(wrap(
            self.shared.clone(),
            sentinel,
            UnitKind::FlushOrRelease,
            None,
        ))?;

        done_rx
            .recv()
            .map_err(|_| Error::interrupted("flush sentinel discarded before it ran"))?;

        tracing::debug!("flush finished");
        Ok(())
    }

    /// Cancels all pending work for good and runs `cleanup` on the worker.
    ///
    /// If the executor owns its context, the context is shut down and given
    /// the configured release timeout to terminate. Missing that deadline is
    /// reported to the listener as [`Error::ReleaseTimeout`]; this method
    /// still returns normally.
    pub fn release<F>(&self, cleanup: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let discarded = {
            let mut state = self.shared.state.lock();
            state.should_cancel = true;
            state.released = true;
            std::mem::take(&mut state.high_priority)
        };
        tracing::debug!(
            discarded_high_priority = discarded.len(),
            owns_context = self.owns_context,
            "release started"
        );
        drop(discarded);

        if let Err(e) = self.context.execute(wrap(
            self.shared.clone(),
            Task::new(cleanup),
            UnitKind::FlushOrRelease,
            None,
        )) {
            tracing::warn!("release task not scheduled: {}", e);
        }

        if !self.owns_context {
            return;
        }

        self.context.shutdown();

        if self.context.is_current() {
            tracing::debug!("release called on the worker thread, not waiting for termination");
            return;
        }

        if !self.context.await_termination(self.release_timeout) {
            tracing::warn!(
                timeout_ms = self.release_timeout.as_millis() as u64,
                "worker did not terminate in time"
            );
            self.shared
                .notify(Error::ReleaseTimeout(self.release_timeout));
        }
    }

    /// Whether cancellation is in effect, after a failure, during a flush or
    /// after release.
    pub fn is_cancelling(&self) -> bool {
        self.shared.state.lock().should_cancel
    }

    /// Whether `release` has been called. Permanent once true.
    pub fn is_released(&self) -> bool {
        self.shared.state.lock().released
    }

    /// Number of high-priority tasks waiting to be drained.
    pub fn pending_high_priority(&self) -> usize {
        self.shared.state.lock().high_priority.len()
    }

    /// Whether `release` shuts the execution context down.
    pub fn owns_context(&self) -> bool {
        self.owns_context
    }

    /// Grace period `release` gives an owned context to terminate.
    pub fn release_timeout(&self) -> Duration {
        self.release_timeout
    }

    /// Snapshot of the executor's counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    fn submit_task(&self, task: Task) {
        let scheduled = {
            let state = self.shared.state.lock();
            if state.should_cancel {
                return;
            }
            // Scheduling under the lock keeps admitted units ahead of any
            // flush sentinel queued after the flag flips.
            self.execute_locked(wrap(self.shared.clone(), task, UnitKind::Ordinary, None))
        };

        if let Err(e) = scheduled {
            tracing::warn!("task rejected by execution context: {}", e);
            self.shared.handle_error(e);
        }
    }

    /// Hands `job` to the context while the caller holds the state lock.
    ///
    /// A context that runs the job inside `execute` would re-enter that lock.
    /// The job notices, bails out before touching any shared state, and the
    /// call is reported as [`Error::Executor`].
    fn execute_locked(&self, job: Job) -> Result<()> {
        let result = {
            let _guard = SchedulingGuard::enter();
            self.context.execute(job)
        };

        if RAN_INLINE.with(|flag| flag.replace(false)) {
            return Err(Error::executor(
                "execution context ran a job inside execute()",
            ));
        }
        result
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("TaskExecutor")
            .field("owns_context", &self.owns_context)
            .field("release_timeout", &self.release_timeout)
            .field("should_cancel", &state.should_cancel)
            .field("released", &state.released)
            .field("pending_high_priority", &state.high_priority.len())
            .finish()
    }
}

fn wrap(
    shared: Arc<Shared>,
    task: Task,
    kind: UnitKind,
    done: Option<Sender<Result<()>>>,
) -> Job {
    Box::new(move || {
        if SCHEDULING.with(Cell::get) {
            RAN_INLINE.with(|flag| flag.set(true));
            return;
        }
        let result = shared.run_unit(task, kind);
        if let Some(done) = done {
            let _ = done.send(result);
        }
    })
}

impl Shared {
    fn run_unit(&self, task: Task, kind: UnitKind) -> Result<()> {
        if kind == UnitKind::Ordinary && self.state.lock().should_cancel {
            self.stats.record_unit_skipped();
            return Ok(());
        }
        self.stats.record_unit_executed();

        let result = self
            .drain_high_priority()
            .and_then(|()| run_guarded(|| task.run()));

        if let Err(e) = &result {
            self.handle_error(e.clone());
        }
        result
    }

    fn drain_high_priority(&self) -> Result<()> {
        loop {
            let next = self.state.lock().high_priority.pop_front();
            match next {
                Some(task) => {
                    run_guarded(|| task.run())?;
                    self.stats.record_high_priority_executed();
                }
                None => return Ok(()),
            }
        }
    }

    fn finish_flush(&self) {
        let mut state = self.state.lock();
        if !state.released {
            state.should_cancel = false;
        }
        self.stats.record_flush_completed();
    }

    fn handle_error(&self, error: Error) {
        {
            let mut state = self.state.lock();
            if state.should_cancel {
                // Most likely a consequence of the failure that set the flag.
                tracing::debug!("suppressing error while cancelling: {}", error);
                self.stats.record_failure_suppressed();
                return;
            }
            state.should_cancel = true;
        }

        tracing::error!("task failed, cancelling pending work: {}", error);
        self.notify(error);
    }

    /// The only path to the listener. Callbacks never overlap.
    fn notify(&self, error: Error) {
        let _serial = self.notify_lock.lock();
        self.stats.record_failure_reported();
        self.listener.on_error(ProcessingError::from(error));
    }
}
