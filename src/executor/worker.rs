//! Single worker thread and the context trait the executor schedules onto.

use crate::config::ExecutorConfig;
use crate::error::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

/// A scheduled unit as seen by an execution context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A single-concurrency execution context.
///
/// Implementations must run jobs strictly one at a time, in the order
/// `execute` accepted them.
pub trait ExecutionContext: Send + Sync {
    /// Queues `job` behind everything already accepted. Returns
    /// [`Error::Rejected`] once the context is shut down.
    ///
    /// `execute` must only enqueue: it must not block waiting for capacity
    /// and must not run `job` on the calling thread. The executor calls it
    /// while holding its state lock; a job run inline is detected, dropped,
    /// and reported as [`Error::Executor`].
    fn execute(&self, job: Job) -> Result<()>;

    /// Stops accepting jobs. Jobs already accepted still run.
    fn shutdown(&self);

    /// Waits up to `timeout` for the context to finish its backlog and stop.
    /// Returns `false` if it is still running.
    fn await_termination(&self, timeout: Duration) -> bool;

    /// Whether the calling thread is the one running this context's jobs.
    /// Defaults to `false`.
    fn is_current(&self) -> bool {
        false
    }
}

/// Dedicated OS thread consuming a FIFO channel of jobs.
pub struct SerialWorker {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    // Disconnects when the worker thread exits.
    terminated: Receiver<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl SerialWorker {
    /// Spawns the worker thread named and sized per `config`.
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        config.validate()?;

        let (job_tx, job_rx) = unbounded::<Job>();
        let (done_tx, done_rx) = unbounded::<()>();
        let name = config.thread_name.clone();

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let thread = builder
            .spawn(move || {
                let _terminated = done_tx;
                worker_loop(job_rx);
            })
            .map_err(|e| Error::executor(format!("spawn failed: {}", e)))?;

        let thread_id = thread.thread().id();

        Ok(Self {
            name,
            sender: Mutex::new(Some(job_tx)),
            terminated: done_rx,
            thread: Mutex::new(Some(thread)),
            thread_id,
        })
    }

    /// Name of the worker thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether [`shutdown`](ExecutionContext::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().is_none()
    }
}

fn worker_loop(jobs: Receiver<Job>) {
    tracing::debug!("worker thread started");

    for job in jobs.iter() {
        // Executor jobs never unwind; foreign jobs must not kill the thread.
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::warn!("job panicked on worker thread");
        }
    }

    tracing::debug!("worker thread exiting");
}

impl ExecutionContext for SerialWorker {
    fn execute(&self, job: Job) -> Result<()> {
        match self.sender.lock().as_ref() {
            Some(tx) => tx
                .send(job)
                .map_err(|_| Error::rejected(format!("{} has exited", self.name))),
            None => Err(Error::rejected(format!("{} is shut down", self.name))),
        }
    }

    fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            tracing::debug!(worker = %self.name, "worker shutdown requested");
        }
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        match self.terminated.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.thread.lock().take() {
                    let _ = handle.join();
                }
                true
            }
        }
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for SerialWorker {
    fn drop(&mut self) {
        // Queued jobs still drain; the thread exits on its own afterwards.
        self.shutdown();
    }
}

impl std::fmt::Debug for SerialWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialWorker")
            .field("name", &self.name)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
