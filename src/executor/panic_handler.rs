//! Panic isolation for task bodies.

use crate::error::{Error, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Runs `f`, turning a panic into [`Error::Panicked`] so it never unwinds
/// through the worker thread.
pub(crate) fn run_guarded<F>(f: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic_payload) => {
            let panic_info = PanicInfo::from_payload(panic_payload);
            tracing::error!("task panicked: {}", panic_info.message);
            Err(Error::Panicked(panic_info.message))
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PanicInfo {
    pub(crate) message: String,
}

impl PanicInfo {
    fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        Self { message }
    }
}
