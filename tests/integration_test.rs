use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use taskline::prelude::*;

type Errors = Arc<Mutex<Vec<ProcessingError>>>;

fn executor_with_config(config: ExecutorConfig) -> (TaskExecutor, Errors) {
    let errors: Errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let executor = TaskExecutor::new(config, move |e: ProcessingError| {
        sink.lock().push(e);
    })
    .unwrap();
    (executor, errors)
}

fn executor() -> (TaskExecutor, Errors) {
    executor_with_config(ExecutorConfig::default())
}

fn wait_until<F: Fn() -> bool>(cond: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Occupies the worker until the returned sender is used (or dropped).
fn block_worker(executor: &TaskExecutor) -> crossbeam_channel::Sender<()> {
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
    executor.submit(move || {
        let _ = started_tx.send(());
        let _ = release_rx.recv();
        Ok(())
    });
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    release_tx
}

fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> impl FnOnce() -> Result<()> + Send + 'static {
    let log = log.clone();
    move || {
        log.lock().push(name);
        Ok(())
    }
}

#[test]
fn test_submit_preserves_fifo_order() {
    let (executor, errors) = executor();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let active = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicBool::new(false));

    for i in 0..500 {
        let seen = seen.clone();
        let active = active.clone();
        let overlap = overlap.clone();
        executor.submit(move || {
            if active.fetch_add(1, Ordering::SeqCst) != 0 {
                overlap.store(true, Ordering::SeqCst);
            }
            seen.lock().push(i);
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });
    }
    executor.submit_and_wait(|| Ok(())).unwrap();

    assert_eq!(*seen.lock(), (0..500).collect::<Vec<_>>());
    assert!(!overlap.load(Ordering::SeqCst));
    assert!(errors.lock().is_empty());
    executor.release(|| Ok(()));
}

#[test]
fn test_high_priority_overtakes_queued_work() {
    let (executor, errors) = executor();
    let log = Arc::new(Mutex::new(Vec::new()));

    let gate = block_worker(&executor);
    executor.submit(recorder(&log, "a"));
    executor.submit(recorder(&log, "b"));
    executor.submit_with_high_priority(recorder(&log, "h1"));
    executor.submit_with_high_priority(recorder(&log, "h2"));
    assert_eq!(executor.pending_high_priority(), 2);

    gate.send(()).unwrap();
    executor.submit_and_wait(|| Ok(())).unwrap();

    assert_eq!(*log.lock(), vec!["h1", "h2", "a", "b"]);
    assert_eq!(executor.pending_high_priority(), 0);
    assert_eq!(executor.stats().high_priority_executed, 2);
    assert!(errors.lock().is_empty());
    executor.release(|| Ok(()));
}

#[test]
fn test_high_priority_waits_for_running_task() {
    let (executor, _errors) = executor();
    let log = Arc::new(Mutex::new(Vec::new()));

    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
    let running_log = log.clone();
    executor.submit(move || {
        let _ = started_tx.send(());
        let _ = release_rx.recv();
        running_log.lock().push("running");
        Ok(())
    });
    started_rx.recv().unwrap();

    executor.submit_with_high_priority(recorder(&log, "urgent"));
    release_tx.send(()).unwrap();
    executor.submit_and_wait(|| Ok(())).unwrap();

    assert_eq!(*log.lock(), vec!["running", "urgent"]);
    executor.release(|| Ok(()));
}

#[test]
fn test_high_priority_runs_on_idle_worker() {
    let (executor, _errors) = executor();
    let ran = Arc::new(AtomicBool::new(false));

    let flag = ran.clone();
    executor.submit_with_high_priority(move || {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });

    wait_until(|| ran.load(Ordering::SeqCst));
    executor.release(|| Ok(()));
}

#[test]
fn test_flush_discards_pending_work() {
    let (executor, errors) = executor();
    let executor = Arc::new(executor);
    let log = Arc::new(Mutex::new(Vec::new()));

    let gate = block_worker(&executor);
    executor.submit(recorder(&log, "queued"));
    executor.submit_with_high_priority(recorder(&log, "urgent"));

    let flusher = {
        let executor = executor.clone();
        thread::spawn(move || executor.flush())
    };
    wait_until(|| executor.is_cancelling());

    // Submissions during the flush window are dropped.
    executor.submit(recorder(&log, "during-flush"));
    executor.submit_with_high_priority(recorder(&log, "urgent-during-flush"));
    assert_eq!(executor.pending_high_priority(), 0);

    gate.send(()).unwrap();
    flusher.join().unwrap().unwrap();

    assert!(!executor.is_cancelling());
    executor.submit_and_wait(recorder(&log, "after")).unwrap();

    assert_eq!(*log.lock(), vec!["after"]);
    assert!(errors.lock().is_empty());
    assert_eq!(executor.stats().flushes_completed, 1);
    executor.release(|| Ok(()));
}

#[test]
fn test_failure_stops_later_tasks() {
    let (executor, errors) = executor();
    let ran_b = Arc::new(AtomicBool::new(false));

    executor.submit(|| Err(Error::gl_context("glFramebufferTexture2D failed")));
    let flag = ran_b.clone();
    executor.submit(move || {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });

    wait_until(|| !errors.lock().is_empty());
    // Let the worker get through anything still queued.
    thread::sleep(Duration::from_millis(50));

    assert!(!ran_b.load(Ordering::SeqCst));
    let errors_seen = errors.lock().clone();
    assert_eq!(errors_seen.len(), 1);
    assert_eq!(errors_seen[0].kind(), FailureKind::GlContext);
    assert!(executor.is_cancelling());

    executor.release(|| Ok(()));
    assert_eq!(errors.lock().len(), 1);
}

#[test]
fn test_failing_high_priority_task_skips_unit_body() {
    let (executor, errors) = executor();
    let ran = Arc::new(AtomicBool::new(false));

    let gate = block_worker(&executor);
    let flag = ran.clone();
    executor.submit(move || {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });
    executor.submit_with_high_priority(|| Err(Error::processing("texture upload failed")));
    gate.send(()).unwrap();

    wait_until(|| !errors.lock().is_empty());
    thread::sleep(Duration::from_millis(20));

    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(errors.lock()[0].kind(), FailureKind::Processing);
    executor.release(|| Ok(()));
}

#[test]
fn test_flush_recovers_after_failure() {
    let (executor, errors) = executor();

    executor.submit(|| Err(Error::processing("decoder hiccup")));
    wait_until(|| !errors.lock().is_empty());
    assert!(executor.is_cancelling());

    executor.flush().unwrap();
    assert!(!executor.is_cancelling());

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    executor
        .submit_and_wait(move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(errors.lock().len(), 1);
    executor.release(|| Ok(()));
}

#[test]
fn test_submit_and_wait_blocks_until_done() {
    let (executor, _errors) = executor();
    let done = Arc::new(AtomicBool::new(false));

    let flag = done.clone();
    executor
        .submit_and_wait(move || {
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    assert!(done.load(Ordering::SeqCst));
    executor.release(|| Ok(()));
}

#[test]
fn test_release_runs_cleanup_after_failure() {
    let (executor, errors) = executor();
    let cleaned_up = Arc::new(AtomicBool::new(false));

    executor.submit(|| Err(Error::processing("shader program invalid")));
    wait_until(|| !errors.lock().is_empty());

    let flag = cleaned_up.clone();
    executor.release(move || {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });

    assert!(cleaned_up.load(Ordering::SeqCst));
    assert!(executor.is_released());
    assert_eq!(errors.lock().len(), 1);
}

#[test]
fn test_release_timeout_is_reported() {
    let config = ExecutorConfig::builder()
        .release_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let (executor, errors) = executor_with_config(config);

    let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
    executor.submit(move || {
        let _ = started_tx.send(());
        thread::sleep(Duration::from_millis(500));
        Ok(())
    });
    started_rx.recv().unwrap();

    let start = Instant::now();
    executor.release(|| Ok(()));
    assert!(start.elapsed() < Duration::from_millis(450));

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_release_timeout());
}

#[test]
fn test_submissions_after_release_are_ignored() {
    let (executor, errors) = executor();
    executor.release(|| Ok(()));

    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let count = ran.clone();
        executor.submit(move || {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let count = ran.clone();
        executor.submit_with_high_priority(move || {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    assert!(executor.submit_and_wait(|| Ok(())).is_ok());

    thread::sleep(Duration::from_millis(20));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(errors.lock().is_empty());
    assert!(matches!(executor.flush(), Err(Error::Released)));
}

#[test]
fn test_borrowed_context_survives_release() {
    let worker = Arc::new(SerialWorker::new(&ExecutorConfig::default()).unwrap());
    let errors: Errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let executor = TaskExecutor::with_context(
        worker.clone(),
        false,
        &ExecutorConfig::default(),
        move |e: ProcessingError| sink.lock().push(e),
    )
    .unwrap();
    assert!(!executor.owns_context());

    let (cleanup_tx, cleanup_rx) = crossbeam_channel::bounded::<()>(1);
    executor.release(move || {
        let _ = cleanup_tx.send(());
        Ok(())
    });
    cleanup_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    assert!(!worker.is_shutdown());
    let (job_tx, job_rx) = crossbeam_channel::bounded::<()>(1);
    worker
        .execute(Box::new(move || {
            let _ = job_tx.send(());
        }))
        .unwrap();
    job_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(errors.lock().is_empty());
}

#[test]
fn test_concurrent_submitters_keep_per_thread_order() {
    let (executor, errors) = executor();
    let executor = Arc::new(executor);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..4)
        .map(|producer| {
            let executor = executor.clone();
            let seen = seen.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    let seen = seen.clone();
                    executor.submit(move || {
                        seen.lock().push((producer, i));
                        Ok(())
                    });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    executor.submit_and_wait(|| Ok(())).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 800);
    for producer in 0..4 {
        let order: Vec<_> = seen
            .iter()
            .filter(|(p, _)| *p == producer)
            .map(|(_, i)| *i)
            .collect();
        assert_eq!(order, (0..200).collect::<Vec<_>>());
    }
    assert!(errors.lock().is_empty());
    executor.release(|| Ok(()));
}

#[test]
fn test_listener_may_call_back_into_executor() {
    let slot: Arc<Mutex<Option<Arc<TaskExecutor>>>> = Arc::new(Mutex::new(None));
    let observed = Arc::new(AtomicBool::new(false));

    let listener_slot = slot.clone();
    let listener_observed = observed.clone();
    let executor = Arc::new(
        TaskExecutor::new(ExecutorConfig::default(), move |_e: ProcessingError| {
            if let Some(executor) = listener_slot.lock().as_ref() {
                listener_observed.store(executor.is_cancelling(), Ordering::SeqCst);
            }
        })
        .unwrap(),
    );
    *slot.lock() = Some(executor.clone());

    executor.submit(|| Err(Error::processing("boom")));
    wait_until(|| observed.load(Ordering::SeqCst));

    slot.lock().take();
    executor.release(|| Ok(()));
}

#[test]
fn test_listener_calls_never_overlap_on_release_timeout() {
    let active = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicBool::new(false));
    let errors: Errors = Arc::new(Mutex::new(Vec::new()));
    let (entered_tx, entered_rx) = crossbeam_channel::bounded::<()>(1);

    let listener = {
        let active = active.clone();
        let overlap = overlap.clone();
        let errors = errors.clone();
        move |e: ProcessingError| {
            if active.fetch_add(1, Ordering::SeqCst) != 0 {
                overlap.store(true, Ordering::SeqCst);
            }
            let _ = entered_tx.try_send(());
            // Keeps the worker busy past the release timeout.
            thread::sleep(Duration::from_millis(300));
            errors.lock().push(e);
            active.fetch_sub(1, Ordering::SeqCst);
        }
    };
    let config = ExecutorConfig::builder()
        .release_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let executor = TaskExecutor::new(config, listener).unwrap();

    executor.submit(|| Err(Error::processing("bad frame")));
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    executor.release(|| Ok(()));

    assert!(!overlap.load(Ordering::SeqCst));
    let errors = errors.lock();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].kind(), FailureKind::Processing);
    assert!(errors[1].is_release_timeout());
}

/// Runs every job on the calling thread, breaking the enqueue-only contract.
struct InlineContext;

impl ExecutionContext for InlineContext {
    fn execute(&self, job: taskline::executor::Job) -> Result<()> {
        job();
        Ok(())
    }

    fn shutdown(&self) {}

    fn await_termination(&self, _timeout: Duration) -> bool {
        true
    }
}

#[test]
fn test_inline_context_is_reported_not_deadlocked() {
    let errors: Errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let executor = Arc::new(
        TaskExecutor::with_context(
            Arc::new(InlineContext),
            false,
            &ExecutorConfig::default(),
            move |e: ProcessingError| sink.lock().push(e),
        )
        .unwrap(),
    );
    let ran = Arc::new(AtomicBool::new(false));

    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
    {
        let executor = executor.clone();
        let ran = ran.clone();
        thread::spawn(move || {
            executor.submit(move || {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            });
            let _ = done_tx.send(());
        });
    }
    done_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("submit did not return");

    assert!(!ran.load(Ordering::SeqCst));
    assert!(executor.is_cancelling());
    {
        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), FailureKind::Scheduling);
    }

    // Flush schedules outside the lock, so it still works inline.
    executor.flush().unwrap();
    assert!(!executor.is_cancelling());
    assert!(matches!(
        executor.submit_and_wait(|| Ok(())),
        Err(Error::Executor(_))
    ));
    executor.release(|| Ok(()));
}
