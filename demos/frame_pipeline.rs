//! Frame pipeline example
//!
//! Draw calls go through `submit`, texture returns jump the queue with
//! `submit_with_high_priority`, a seek flushes, and the pipeline is released
//! at the end. Run with `RUST_LOG=taskline=debug` to see executor logs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use taskline::prelude::*;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== Frame Pipeline Example ===\n");

    let config = ExecutorConfig::builder()
        .thread_name("gl-thread")
        .release_timeout(Duration::from_millis(500))
        .build()?;
    let executor = TaskExecutor::new(config, |error: ProcessingError| {
        eprintln!("[pipeline] error ({:?}): {}", error.kind(), error);
    })?;

    let frames_drawn = Arc::new(AtomicU64::new(0));

    for frame in 0..30u64 {
        let drawn = frames_drawn.clone();
        executor.submit(move || {
            thread::sleep(Duration::from_millis(2));
            drawn.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });

        if frame % 10 == 9 {
            executor.submit_with_high_priority(move || {
                println!("[pipeline] output texture for frame {} returned", frame);
                Ok(())
            });
        }
    }

    println!("Seeking: flushing pending frames...");
    executor.flush()?;
    println!(
        "Frames drawn before seek: {}",
        frames_drawn.load(Ordering::Relaxed)
    );

    executor.submit_and_wait(|| {
        println!("[pipeline] first frame after seek");
        Ok(())
    })?;

    executor.submit(|| Err(Error::gl_context("glTexImage2D: GL_OUT_OF_MEMORY")));
    executor.submit(|| {
        println!("[pipeline] this frame is never drawn");
        Ok(())
    });

    executor.release(|| {
        println!("[pipeline] deleting GL programs and framebuffers");
        Ok(())
    });

    let stats = executor.stats();
    println!("\n{:#?}", stats);

    Ok(())
}
