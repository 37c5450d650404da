//! Process-wide worker pool for tile tasks.
//!
//! The pool is built on first use with one thread per CPU, or with the
//! count passed to [`configure`] beforehand. It lives for the rest of the
//! process.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::{CompressionError, Result};

static POOL: OnceLock<ThreadPool> = OnceLock::new();
static REQUESTED_THREADS: AtomicUsize = AtomicUsize::new(0);

/// Sets the number of worker threads. Only effective before the pool has
/// run its first task.
pub fn configure(num_threads: usize) -> Result<()> {
    if num_threads == 0 {
        return Err(CompressionError::InvalidArgument(
            "worker pool needs at least one thread".to_string(),
        ));
    }
    if POOL.get().is_some() {
        return Err(CompressionError::InvalidArgument(
            "worker pool is already running".to_string(),
        ));
    }
    REQUESTED_THREADS.store(num_threads, Ordering::Relaxed);
    Ok(())
}

/// The shared pool, started on first call.
pub fn get() -> Result<&'static ThreadPool> {
    if let Some(pool) = POOL.get() {
        return Ok(pool);
    }

    let requested = REQUESTED_THREADS.load(Ordering::Relaxed);
    let num_threads = if requested == 0 { num_cpus::get() } else { requested };
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|index| format!("fitscomp-tile-{}", index))
        .build()?;
    tracing::debug!(num_threads, "started tile worker pool");

    // A racing first call may have won; its pool is kept.
    Ok(POOL.get_or_init(|| pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_threads_rejected() {
        assert!(configure(0).is_err());
    }

    #[test]
    fn test_pool_runs_tasks() {
        let pool = get().unwrap();
        assert!(pool.current_num_threads() >= 1);
        let (tx, rx) = std::sync::mpsc::channel();
        pool.spawn_fifo(move || tx.send(7).unwrap());
        assert_eq!(rx.recv().unwrap(), 7);
        assert!(configure(2).is_err());
    }
}
