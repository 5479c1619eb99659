//! Process-wide worker pool, sized from the `LASPP_NUM_THREADS` environment
//! variable and cached across calls.
//!
//! `num_threads()` parses `LASPP_NUM_THREADS` defensively (it must parse
//! fully as a positive integer or the hardware concurrency is used instead),
//! and `install()` dispatches onto a mutex-guarded lazy singleton
//! [`rayon::ThreadPool`], rebuilt only when the observed thread count
//! changes. The mutex only ever guards the pool-holder check/rebuild; the
//! pool itself is reference-counted so the lock is released before any
//! blocking dispatch runs on it, letting independent callers share the pool
//! concurrently instead of serializing on each other's work.

use std::sync::{Arc, Mutex};

/// Reads `LASPP_NUM_THREADS`, falling back to the available parallelism
/// when unset, empty, not fully numeric, or non-positive.
pub fn num_threads() -> usize {
    if let Ok(val) = std::env::var("LASPP_NUM_THREADS") {
        if let Ok(n) = val.trim().parse::<i64>() {
            if n > 0 && val.trim().len() == val.len() {
                return n as usize;
            }
        }
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1)
}

struct CachedPool {
    pool: Arc<rayon::ThreadPool>,
    thread_count: usize,
}

static POOL: Mutex<Option<CachedPool>> = Mutex::new(None);

/// Returns the process-wide worker pool, rebuilding it first if
/// `LASPP_NUM_THREADS` has changed since the last call. The mutex is held
/// only for the duration of this check/rebuild.
fn shared_pool() -> Arc<rayon::ThreadPool> {
    let current = num_threads();
    let mut guard = POOL.lock().unwrap_or_else(|e| e.into_inner());

    let needs_rebuild = match &*guard {
        Some(cached) => cached.thread_count != current,
        None => true,
    };

    if needs_rebuild {
        log::debug!("building worker pool with {} threads", current);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(current)
            .build()
            .expect("failed to build worker pool");
        *guard = Some(CachedPool {
            pool: Arc::new(pool),
            thread_count: current,
        });
    }

    guard.as_ref().expect("pool just built").pool.clone()
}

/// Runs `f` on the process-wide worker pool, rebuilding it first if
/// `LASPP_NUM_THREADS` has changed since the last call. The pool-holder
/// mutex is released before `f` is dispatched, so concurrent callers run on
/// the shared pool in parallel rather than serializing on each other.
pub fn install<F, R>(f: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    let pool = shared_pool();
    pool.install(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_threads_falls_back_when_env_is_garbage() {
        std::env::remove_var("LASPP_NUM_THREADS");
        assert!(num_threads() >= 1);
    }

    #[test]
    fn num_threads_honors_explicit_override() {
        std::env::set_var("LASPP_NUM_THREADS", "3");
        assert_eq!(num_threads(), 3);
        std::env::remove_var("LASPP_NUM_THREADS");
    }

    #[test]
    fn num_threads_rejects_trailing_garbage() {
        std::env::set_var("LASPP_NUM_THREADS", "3abc");
        assert_ne!(num_threads(), 3);
        std::env::remove_var("LASPP_NUM_THREADS");
    }

    #[test]
    fn install_runs_closure_and_rebuilds_on_change() {
        std::env::remove_var("LASPP_NUM_THREADS");
        let result = install(|| 1 + 1);
        assert_eq!(result, 2);
    }
}
