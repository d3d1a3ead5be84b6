//! # Lock Acquisition for Multi-Storage Operations
//!
//! Component storages are locked independently. An operation that needs
//! several write locks at once (a mutable join) must never hold one of them
//! while blocking on another, or two joins over the same types in a
//! different order could wait on each other forever.
//!
//! ```text
//! Join 1: write(Position) ... wants write(Velocity)
//! Join 2: write(Velocity) ... wants write(Position)   <- DEADLOCK
//! ```
//!
//! [`acquire_all`] takes every lock with `try_write`, and on any failure
//! drops the ones it got, backs off, and retries.
//!
//! That covers lock acquisition only. A callback running under storage
//! locks that then writes to another storage reopens the cycle:
//!
//! ```text
//! Thread 1: join over Position, callback writes Velocity
//! Thread 2: join over Velocity, callback writes Position   <- DEADLOCK
//! ```
//!
//! [`CallbackScope`] marks the stretch of a thread that runs such callbacks,
//! and registry writes check [`in_callback`] to fail fast instead.

use std::cell::Cell;
use std::hint;
use std::thread;

/// Spins before the backoff starts yielding the thread.
const SPIN_LIMIT: u32 = 6;

/// Retries `attempt` until it returns `Some`, backing off between tries.
///
/// `attempt` must release everything it acquired before returning `None`.
pub fn acquire_all<G>(mut attempt: impl FnMut() -> Option<G>) -> G {
    let mut step = 0;
    loop {
        if let Some(guards) = attempt() {
            return guards;
        }
        if step < SPIN_LIMIT {
            for _ in 0..(1 << step) {
                hint::spin_loop();
            }
            step += 1;
        } else {
            thread::yield_now();
        }
    }
}

thread_local! {
    /// Callbacks running under registry locks on this thread.
    static CALLBACK_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as running a callback under registry locks.
///
/// Scopes nest; the mark is lifted when the outermost one is dropped,
/// unwinding included.
#[derive(Debug)]
pub struct CallbackScope {
    _private: (),
}

impl CallbackScope {
    /// Enters a callback scope on the current thread.
    #[must_use]
    pub fn enter() -> Self {
        CALLBACK_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self { _private: () }
    }
}

impl Drop for CallbackScope {
    fn drop(&mut self) {
        CALLBACK_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

/// Checks whether the current thread is inside a [`CallbackScope`].
#[inline]
#[must_use]
pub fn in_callback() -> bool {
    CALLBACK_DEPTH.with(|depth| depth.get() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_acquires_immediately_when_free() {
        let a = RwLock::new(1);
        let b = RwLock::new(2);
        let (mut ga, gb) = acquire_all(|| match (a.try_write(), b.try_write()) {
            (Some(ga), Some(gb)) => Some((ga, gb)),
            _ => None,
        });
        *ga += *gb;
        drop(ga);
        drop(gb);
        assert_eq!(*a.read(), 3);
    }

    #[test]
    fn test_callback_scopes_nest() {
        assert!(!in_callback());
        {
            let _outer = CallbackScope::enter();
            {
                let _inner = CallbackScope::enter();
                assert!(in_callback());
            }
            assert!(in_callback());
        }
        assert!(!in_callback());
    }

    #[test]
    fn test_callback_scope_is_lifted_on_unwind() {
        let outcome = std::panic::catch_unwind(|| {
            let _scope = CallbackScope::enter();
            panic!("callback failed");
        });
        assert!(outcome.is_err());
        assert!(!in_callback());
    }

    #[test]
    fn test_callback_scope_is_per_thread() {
        let _scope = CallbackScope::enter();
        assert!(!thread::spawn(in_callback).join().unwrap());
    }

    #[test]
    fn test_waits_for_release() {
        let lock = Arc::new(RwLock::new(0));
        let held = lock.write();

        let worker = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let mut guard = acquire_all(|| lock.try_write());
                *guard += 1;
            })
        };

        thread::sleep(Duration::from_millis(20));
        drop(held);
        worker.join().unwrap();
        assert_eq!(*lock.read(), 1);
    }
}
