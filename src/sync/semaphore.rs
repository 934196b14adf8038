//! A blocking counting semaphore.
//!
//! `std` has no portable blocking semaphore, so this crate rolls its own on
//! top of a `Mutex<usize>` and a `Condvar`, the same substitution this
//! crate's futex word makes for the lack of a portable futex syscall.
//!
//! # Design
//!
//! The count lives behind the mutex; `release` bumps it and notifies,
//! `acquire`/`try_acquire_for` wait while it is zero and then decrement it
//! atomically with the wake-up. This gives the same semantics as a POSIX
//! named semaphore's `sem_post`/`sem_wait`/`sem_timedwait` triad, including
//! bursts: releasing `n` permits at once wakes up to `n` waiters.
//!
//! # Thread Safety
//!
//! `Semaphore` is `Send + Sync` and meant to be shared behind an `Arc`. Every
//! operation is short: at most one mutex acquisition plus, on the waiting
//! path, blocking on the condition variable.
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A counting semaphore with a timed acquire, the pipeline's stand-in for
/// the original library's platform semaphore (`sem_t` / `HANDLE`).
#[derive(Debug)]
pub struct Semaphore {
    count: Mutex<usize>,
    cv: Condvar,
}

impl Semaphore {
    /// Creates a semaphore with the given initial permit count.
    #[must_use]
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            cv: Condvar::new(),
        }
    }

    /// Releases `n` permits, waking any waiters blocked on them.
    pub fn release(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut count = self.count.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *count += n;
        if n == 1 {
            self.cv.notify_one();
        } else {
            self.cv.notify_all();
        }
    }

    /// Blocks until a permit is available, then takes it.
    pub fn acquire(&self) {
        let mut count = self.count.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        while *count == 0 {
            count = self.cv.wait(count).unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        *count -= 1;
    }

    /// Blocks up to `timeout` for a permit. Returns `true` if one was taken.
    ///
    /// Mirrors `sem_timedwait`'s absolute-deadline loop, but expressed with
    /// `Condvar::wait_timeout_while` instead of hand-computing a `timespec`.
    pub fn try_acquire_for(&self, timeout: Duration) -> bool {
        let guard = self.count.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let (mut count, _) = self
            .cv
            .wait_timeout_while(guard, timeout, |count| *count == 0)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// Current permit count, useful for diagnostics and tests.
    #[must_use]
    pub fn available(&self) -> usize {
        *self.count.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
