//! A condition-variable-backed stand-in for a raw futex word.
//!
//! Stable `std` does not expose `FUTEX_WAIT`/`WaitOnAddress`. Per-stage idle
//! signaling only needs "block until this word changes" semantics, so a
//! `Mutex<()>` paired with the flag and a `Condvar` gets the same observable
//! behavior without depending on a platform syscall.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};

/// A single-word idle/done flag with blocking wait.
///
/// Used for each stage's `done` word and the pipeline's `destroying` word.
/// `0` means "processing" (or "not destroying"); any nonzero value means
/// "idle" (or "destroying").
#[derive(Debug)]
pub struct FutexWord {
    value: AtomicU32,
    notify_lock: Mutex<()>,
    cv: Condvar,
}

impl FutexWord {
    /// Creates a word initialized to `0`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: AtomicU32::new(0),
            notify_lock: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    /// Reads the current value.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.value.load(Ordering::SeqCst)
    }

    /// Sets the word to `1` and wakes every waiter.
    pub fn set(&self) {
        let _guard = self.notify_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.value.store(1, Ordering::SeqCst);
        self.cv.notify_all();
    }

    /// Sets the word to `0` and wakes every waiter.
    pub fn unset(&self) {
        let _guard = self.notify_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.value.store(0, Ordering::SeqCst);
        self.cv.notify_all();
    }

    /// Blocks while the word still equals `val`.
    pub fn wait_while(&self, val: u32) {
        if self.value.load(Ordering::SeqCst) != val {
            return;
        }
        let guard = self.notify_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _guard = self
            .cv
            .wait_while(guard, |()| self.value.load(Ordering::SeqCst) == val)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
    }
}

impl Default for FutexWord {
    fn default() -> Self {
        Self::new()
    }
}
