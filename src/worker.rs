//! A parkable OS thread driven by a repeatedly-invoked step closure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::error::PipelineError;

/// Synchronization half of a worker thread: the park/unpark flags, held
/// independently of the step logic so a [`crate::pipeline::Pipeline`] can
/// `enable`/`disable`/`destroy` a stage without knowing what it does.
#[derive(Debug, Default)]
pub struct Worker {
    enabled: AtomicBool,
    destroyed: AtomicBool,
    mutex: Mutex<()>,
    cv: Condvar,
}

impl Worker {
    /// A new, disabled, non-destroyed worker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            mutex: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    /// Wakes the loop to start running its step closure.
    pub fn enable(&self) {
        let guard = self.mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.enabled.store(true, Ordering::SeqCst);
        self.cv.notify_all();
        drop(guard);
    }

    /// Parks the loop again without tearing down the thread; state held by
    /// the step closure (buffers in flight) is left untouched.
    pub fn disable(&self) {
        let guard = self.mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.enabled.store(false, Ordering::SeqCst);
        self.cv.notify_all();
        drop(guard);
    }

    /// Terminal stop: the loop exits on its next wake and will not resume.
    pub fn destroy(&self) {
        let guard = self.mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.destroyed.store(true, Ordering::SeqCst);
        self.cv.notify_all();
        drop(guard);
    }

    /// True once [`destroy`](Self::destroy) has been called.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// True if currently enabled (and not destroyed).
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn wait_while_parked(&self) {
        let guard = self.mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _guard = self
            .cv
            .wait_while(guard, |()| {
                !self.enabled.load(Ordering::SeqCst) && !self.destroyed.load(Ordering::SeqCst)
            })
            .unwrap_or_else(std::sync::PoisonError::into_inner);
    }
}

/// Spawns an OS thread that runs `step` repeatedly whenever the returned
/// [`Worker`] is enabled, parking in between and exiting for good once
/// [`Worker::destroy`] is called.
///
/// # Errors
///
/// Returns [`PipelineError::ThrdError`] if the underlying
/// `std::thread::Builder::spawn` call fails.
pub fn spawn_worker<F>(name: &str, mut step: F) -> Result<(Arc<Worker>, JoinHandle<()>), PipelineError>
where
    F: FnMut() + Send + 'static,
{
    let worker = Arc::new(Worker::new());
    let loop_worker = Arc::clone(&worker);
    let handle = std::thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || loop {
            loop_worker.wait_while_parked();
            if loop_worker.is_destroyed() {
                return;
            }
            step();
        })
        .map_err(|_| PipelineError::ThrdError)?;
    Ok((worker, handle))
}
