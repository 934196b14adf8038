//! Bounded dual-direction channel between adjacent stages.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::buffer::{BufferFifo, BufferPool};
use crate::error::PipelineError;
use crate::sync::Semaphore;

/// A channel of buffer handles shared by two adjacent stages: empty handles
/// flow back through the `pool`, full handles flow forward through the
/// `fifo`. A semaphore tracks how many full handles are waiting.
#[derive(Debug)]
pub struct Pipe<T> {
    pool: Mutex<BufferPool<T>>,
    fifo: Mutex<BufferFifo<T>>,
    semaphore: Semaphore,
    /// Declared capacity as of the last `configure_buffers`/`resize` call.
    /// Used only to assert the pool+fifo conservation invariant in debug
    /// builds; never read on the hot path in release.
    total_buffers: AtomicUsize,
}

impl<T> Pipe<T> {
    /// Creates an empty pipe with no buffer capacity. Call
    /// [`configure_buffers`](Self::configure_buffers) before enabling the
    /// owning pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool: Mutex::new(BufferPool::new()),
            fifo: Mutex::new(BufferFifo::new(0)),
            semaphore: Semaphore::new(0),
            total_buffers: AtomicUsize::new(0),
        }
    }

    /// Asserts `pool.size + fifo.size == total` within `slack` (0, 1, or 2 —
    /// the number of buffers a stage context may be holding mid-process).
    /// Debug-only; a no-op in release builds.
    fn check_invariants(&self, slack: usize) {
        if cfg!(debug_assertions) {
            let pool = self.pool.lock().unwrap_or_else(std::sync::PoisonError::into_inner).size();
            let fifo = self.fifo.lock().unwrap_or_else(std::sync::PoisonError::into_inner).size();
            let total = self.total_buffers.load(Ordering::SeqCst);
            debug_assert!(
                pool + fifo <= total && total - (pool + fifo) <= slack,
                "pipe invariant violated: pool={pool} fifo={fifo} total={total} slack={slack}"
            );
        }
    }

    /// Stocks the pool with client-owned handles before the pipeline is
    /// enabled. Also grows the FIFO's capacity bound to match, so the pipe
    /// can eventually hold every supplied handle in flight at once.
    ///
    /// Intended to be called only before the owning pipeline is enabled;
    /// calling it on a pipe with buffers already circulating will still
    /// succeed but can violate the conservation invariant checked elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MtxError`] if a lock guarding this pipe was
    /// poisoned by a panicking holder.
    pub fn configure_buffers(&self, buffers: impl IntoIterator<Item = T>) -> Result<(), PipelineError> {
        let mut pool = self.pool.lock().map_err(|_| PipelineError::MtxError)?;
        let mut added = 0usize;
        for handle in buffers {
            pool.push_back(handle);
            added += 1;
        }
        drop(pool);
        if added > 0 {
            let mut fifo = self.fifo.lock().map_err(|_| PipelineError::MtxError)?;
            let new_capacity = fifo.capacity() + added;
            fifo.set_capacity(new_capacity);
            drop(fifo);
            self.total_buffers.fetch_add(added, Ordering::SeqCst);
        }
        self.check_invariants(0);
        Ok(())
    }

    /// Removes one handle from the pool, or `None` if it is empty.
    pub fn get_empty_buffer(&self) -> Option<T> {
        let mut pool = self.pool.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let handle = pool.pop_back();
        drop(pool);
        self.check_invariants(2);
        handle
    }

    /// Returns a handle to the pool (e.g. after a stage is done reading it).
    pub fn put_back(&self, handle: T) {
        let mut pool = self.pool.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        pool.push_back(handle);
        drop(pool);
        self.check_invariants(2);
    }

    /// Appends a full handle to the FIFO. Returns `false` if the FIFO is
    /// already at capacity, in which case the caller keeps ownership of
    /// `handle`.
    ///
    /// Does not release the semaphore; callers must call
    /// [`release_full`](Self::release_full) afterward. Keeping the two steps
    /// separate preserves the exact window in which a consumer can observe a
    /// released token before the FIFO entry is visible, and is what the
    /// transient-empty recovery path in the stage drivers depends on.
    pub fn push_buffer(&self, handle: T) -> Result<(), T> {
        let mut fifo = self.fifo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let result = fifo.push_back(handle);
        drop(fifo);
        self.check_invariants(2);
        result
    }

    /// Releases `n` tokens on the pipe's semaphore, signaling that `n` more
    /// full buffers are ready to be pulled.
    pub fn release_full(&self, n: usize) {
        self.semaphore.release(n);
    }

    /// Blocks up to `timeout` for a full-buffer token.
    #[must_use]
    pub fn try_acquire_full(&self, timeout: Duration) -> bool {
        self.semaphore.try_acquire_for(timeout)
    }

    /// Pops the oldest full handle, or `None` (a transient race between a
    /// producer's push and release, or a spurious wake).
    pub fn get_full_buffer(&self) -> Option<T> {
        let mut fifo = self.fifo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let handle = fifo.pop_front();
        drop(fifo);
        self.check_invariants(2);
        handle
    }

    /// Current pool size.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool.lock().unwrap_or_else(std::sync::PoisonError::into_inner).size()
    }

    /// Current FIFO size.
    #[must_use]
    pub fn fifo_size(&self) -> usize {
        self.fifo.lock().unwrap_or_else(std::sync::PoisonError::into_inner).size()
    }

    /// Grows or shrinks the pipe's total buffer capacity.
    ///
    /// Growing only extends reserved pool capacity (it never invents
    /// handles). Shrinking first drops handles from the pool, then, if still
    /// over target, drops the oldest FIFO entries. Callers are expected to
    /// only resize a pipe belonging to a `Disabled` pipeline; `Pipe` itself
    /// has no notion of the owning pipeline's state to enforce that. Returns
    /// `Result` to match the rest of the configuration-time API even though
    /// nothing here can currently fail.
    pub fn resize(&self, n: usize) -> Result<(), PipelineError> {
        let mut new_total = None;
        self.lock2(|pool, fifo| {
            let total = pool.size() + fifo.size();
            if n >= total {
                // Growing only reserves capacity; it cannot invent handles,
                // so the real buffer count (and thus the invariant target)
                // is unchanged until the caller supplies more via
                // `configure_buffers`.
                pool.grow_to(n - fifo.size());
                return;
            }
            let overshoot = total - n;
            let pool_size = pool.size();
            let drop_from_pool = overshoot.min(pool_size);
            pool.drop_top(drop_from_pool);
            let remaining_overshoot = overshoot - drop_from_pool;
            if remaining_overshoot > 0 {
                let target_fifo_capacity = fifo.size().saturating_sub(remaining_overshoot);
                fifo.set_capacity(target_fifo_capacity);
            }
            new_total = Some(n);
        });
        if let Some(n) = new_total {
            self.total_buffers.store(n, Ordering::SeqCst);
        }
        self.check_invariants(0);
        Ok(())
    }

    /// Drains every full handle back into the pool. Used while disabling the
    /// owning pipeline.
    pub fn clear(&self) {
        self.lock2(|pool, fifo| {
            while let Some(handle) = fifo.pop_front() {
                pool.push_back(handle);
            }
        });
        self.check_invariants(0);
    }

    /// Deadlock-safe two-lock acquisition: lock the pool, try the FIFO; on
    /// contention, release the pool, yield, and retry in the other order.
    /// `resize`/`clear` are the only operations here that need both locks at
    /// once, so this helper is private to them.
    fn lock2<F>(&self, f: F)
    where
        F: FnOnce(&mut BufferPool<T>, &mut BufferFifo<T>),
    {
        loop {
            let mut pool = self.pool.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Ok(mut fifo) = self.fifo.try_lock() {
                f(&mut pool, &mut fifo);
                return;
            }
            drop(pool);
            std::thread::yield_now();
            let mut fifo = self.fifo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Ok(mut pool) = self.pool.try_lock() {
                f(&mut pool, &mut fifo);
                return;
            }
            drop(fifo);
            std::thread::yield_now();
        }
    }
}

impl<T> Default for Pipe<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_then_get_empty() {
        let pipe: Pipe<i32> = Pipe::new();
        pipe.configure_buffers([1, 2, 3]).unwrap();
        assert_eq!(pipe.pool_size(), 3);
        assert_eq!(pipe.get_empty_buffer(), Some(3));
    }

    #[test]
    fn push_release_acquire_pull_roundtrip() {
        let pipe: Pipe<i32> = Pipe::new();
        pipe.configure_buffers([1]).unwrap();
        let handle = pipe.get_empty_buffer().unwrap();
        assert!(pipe.push_buffer(handle).is_ok());
        pipe.release_full(1);
        assert!(pipe.try_acquire_full(Duration::from_millis(10)));
        assert_eq!(pipe.get_full_buffer(), Some(1));
    }

    #[test]
    fn resize_grow_extends_pool() {
        let pipe: Pipe<i32> = Pipe::new();
        pipe.configure_buffers([1, 2]).unwrap();
        pipe.resize(5).unwrap();
        assert_eq!(pipe.pool_size() + pipe.fifo_size(), 2);
    }

    #[test]
    fn resize_shrink_drops_from_pool_first() {
        let pipe: Pipe<i32> = Pipe::new();
        pipe.configure_buffers([1, 2, 3, 4]).unwrap();
        pipe.resize(2).unwrap();
        assert_eq!(pipe.pool_size(), 2);
    }

    #[test]
    fn clear_drains_fifo_into_pool() {
        let pipe: Pipe<i32> = Pipe::new();
        pipe.configure_buffers([1, 2]).unwrap();
        let a = pipe.get_empty_buffer().unwrap();
        pipe.push_buffer(a).unwrap();
        pipe.release_full(1);
        assert_eq!(pipe.fifo_size(), 1);
        pipe.clear();
        assert_eq!(pipe.fifo_size(), 0);
        assert_eq!(pipe.pool_size(), 2);
    }
}
