//! Blocking synchronization primitives built on `std::sync`.
//!
//! Neither a portable blocking semaphore nor a portable futex word exists in
//! stable `std`, so both are hand-rolled here from `Mutex`/`Condvar` and used
//! throughout the pipe and worker implementations.

mod futex;
mod semaphore;

pub use futex::FutexWord;
pub use semaphore::Semaphore;
