//! Synchronization primitives
//!
//! Contains semaphores, mutexes, and the typed message queue.

#[cfg(feature = "sem")]
pub mod sem;

#[cfg(feature = "mutex")]
pub mod mutex;

#[cfg(feature = "queue")]
pub mod queue;
