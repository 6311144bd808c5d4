//! Synchronization primitives for shard-local event loops.
//!
//! Every primitive here suspends the calling task instead of blocking the
//! thread, so a shard keeps servicing unrelated work while one of its tasks
//! is parked.
//!
//! # Primitives
//!
//! - [`Semaphore`]: Counting semaphore with FIFO waiters and poisoning
//! - [`RendezvousPair`]: Entry/outcome counter pair implementing a
//!   single-use rendezvous with a broadcastable outcome

mod rendezvous;
mod semaphore;

pub use rendezvous::RendezvousPair;
pub use semaphore::{Semaphore, TryWaitError, WaitFuture};
