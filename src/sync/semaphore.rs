//! Counting semaphore with FIFO waiters and poisoning.
//!
//! Units are produced with [`Semaphore::signal`] and consumed with
//! [`Semaphore::wait`]. Waiting suspends the calling task, never the thread,
//! so a shard's event loop keeps running other work while a waiter is parked.
//!
//! # Poisoning
//!
//! [`Semaphore::break_with`] marks the semaphore as permanently failed. Every
//! pending and future `wait` resolves to a clone of the same [`Error`].
//!
//! # Fairness
//!
//! Waiters are served strictly in arrival order: a newcomer never takes
//! units while older waiters are queued, even when enough units are
//! available for the newcomer alone.
//!
//! # Example
//!
//! ```ignore
//! use shardsync::sync::Semaphore;
//!
//! let sem = Semaphore::new(0);
//! sem.signal(2);
//! sem.wait(2).await?;
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::tracing_compat::trace;

/// Error returned by [`Semaphore::try_wait`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum TryWaitError {
    /// Not enough units are available, or older waiters are queued.
    #[error("not enough semaphore units available")]
    Unavailable,
    /// The semaphore was poisoned.
    #[error("semaphore broken: {0}")]
    Broken(Error),
}

/// A counting semaphore whose waiters suspend instead of blocking.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<SemaphoreState>,
}

#[derive(Debug)]
struct SemaphoreState {
    /// Number of available units.
    permits: usize,
    /// Poison, if any. First poison wins.
    broken: Option<Error>,
    /// FIFO queue of parked waiters.
    waiters: VecDeque<Waiter>,
    /// Next waiter id for de-duplication.
    next_waiter_id: u64,
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    count: usize,
    waker: Waker,
}

impl SemaphoreState {
    fn wake_front_if_ready(&self) {
        if let Some(front) = self.waiters.front() {
            if self.permits >= front.count {
                front.waker.wake_by_ref();
            }
        }
    }

    fn remove_waiter(&mut self, waiter_id: u64) {
        let was_front = self.waiters.front().is_some_and(|w| w.id == waiter_id);
        self.waiters.retain(|w| w.id != waiter_id);
        if was_front {
            self.wake_front_if_ready();
        }
    }
}

impl Semaphore {
    /// Creates a new semaphore holding `permits` units.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(SemaphoreState {
                permits,
                broken: None,
                waiters: VecDeque::new(),
                next_waiter_id: 0,
            }),
        }
    }

    /// Returns the number of currently available units.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.state.lock().permits
    }

    /// Returns the number of parked waiters.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Returns true if the semaphore was poisoned.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.state.lock().broken.is_some()
    }

    /// Adds `count` units and wakes the oldest waiter if it can proceed.
    pub fn signal(&self, count: usize) {
        let mut state = self.state.lock();
        state.permits = state.permits.saturating_add(count);
        trace!(count, permits = state.permits, "semaphore signal");
        state.wake_front_if_ready();
    }

    /// Poisons the semaphore.
    ///
    /// All parked waiters are woken and resolve to `error`; later waits fail
    /// immediately with the same error. Poisoning an already broken semaphore
    /// keeps the first error.
    pub fn break_with(&self, error: Error) {
        let mut state = self.state.lock();
        if state.broken.is_none() {
            trace!(error = %error, waiters = state.waiters.len(), "semaphore broken");
            state.broken = Some(error);
        }
        for waiter in state.waiters.drain(..) {
            waiter.waker.wake();
        }
    }

    /// Waits for `count` units and consumes them.
    ///
    /// # Panics
    ///
    /// Panics if `count == 0`.
    pub fn wait(&self, count: usize) -> WaitFuture<'_> {
        assert!(count > 0, "cannot wait for 0 units");
        WaitFuture {
            semaphore: self,
            count,
            waiter_id: None,
        }
    }

    /// Consumes `count` units without waiting.
    ///
    /// # Panics
    ///
    /// Panics if `count == 0`.
    pub fn try_wait(&self, count: usize) -> core::result::Result<(), TryWaitError> {
        assert!(count > 0, "cannot wait for 0 units");
        let mut state = self.state.lock();
        if let Some(error) = &state.broken {
            return Err(TryWaitError::Broken(error.clone()));
        }
        if !state.waiters.is_empty() || state.permits < count {
            return Err(TryWaitError::Unavailable);
        }
        state.permits -= count;
        Ok(())
    }
}

/// Future returned by [`Semaphore::wait`].
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct WaitFuture<'a> {
    semaphore: &'a Semaphore,
    count: usize,
    waiter_id: Option<u64>,
}

impl Drop for WaitFuture<'_> {
    fn drop(&mut self) {
        if let Some(waiter_id) = self.waiter_id {
            self.semaphore.state.lock().remove_waiter(waiter_id);
        }
    }
}

impl Future for WaitFuture<'_> {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let semaphore = self.semaphore;
        let count = self.count;
        let mut state = semaphore.state.lock();

        if let Some(error) = &state.broken {
            let error = error.clone();
            if let Some(waiter_id) = self.waiter_id.take() {
                state.waiters.retain(|w| w.id != waiter_id);
            }
            return Poll::Ready(Err(error));
        }

        match self.waiter_id {
            None => {
                if state.waiters.is_empty() && state.permits >= count {
                    state.permits -= count;
                    return Poll::Ready(Ok(()));
                }
                let id = state.next_waiter_id;
                state.next_waiter_id = state.next_waiter_id.wrapping_add(1);
                state.waiters.push_back(Waiter {
                    id,
                    count,
                    waker: context.waker().clone(),
                });
                drop(state);
                self.waiter_id = Some(id);
                Poll::Pending
            }
            Some(waiter_id) => {
                let at_front = state.waiters.front().is_some_and(|w| w.id == waiter_id);
                if at_front && state.permits >= count {
                    state.permits -= count;
                    state.waiters.pop_front();
                    state.wake_front_if_ready();
                    drop(state);
                    self.waiter_id = None;
                    return Poll::Ready(Ok(()));
                }
                if let Some(existing) = state.waiters.iter_mut().find(|w| w.id == waiter_id) {
                    if !existing.waker.will_wake(context.waker()) {
                        existing.waker = context.waker().clone();
                    }
                } else {
                    // Not queued anymore; rejoin at the back.
                    state.waiters.push_back(Waiter {
                        id: waiter_id,
                        count,
                        waker: context.waker().clone(),
                    });
                }
                Poll::Pending
            }
        }
    }
}
