//! Two-phase rendezvous built from an entry counter and an outcome counter.
//!
//! Phase one gates "has everyone arrived": each participant signals the entry
//! counter once and then waits until it has been signalled `participants`
//! times. Phase two gates "is the result ready": non-owners wait on the
//! outcome counter until the owner releases them or poisons it.
//!
//! A single counter cannot serve both phases. The owner must know all
//! arrivals happened before it writes the shared outcome, and non-owners must
//! not read the outcome until the owner has finished writing it.
//!
//! The pair is single-use. Arrivals beyond `participants` pass straight
//! through phase one; callers are expected to prevent them.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::sync::Semaphore;
use crate::tracing_compat::{debug, trace};

/// Entry/outcome counter pair for one join episode.
#[derive(Debug)]
pub struct RendezvousPair {
    participants: usize,
    arrivals: AtomicUsize,
    entry: Semaphore,
    outcome: Semaphore,
}

impl RendezvousPair {
    /// Creates a pair expecting `participants` arrivals.
    ///
    /// # Panics
    ///
    /// Panics if `participants == 0`.
    #[must_use]
    pub fn new(participants: usize) -> Self {
        assert!(participants > 0, "rendezvous requires at least 1 participant");
        Self {
            participants,
            arrivals: AtomicUsize::new(0),
            entry: Semaphore::new(0),
            outcome: Semaphore::new(0),
        }
    }

    /// Returns the number of participants required to open the entry gate.
    #[must_use]
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Returns how many participants have arrived so far.
    #[must_use]
    pub fn arrivals(&self) -> usize {
        self.arrivals.load(Ordering::Acquire)
    }

    /// Returns true once every participant has arrived.
    #[must_use]
    pub fn all_arrived(&self) -> bool {
        self.arrivals() >= self.participants
    }

    /// Returns true if the outcome gate was poisoned.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.outcome.is_broken()
    }

    /// Registers an arrival and waits until all participants have arrived.
    ///
    /// Returns to every caller, including the last one to arrive.
    pub async fn arrive(&self) -> Result<()> {
        let arrived = self.arrivals.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(arrived, participants = self.participants, "rendezvous arrive");
        self.entry.signal(1);
        self.entry.wait(self.participants).await?;
        // Turnstile: hand the full count on so the next parked arrival passes.
        self.entry.signal(self.participants);
        Ok(())
    }

    /// Waits until the owner releases this waiter or poisons the pair.
    pub async fn await_outcome(&self) -> Result<()> {
        self.outcome.wait(1).await
    }

    /// Releases `n` current or future [`await_outcome`](Self::await_outcome) waiters.
    pub fn release_success(&self, n: usize) {
        debug!(released = n, "rendezvous release");
        if n > 0 {
            self.outcome.signal(n);
        }
    }

    /// Poisons the outcome gate; every current and future waiter observes `error`.
    pub fn release_failure(&self, error: Error) {
        debug!(error = %error, "rendezvous poisoned");
        self.outcome.break_with(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::{init_test_logging, poll_once};

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn arrive_releases_everyone_once_all_arrived() {
        init_test("arrive_releases_everyone_once_all_arrived");
        let pair = RendezvousPair::new(3);

        let mut first = Box::pin(pair.arrive());
        let mut second = Box::pin(pair.arrive());
        let first_pending = poll_once(&mut first).is_none();
        let second_pending = poll_once(&mut second).is_none();
        crate::assert_with_log!(first_pending, "first parked", true, first_pending);
        crate::assert_with_log!(second_pending, "second parked", true, second_pending);
        crate::assert_with_log!(!pair.all_arrived(), "not all arrived", false, pair.all_arrived());

        crate::test_section!("last arrival");
        let mut third = Box::pin(pair.arrive());
        assert!(poll_once(&mut third).is_none(), "last arrival queues behind");
        crate::assert_with_log!(pair.arrivals() == 3, "arrivals", 3usize, pair.arrivals());

        for (name, fut) in [("first", &mut first), ("second", &mut second), ("third", &mut third)] {
            let result = poll_once(fut).expect("released");
            crate::assert_with_log!(result.is_ok(), name, true, result.is_ok());
        }
        crate::test_complete!("arrive_releases_everyone_once_all_arrived");
    }

    #[test]
    fn arrive_from_many_threads() {
        init_test("arrive_from_many_threads");
        let pair = std::sync::Arc::new(RendezvousPair::new(4));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let pair = std::sync::Arc::clone(&pair);
                std::thread::spawn(move || futures_lite::future::block_on(pair.arrive()))
            })
            .collect();
        for thread in threads {
            let result = thread.join().expect("arrival thread panicked");
            crate::assert_with_log!(result.is_ok(), "released", true, result.is_ok());
        }
        crate::assert_with_log!(pair.all_arrived(), "all arrived", true, pair.all_arrived());
        crate::test_complete!("arrive_from_many_threads");
    }

    #[test]
    fn single_participant_passes_immediately() {
        init_test("single_participant_passes_immediately");
        let pair = RendezvousPair::new(1);
        let mut arrive = Box::pin(pair.arrive());
        let result = poll_once(&mut arrive).expect("no one else to wait for");
        crate::assert_with_log!(result.is_ok(), "arrive ok", true, result.is_ok());
        crate::test_complete!("single_participant_passes_immediately");
    }

    #[test]
    fn release_success_admits_exactly_n_waiters() {
        init_test("release_success_admits_exactly_n_waiters");
        let pair = RendezvousPair::new(3);

        let mut a = Box::pin(pair.await_outcome());
        let mut b = Box::pin(pair.await_outcome());
        let mut c = Box::pin(pair.await_outcome());
        assert!(poll_once(&mut a).is_none());
        assert!(poll_once(&mut b).is_none());
        assert!(poll_once(&mut c).is_none());

        pair.release_success(2);
        assert!(poll_once(&mut a).expect("released").is_ok());
        assert!(poll_once(&mut b).expect("released").is_ok());
        let still_parked = poll_once(&mut c).is_none();
        crate::assert_with_log!(still_parked, "third not released", true, still_parked);
        crate::test_complete!("release_success_admits_exactly_n_waiters");
    }

    #[test]
    fn release_before_wait_is_not_lost() {
        init_test("release_before_wait_is_not_lost");
        let pair = RendezvousPair::new(2);
        pair.release_success(1);
        let mut late = Box::pin(pair.await_outcome());
        assert!(poll_once(&mut late).expect("units banked").is_ok());
        crate::test_complete!("release_before_wait_is_not_lost");
    }

    #[test]
    fn release_failure_reaches_current_and_future_waiters() {
        init_test("release_failure_reaches_current_and_future_waiters");
        let pair = RendezvousPair::new(4);

        let mut parked = Box::pin(pair.await_outcome());
        assert!(poll_once(&mut parked).is_none());

        let origin = Error::overloaded("too busy");
        pair.release_failure(origin.clone());
        crate::assert_with_log!(pair.is_poisoned(), "poisoned", true, pair.is_poisoned());

        let err = poll_once(&mut parked).expect("woken").expect_err("poison");
        crate::assert_with_log!(
            err.kind() == ErrorKind::Overloaded,
            "parked waiter error",
            ErrorKind::Overloaded,
            err.kind()
        );

        let mut late = Box::pin(pair.await_outcome());
        let err = poll_once(&mut late).expect("ready").expect_err("poison");
        crate::assert_with_log!(
            err.message() == origin.message(),
            "late waiter error",
            origin.message(),
            err.message()
        );
        crate::test_complete!("release_failure_reaches_current_and_future_waiters");
    }

    #[test]
    #[should_panic(expected = "rendezvous requires at least 1 participant")]
    fn zero_participants_panics() {
        let _ = RendezvousPair::new(0);
    }
}
