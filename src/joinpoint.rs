//! Cross-shard join barrier.
//!
//! A [`JoinBarrier`] lets every participating shard call [`JoinBarrier::join`]
//! and receive the same result, produced exactly once on the owner shard after
//! all participants have arrived.
//!
//! # Protocol
//!
//! Every `join` is dispatched to the owner shard, so arrivals are serialized
//! by the owner's event loop:
//!
//! 1. The caller is recorded and arrives at the entry counter.
//! 2. Once all `participants` have arrived, the owner's own call takes the
//!    generator, runs it, and stores the outcome.
//! 3. The owner releases the other participants, or poisons them with the
//!    generator's error. Released participants read the stored value.
//!
//! The outcome is written before any participant is released, so a released
//! participant always finds it.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use shardsync::{JoinBarrier, ShardId, ShardRuntime};
//!
//! let rt = ShardRuntime::builder().shards(4).build()?;
//! let handle = rt.handle();
//! let barrier = Arc::new(JoinBarrier::from_fn(ShardId::ZERO, 4, || Ok(load_schema()))?);
//!
//! // On each shard `s`:
//! let schema = barrier.join(&handle, s).await?;
//! ```
//!
//! A barrier serves one join episode. Fewer than `participants` joins leave
//! every call pending; there is no built-in timeout.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use futures::future::{self, BoxFuture, FutureExt, LocalBoxFuture};
use parking_lot::Mutex;

use crate::error::{Error, ErrorKind, Result};
use crate::runtime::{Dispatch, ShardContext};
use crate::sync::RendezvousPair;
use crate::tracing_compat::{debug, info, trace, warn};
use crate::types::ShardId;

/// Single-shot producer of the joined value, run on the owner shard.
pub type Generator<T> = Box<dyn FnOnce() -> LocalBoxFuture<'static, Result<T>> + Send>;

/// Outcome cached by the owner once the generator finished.
#[derive(Debug, Clone)]
pub enum JoinOutcome<T> {
    /// The generator produced a value.
    Value(T),
    /// The generator failed; every participant observes this error.
    Failed(Error),
}

impl<T> JoinOutcome<T> {
    /// Returns the value, if the generator succeeded.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    /// Returns the error, if the generator failed.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Value(_) => None,
            Self::Failed(err) => Some(err),
        }
    }
}

/// Observable progress of a join episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    /// Nobody has arrived yet.
    Idle,
    /// Some participants have arrived; holds the arrival count.
    Arriving(usize),
    /// All participants arrived and the generator is running.
    Generating,
    /// The generator succeeded and the value is cached.
    Completed,
    /// The generator failed and the error is cached.
    Failed,
}

impl JoinState {
    /// Returns true for [`Completed`](Self::Completed) and [`Failed`](Self::Failed).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Barrier that computes a value once on its owner shard and hands it to
/// every participant.
pub struct JoinBarrier<T> {
    owner: ShardId,
    participants: usize,
    generator: Mutex<Option<Generator<T>>>,
    counters: RendezvousPair,
    slot: OnceLock<JoinOutcome<T>>,
    joined: Mutex<HashSet<ShardId>>,
    generating: AtomicBool,
}

impl<T> fmt::Debug for JoinBarrier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinBarrier")
            .field("owner", &self.owner)
            .field("participants", &self.participants)
            .field("arrivals", &self.counters.arrivals())
            .field("completed", &self.slot.get().is_some())
            .finish_non_exhaustive()
    }
}

impl<T> JoinBarrier<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a barrier whose `generator` runs on `owner` once `participants`
    /// shards have joined.
    ///
    /// The future returned by `generator` is only polled on the owner shard
    /// and need not be `Send`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`] if `participants` is zero.
    pub fn new<G, Fut>(owner: ShardId, participants: usize, generator: G) -> Result<Self>
    where
        G: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + 'static,
    {
        if participants == 0 {
            return Err(Error::invalid_config(
                "join barrier requires at least 1 participant",
            ));
        }
        let generator: Generator<T> = Box::new(move || generator().boxed_local());
        Ok(Self {
            owner,
            participants,
            generator: Mutex::new(Some(generator)),
            counters: RendezvousPair::new(participants),
            slot: OnceLock::new(),
            joined: Mutex::new(HashSet::with_capacity(participants)),
            generating: AtomicBool::new(false),
        })
    }

    /// Creates a barrier around a synchronous generator.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`] if `participants` is zero.
    pub fn from_fn<F>(owner: ShardId, participants: usize, f: F) -> Result<Self>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Self::new(owner, participants, move || future::ready(f()))
    }

    /// Creates a barrier owned by the current shard, expecting every shard of
    /// its runtime to join.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotOnShard`] when called off a shard thread.
    pub fn for_current_shard<G, Fut>(generator: G) -> Result<Self>
    where
        G: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + 'static,
    {
        let ctx = ShardContext::current().ok_or_else(not_on_shard)?;
        Self::new(ctx.shard_id(), ctx.shard_count(), generator)
    }

    /// Returns the shard that runs the generator.
    #[must_use]
    pub fn owner(&self) -> ShardId {
        self.owner
    }

    /// Returns the number of shards expected to join.
    #[must_use]
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Returns the current progress of the episode.
    #[must_use]
    pub fn state(&self) -> JoinState {
        match self.slot.get() {
            Some(JoinOutcome::Value(_)) => JoinState::Completed,
            Some(JoinOutcome::Failed(_)) => JoinState::Failed,
            None if self.generating.load(Ordering::Acquire) => JoinState::Generating,
            None => match self.counters.arrivals() {
                0 => JoinState::Idle,
                n => JoinState::Arriving(n),
            },
        }
    }

    /// Returns the cached value once the generator succeeded.
    #[must_use]
    pub fn cached_value(&self) -> Option<T> {
        self.slot.get().and_then(JoinOutcome::value).cloned()
    }

    /// Returns the cached outcome once the generator finished.
    #[must_use]
    pub fn outcome(&self) -> Option<&JoinOutcome<T>> {
        self.slot.get()
    }

    /// Joins the episode on behalf of `caller`.
    ///
    /// Resolves once every participant has joined and the owner produced the
    /// outcome. Each participant must join exactly once.
    ///
    /// # Errors
    ///
    /// - the generator's error, shared by every participant
    /// - [`ErrorKind::ContractViolation`] for a second join by `caller`, a
    ///   non-owner join once `participants - 1` non-owners are registered, or
    ///   a join after the episode finished. The owner's first join is always
    ///   admitted.
    /// - dispatch errors reaching the owner shard
    pub fn join<D: Dispatch>(
        self: &Arc<Self>,
        dispatcher: &D,
        caller: ShardId,
    ) -> BoxFuture<'static, Result<T>> {
        let barrier = Arc::clone(self);
        trace!(caller = %caller, owner = %self.owner, "join dispatched");
        dispatcher.submit_to(self.owner, move || async move {
            barrier.join_on_owner(caller).await
        })
    }

    /// Joins on behalf of the shard running the calling thread.
    ///
    /// Resolves to [`ErrorKind::NotOnShard`] off a shard thread.
    pub fn join_current<D: Dispatch>(
        self: &Arc<Self>,
        dispatcher: &D,
    ) -> BoxFuture<'static, Result<T>> {
        match ShardContext::current_shard() {
            Some(caller) => self.join(dispatcher, caller),
            None => future::ready(Err(not_on_shard())).boxed(),
        }
    }

    /// Runs on the owner shard for every participant.
    async fn join_on_owner(&self, caller: ShardId) -> Result<T> {
        self.register(caller)?;
        self.counters.arrive().await?;

        if caller == self.owner {
            self.generate().await
        } else {
            self.counters.await_outcome().await?;
            self.read_outcome()
        }
    }

    fn register(&self, caller: ShardId) -> Result<()> {
        if self.slot.get().is_some() {
            warn!(caller = %caller, "join after the episode finished");
            return Err(Error::contract_violation("join barrier already finished")
                .with_shard(caller));
        }
        let mut joined = self.joined.lock();
        if joined.contains(&caller) {
            warn!(caller = %caller, "participant joined twice");
            return Err(Error::contract_violation(format!("{caller} joined twice"))
                .with_shard(caller));
        }
        // The owner's slot stays reserved: without it nothing can generate.
        let others = joined.len() - usize::from(joined.contains(&self.owner));
        if caller != self.owner && others >= self.participants - 1 {
            warn!(
                caller = %caller,
                participants = self.participants,
                "join beyond the expected participants"
            );
            return Err(Error::contract_violation(format!(
                "{caller} exceeds the {} expected participants",
                self.participants
            ))
            .with_shard(caller));
        }
        joined.insert(caller);
        trace!(caller = %caller, joined = joined.len(), "participant registered");
        drop(joined);
        Ok(())
    }

    async fn generate(&self) -> Result<T> {
        let Some(generator) = self.generator.lock().take() else {
            return Err(Error::contract_violation("join barrier generator already consumed")
                .with_shard(self.owner));
        };
        self.generating.store(true, Ordering::Release);
        debug!(owner = %self.owner, participants = self.participants, "running join generator");

        let others = self.participants - 1;
        match generator().await {
            Ok(value) => {
                if self.slot.set(JoinOutcome::Value(value.clone())).is_err() {
                    let err = Error::internal("join outcome written twice").with_shard(self.owner);
                    self.counters.release_failure(err.clone());
                    return Err(err);
                }
                self.counters.release_success(others);
                info!(owner = %self.owner, released = others, "join completed");
                Ok(value)
            }
            Err(err) => {
                // The slot can only be filled here; a failed set means nothing to add.
                let _ = self.slot.set(JoinOutcome::Failed(err.clone()));
                self.counters.release_failure(err.clone());
                warn!(owner = %self.owner, error = %err, "join generator failed");
                Err(err)
            }
        }
    }

    fn read_outcome(&self) -> Result<T> {
        match self.slot.get() {
            Some(JoinOutcome::Value(value)) => Ok(value.clone()),
            Some(JoinOutcome::Failed(err)) => Err(err.clone()),
            None => Err(Error::internal("join released before its outcome was written")
                .with_shard(self.owner)),
        }
    }
}

fn not_on_shard() -> Error {
    Error::new(ErrorKind::NotOnShard).with_message("the calling thread is not a shard")
}
