//! Shardsync: cross-shard join barrier for thread-per-core engines.
//!
//! # Overview
//!
//! In a thread-per-core engine every shard owns its data and runs a
//! cooperative event loop on its own OS thread. Some work must still happen
//! exactly once for the whole engine, with every shard waiting for the
//! result: loading a schema, agreeing on a snapshot, rebuilding a shared
//! index. A [`JoinBarrier`] provides that rendezvous.
//!
//! # Core Guarantees
//!
//! - **Single generation**: the generator runs at most once per barrier
//! - **Owner affinity**: the generator runs on the owner shard only
//! - **Agreement**: every participant gets the same value or the same error
//! - **No blocked threads**: waiting participants are parked futures
//!
//! # Module Structure
//!
//! - [`joinpoint`]: The join barrier
//! - [`sync`]: Async counting semaphore and the rendezvous counter pair
//! - [`runtime`]: Thread-per-core shard runtime and the [`Dispatch`] seam
//! - [`types`]: Core identifiers
//! - [`error`]: Error types

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod error;
pub mod joinpoint;
pub mod runtime;
pub mod sync;
pub mod tracing_compat;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-exports for convenient access to core types
pub use error::{Error, ErrorCategory, ErrorKind, Recoverability, Result, ResultExt};
pub use joinpoint::{Generator, JoinBarrier, JoinOutcome, JoinState};
pub use runtime::{Dispatch, ShardConfig, ShardContext, ShardHandle, ShardRuntime, ShardRuntimeBuilder};
pub use sync::{RendezvousPair, Semaphore};
pub use types::ShardId;
