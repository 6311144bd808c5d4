//! Thread-per-core shard runtime.
//!
//! This module contains the machinery that hosts shards:
//!
//! - [`config`]: Runtime configuration types
//! - [`builder`]: Runtime builder and the owning [`ShardRuntime`]
//! - [`env_config`]: Environment variable and TOML file overrides
//! - [`dispatch`]: The [`Dispatch`] seam and its [`ShardHandle`] implementation
//! - [`shard`]: Per-shard event loop and [`ShardContext`]
//!
//! # Runtime Builder
//!
//! The runtime is configured with a fluent, move-based builder. Each method
//! consumes `self` and returns an updated builder.
//!
//! ```ignore
//! use shardsync::runtime::ShardRuntime;
//!
//! let runtime = ShardRuntime::builder()
//!     .shards(4)
//!     .thread_name_prefix("db-shard")
//!     .with_env_overrides()
//!     .build()?;
//! let handle = runtime.handle();
//! ```
//!
//! Shard `i` runs on the thread `"{prefix}-{i}"`. Work submitted to a shard
//! is built and polled on that thread only, so shard-local state can use
//! `Rc` and `RefCell` freely.

pub mod builder;
pub mod config;
pub mod dispatch;
pub mod env_config;
pub mod shard;

pub use builder::{ShardRuntime, ShardRuntimeBuilder};
pub use config::ShardConfig;
pub use dispatch::{Dispatch, ShardHandle};
pub use shard::ShardContext;
