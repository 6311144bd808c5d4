//! Core types for shardsync.
//!
//! - [`id`]: Identifier types (`ShardId`)

pub mod id;

pub use id::ShardId;
