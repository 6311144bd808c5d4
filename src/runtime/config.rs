//! Shard runtime configuration.
//!
//! In most cases you should use [`ShardRuntimeBuilder`](super::ShardRuntimeBuilder)
//! to construct a runtime rather than creating a [`ShardConfig`] directly.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `shards` | available CPU parallelism |
//! | `thread_name_prefix` | `"shardsync-shard"` |
//! | `thread_stack_size` | 2 MiB |

use crate::error::{Error, Result};

/// Default shard thread name prefix.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "shardsync-shard";
/// Default shard thread stack size.
pub const DEFAULT_THREAD_STACK_SIZE: usize = 2 * 1024 * 1024;
/// Largest number of shards a runtime can address.
pub const MAX_SHARDS: usize = u16::MAX as usize;

/// Shard runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardConfig {
    /// Number of shards, one OS thread each.
    pub shards: usize,
    /// Name prefix for shard threads; the shard index is appended.
    pub thread_name_prefix: String,
    /// Stack size per shard thread.
    pub thread_stack_size: usize,
}

impl ShardConfig {
    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.shards == 0 {
            return Err(Error::invalid_config("shards must be > 0"));
        }
        if self.shards > MAX_SHARDS {
            return Err(Error::invalid_config(format!(
                "shards must be <= {MAX_SHARDS}, got {}",
                self.shards
            )));
        }
        if self.thread_stack_size == 0 {
            return Err(Error::invalid_config("thread_stack_size must be > 0"));
        }
        Ok(())
    }
}

impl Default for ShardConfig {
    fn default() -> Self {
        let shards = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
            .min(MAX_SHARDS);
        Self {
            shards,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            thread_stack_size: DEFAULT_THREAD_STACK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn default_is_valid() {
        let config = ShardConfig::default();
        assert!(config.shards >= 1);
        assert_eq!(config.thread_name_prefix, DEFAULT_THREAD_NAME_PREFIX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_shards_rejected() {
        let config = ShardConfig {
            shards: 0,
            ..ShardConfig::default()
        };
        let err = config.validate().expect_err("zero shards");
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn too_many_shards_rejected() {
        let config = ShardConfig {
            shards: MAX_SHARDS + 1,
            ..ShardConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
