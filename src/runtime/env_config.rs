//! Environment variable and config file support for [`ShardRuntimeBuilder`](super::ShardRuntimeBuilder).
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set via builder methods (`shards(4)`)
//! 2. **Environment variables**: values from `SHARDSYNC_*` env vars
//! 3. **Config file**: values loaded from a TOML file (requires `config-file` feature)
//! 4. **Defaults**: built-in defaults from [`ShardConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `SHARDSYNC_SHARDS` | `usize` | `shards` |
//! | `SHARDSYNC_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |
//! | `SHARDSYNC_THREAD_STACK_SIZE` | `usize` | `thread_stack_size` |

use crate::error::{Error, ErrorKind};
use crate::runtime::config::ShardConfig;

/// Environment variable name for the shard count.
pub const ENV_SHARDS: &str = "SHARDSYNC_SHARDS";
/// Environment variable name for the shard thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "SHARDSYNC_THREAD_NAME_PREFIX";
/// Environment variable name for the shard thread stack size.
pub const ENV_THREAD_STACK_SIZE: &str = "SHARDSYNC_THREAD_STACK_SIZE";

/// Error raised while reading configuration from the environment or a file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigSourceError {
    /// An environment variable is set but unparseable.
    #[error("invalid value for {var}: expected {expected}, got {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// What the variable should contain.
        expected: &'static str,
        /// The raw value found.
        value: String,
    },
    /// The config file could not be read.
    #[cfg(feature = "config-file")]
    #[error("failed to read config file {path}")]
    Read {
        /// Path that was read.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML for [`ShardTomlConfig`].
    #[cfg(feature = "config-file")]
    #[error("failed to parse TOML config")]
    Parse(#[from] toml::de::Error),
}

impl From<ConfigSourceError> for Error {
    fn from(e: ConfigSourceError) -> Self {
        let message = e.to_string();
        Self::new(ErrorKind::InvalidConfig)
            .with_message(message)
            .with_source(e)
    }
}

/// Apply environment variable overrides to a [`ShardConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut ShardConfig) -> Result<(), Error> {
    if let Some(val) = read_env(ENV_SHARDS) {
        config.shards = parse_usize(ENV_SHARDS, &val)?;
    }
    if let Some(val) = read_env(ENV_THREAD_NAME_PREFIX) {
        config.thread_name_prefix = val;
    }
    if let Some(val) = read_env(ENV_THREAD_STACK_SIZE) {
        config.thread_stack_size = parse_usize(ENV_THREAD_STACK_SIZE, &val)?;
    }
    Ok(())
}

/// Read an environment variable, returning `None` if unset.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_usize(var: &'static str, val: &str) -> Result<usize, ConfigSourceError> {
    val.trim()
        .parse::<usize>()
        .map_err(|_| ConfigSourceError::InvalidEnv {
            var,
            expected: "unsigned integer",
            value: val.to_string(),
        })
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable shard runtime configuration.
///
/// ```toml
/// [shards]
/// count = 4
/// thread_name_prefix = "myapp-shard"
/// thread_stack_size = 2097152
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct ShardTomlConfig {
    /// Shard settings.
    #[serde(default)]
    pub shards: ShardsToml,
}

/// `[shards]` section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct ShardsToml {
    /// Number of shards.
    pub count: Option<usize>,
    /// Name prefix for shard threads.
    pub thread_name_prefix: Option<String>,
    /// Stack size per shard thread in bytes.
    pub thread_stack_size: Option<usize>,
}

/// Apply a parsed TOML config to a [`ShardConfig`].
///
/// Only fields that are `Some` in the TOML struct override the config.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(config: &mut ShardConfig, toml: &ShardTomlConfig) {
    if let Some(v) = toml.shards.count {
        config.shards = v;
    }
    if let Some(ref v) = toml.shards.thread_name_prefix {
        config.thread_name_prefix.clone_from(v);
    }
    if let Some(v) = toml.shards.thread_stack_size {
        config.thread_stack_size = v;
    }
}

/// Parse a TOML string into a [`ShardTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<ShardTomlConfig, Error> {
    toml::from_str(toml_str)
        .map_err(ConfigSourceError::from)
        .map_err(Error::from)
}

/// Read and parse a TOML file into a [`ShardTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<ShardTomlConfig, Error> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigSourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_toml_str(&content)
}
