//! Shard runtime builder and owner handle.

use std::future::Future;
use std::thread::JoinHandle;

use crossbeam_channel::unbounded;

use crate::error::{Error, ErrorKind, Result};
use crate::runtime::config::ShardConfig;
use crate::runtime::dispatch::{Dispatch, ShardHandle};
use crate::runtime::env_config::apply_env_overrides;
use crate::runtime::shard::{run_shard, Command, ShardContext};
use crate::tracing_compat::{info, warn};
use crate::types::ShardId;

/// Builder for constructing a shard runtime with custom configuration.
///
/// Builder values win over environment variables, which win over a config
/// file, which wins over [`ShardConfig::default`].
#[derive(Debug, Clone, Default)]
pub struct ShardRuntimeBuilder {
    shards: Option<usize>,
    thread_name_prefix: Option<String>,
    thread_stack_size: Option<usize>,
    env_overrides: bool,
    #[cfg(feature = "config-file")]
    config_file: Option<std::path::PathBuf>,
}

impl ShardRuntimeBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of shards.
    #[must_use]
    pub fn shards(mut self, n: usize) -> Self {
        self.shards = Some(n);
        self
    }

    /// Set the shard thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = Some(prefix.into());
        self
    }

    /// Set the shard thread stack size.
    #[must_use]
    pub fn thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = Some(size);
        self
    }

    /// Read `SHARDSYNC_*` environment variables at build time.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.env_overrides = true;
        self
    }

    /// Load settings from a TOML file at build time.
    #[cfg(feature = "config-file")]
    #[must_use]
    pub fn config_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Resolves the final configuration without starting any thread.
    pub fn resolve_config(&self) -> Result<ShardConfig> {
        let mut config = ShardConfig::default();
        #[cfg(feature = "config-file")]
        if let Some(path) = &self.config_file {
            let parsed = crate::runtime::env_config::parse_toml_file(path)?;
            crate::runtime::env_config::apply_toml_config(&mut config, &parsed);
        }
        if self.env_overrides {
            apply_env_overrides(&mut config)?;
        }
        if let Some(n) = self.shards {
            config.shards = n;
        }
        if let Some(prefix) = &self.thread_name_prefix {
            config.thread_name_prefix.clone_from(prefix);
        }
        if let Some(size) = self.thread_stack_size {
            config.thread_stack_size = size;
        }
        config.validate()?;
        Ok(config)
    }

    /// Build the runtime, spawning one thread per shard.
    pub fn build(self) -> Result<ShardRuntime> {
        ShardRuntime::with_config(self.resolve_config()?)
    }
}

/// A running set of shards, one OS thread and event loop each.
///
/// Dropping the runtime shuts it down. Must not be dropped from one of its
/// own shard threads.
#[derive(Debug)]
pub struct ShardRuntime {
    config: ShardConfig,
    handle: ShardHandle,
    threads: Vec<JoinHandle<()>>,
}

impl ShardRuntime {
    /// Returns a builder with default configuration.
    #[must_use]
    pub fn builder() -> ShardRuntimeBuilder {
        ShardRuntimeBuilder::new()
    }

    /// Starts a runtime from an explicit configuration.
    pub fn with_config(config: ShardConfig) -> Result<Self> {
        config.validate()?;

        let mut senders = Vec::with_capacity(config.shards);
        let mut receivers = Vec::with_capacity(config.shards);
        for _ in 0..config.shards {
            let (tx, rx) = unbounded();
            senders.push(tx);
            receivers.push(rx);
        }
        let handle = ShardHandle::new(senders);

        let mut runtime = Self {
            config,
            handle,
            threads: Vec::with_capacity(receivers.len()),
        };
        for (shard, rx) in ShardId::all(runtime.config.shards).zip(receivers) {
            let thread_name = format!("{}-{}", runtime.config.thread_name_prefix, shard.index());
            let shard_handle = runtime.handle.clone();
            let spawned = std::thread::Builder::new()
                .name(thread_name)
                .stack_size(runtime.config.thread_stack_size)
                .spawn(move || run_shard(shard, rx, shard_handle));
            match spawned {
                Ok(join) => runtime.threads.push(join),
                Err(err) => {
                    runtime.shutdown();
                    return Err(Error::new(ErrorKind::ThreadSpawn)
                        .with_message(format!("failed to spawn {shard}"))
                        .with_shard(shard)
                        .with_source(err));
                }
            }
        }

        info!(
            shards = runtime.config.shards,
            prefix = %runtime.config.thread_name_prefix,
            "shard runtime started"
        );
        Ok(runtime)
    }

    /// Returns a cloneable submission handle.
    #[must_use]
    pub fn handle(&self) -> ShardHandle {
        self.handle.clone()
    }

    /// Returns the number of shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.handle.shard_count()
    }

    /// Returns the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    /// Runs `f` on `shard` and blocks the calling thread until it finishes.
    ///
    /// Intended for threads outside the runtime; calling it from a shard
    /// thread blocks that shard's event loop.
    pub fn block_on_shard<F, Fut, R>(&self, shard: ShardId, f: F) -> Result<R>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<R>> + 'static,
        R: Send + 'static,
    {
        if ShardContext::current_shard().is_some() {
            warn!(shard = %shard, "block_on_shard called from a shard thread");
        }
        futures::executor::block_on(self.handle.submit_to(shard, f))
    }

    /// Stops every shard and joins its thread.
    ///
    /// Work still pending on a shard is dropped; its dispatchers observe
    /// [`ErrorKind::Cancelled`]. Idempotent.
    pub fn shutdown(&mut self) {
        if self.threads.is_empty() && self.handle.is_closed() {
            return;
        }
        self.handle.close();
        for shard in ShardId::all(self.threads.len()) {
            // A shard whose queue is gone has already stopped.
            let _ = self.handle.send_command(shard, Command::Shutdown);
        }
        for join in self.threads.drain(..) {
            if join.join().is_err() {
                warn!("shard thread panicked during shutdown");
            }
        }
        info!(shards = self.config.shards, "shard runtime stopped");
    }
}

impl Drop for ShardRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
