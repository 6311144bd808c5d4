//! Error types and error handling strategy for shardsync.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Errors are cheap to clone, so one failure can be fanned out to every
//!   participant of a join episode without re-creating it
//! - Errors are classified by recoverability for retry logic
//!
//! # Error Categories
//!
//! - **Dispatch**: Cross-shard submission failures
//! - **Contract**: Caller misuse of single-use primitives
//! - **Config**: Runtime construction and configuration failures
//! - **Generation**: Failures raised by user-supplied generators
//! - **Internal**: Bugs and invalid states
//!
//! # Fan-out
//!
//! Cloning an [`Error`] shares its source through an [`Arc`], so every clone
//! handed to a waiter refers to the very same underlying failure. Use
//! [`Error::same_source`] to check that two errors came from one origin.

use core::fmt;
use std::sync::Arc;

use crate::types::ShardId;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Dispatch ===
    /// The target shard does not exist in the runtime.
    InvalidShard,
    /// The target shard's command queue is closed (runtime shut down).
    ShardClosed,
    /// The dispatched operation was dropped before it produced a reply.
    Cancelled,
    /// The caller is not running on a shard thread.
    NotOnShard,

    // === Contract ===
    /// A single-use primitive was used outside its contract
    /// (double join, reuse of a completed instance, over-subscription).
    ContractViolation,

    // === Config ===
    /// Invalid runtime configuration.
    InvalidConfig,
    /// A shard thread could not be spawned.
    ThreadSpawn,

    // === Generation ===
    /// The generator rejected the request because it is overloaded.
    Overloaded,
    /// User-provided error.
    User,

    // === Internal ===
    /// Internal error (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidShard | Self::ShardClosed | Self::Cancelled | Self::NotOnShard => {
                ErrorCategory::Dispatch
            }
            Self::ContractViolation => ErrorCategory::Contract,
            Self::InvalidConfig | Self::ThreadSpawn => ErrorCategory::Config,
            Self::Overloaded | Self::User => ErrorCategory::Generation,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Returns the recoverability classification for this error kind.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        match self {
            Self::Overloaded | Self::ThreadSpawn => Recoverability::Transient,

            Self::InvalidShard
            | Self::ShardClosed
            | Self::NotOnShard
            | Self::ContractViolation
            | Self::InvalidConfig
            | Self::Internal => Recoverability::Permanent,

            Self::Cancelled | Self::User => Recoverability::Unknown,
        }
    }

    /// Returns true if this error is typically retryable.
    ///
    /// Retrying a join always requires a fresh barrier instance.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.recoverability(), Recoverability::Transient)
    }
}

/// Classification of error recoverability for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recoverability {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// Permanent failure that will not succeed on retry.
    Permanent,
    /// Recoverability depends on context.
    Unknown,
}

impl Recoverability {
    /// Returns true if this error is safe to retry.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Returns true if this error should never be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Cross-shard dispatch failures.
    Dispatch,
    /// Caller contract violations.
    Contract,
    /// Configuration and construction failures.
    Config,
    /// Failures raised by generators.
    Generation,
    /// Internal errors.
    Internal,
}

/// The main error type for shardsync operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    shard: Option<ShardId>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            shard: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the recoverability classification.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        self.kind.recoverability()
    }

    /// Returns true if this error is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Returns true if this error reports caller misuse.
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(self.kind, ErrorKind::ContractViolation)
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Records the shard the error is about.
    #[must_use]
    pub fn with_shard(mut self, shard: ShardId) -> Self {
        self.shard = Some(shard);
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the shard the error is about, if recorded.
    #[must_use]
    pub const fn shard(&self) -> Option<ShardId> {
        self.shard
    }

    /// Returns true if both errors carry the same source allocation.
    ///
    /// Errors without a source never share one.
    #[must_use]
    pub fn same_source(&self, other: &Self) -> bool {
        match (&self.source, &other.source) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Creates an overloaded error.
    #[must_use]
    pub fn overloaded(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Overloaded).with_message(detail)
    }

    /// Wraps an arbitrary error raised by user code.
    #[must_use]
    pub fn user(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorKind::User).with_source(source)
    }

    /// Creates a contract violation error.
    #[must_use]
    pub fn contract_violation(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ContractViolation).with_message(detail)
    }

    /// Creates an invalid shard error.
    #[must_use]
    pub fn invalid_shard(shard: ShardId, shard_count: usize) -> Self {
        Self::new(ErrorKind::InvalidShard)
            .with_message(format!("{shard} is outside 0..{shard_count}"))
            .with_shard(shard)
    }

    /// Creates a shard closed error.
    #[must_use]
    pub fn shard_closed(shard: ShardId) -> Self {
        Self::new(ErrorKind::ShardClosed)
            .with_message(format!("{shard} is no longer accepting work"))
            .with_shard(shard)
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig).with_message(detail)
    }

    /// Creates an internal error (bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Extension trait for adding context to Results.
#[allow(clippy::result_large_err)]
pub trait ResultExt<T> {
    /// Attach a context message on error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
    /// Attach context message computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_message(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_message(f()))
    }
}

/// A specialized Result type for shardsync operations.
#[allow(clippy::result_large_err)]
pub type Result<T> = core::result::Result<T, Error>;
