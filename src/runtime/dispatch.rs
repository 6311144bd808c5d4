//! Cross-shard dispatch.
//!
//! [`Dispatch`] is the one capability the join barrier needs from its
//! environment: run a closure on a named shard and hand its result back to
//! the caller as a single asynchronous round-trip. [`ShardHandle`] provides
//! it for [`ShardRuntime`](super::ShardRuntime); other runtimes can implement
//! the trait directly.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, LocalBoxFuture};

use crate::error::{Error, ErrorKind, Result};
use crate::runtime::shard::{Command, Job};
use crate::tracing_compat::trace;
use crate::types::ShardId;

/// Runs closures on named shards.
pub trait Dispatch {
    /// Returns the number of shards addressable through this dispatcher.
    fn shard_count(&self) -> usize;

    /// Runs `f` on `shard` and resolves to the result of the future it builds.
    ///
    /// `f` is moved to the target shard and invoked there; the future it
    /// returns is polled only by that shard's event loop, so it need not be
    /// `Send`. Failures of the closure propagate unchanged. Dispatch itself
    /// fails with:
    ///
    /// - [`ErrorKind::InvalidShard`] if `shard` is out of range
    /// - [`ErrorKind::ShardClosed`] if the shard no longer accepts work
    /// - [`ErrorKind::Cancelled`] if the shard dropped the work unfinished
    fn submit_to<F, Fut, R>(&self, shard: ShardId, f: F) -> BoxFuture<'static, Result<R>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<R>> + 'static,
        R: Send + 'static;
}

pub(crate) struct RuntimeShared {
    command_txs: Vec<Sender<Command>>,
    closed: AtomicBool,
}

/// Cloneable handle for submitting work to the shards of a runtime.
#[derive(Clone)]
pub struct ShardHandle {
    inner: Arc<RuntimeShared>,
}

impl std::fmt::Debug for ShardHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardHandle")
            .field("shard_count", &self.shard_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ShardHandle {
    pub(crate) fn new(command_txs: Vec<Sender<Command>>) -> Self {
        Self {
            inner: Arc::new(RuntimeShared {
                command_txs,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the number of shards in the runtime.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.inner.command_txs.len()
    }

    /// Returns true once the runtime started shutting down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub(crate) fn waker_sender(&self, shard: ShardId) -> Option<Sender<Command>> {
        self.inner.command_txs.get(shard.index()).cloned()
    }

    pub(crate) fn send_command(&self, shard: ShardId, command: Command) -> Result<()> {
        let tx = self
            .inner
            .command_txs
            .get(shard.index())
            .ok_or_else(|| Error::invalid_shard(shard, self.shard_count()))?;
        tx.send(command).map_err(|_| Error::shard_closed(shard))
    }

    fn submit_job(&self, shard: ShardId, job: Job) -> Result<()> {
        if shard.index() >= self.shard_count() {
            return Err(Error::invalid_shard(shard, self.shard_count()));
        }
        if self.is_closed() {
            return Err(Error::shard_closed(shard));
        }
        trace!(shard = %shard, "submitting job");
        self.send_command(shard, Command::Run(job))
    }

    /// Spawns a fire-and-forget task built by `f` on `shard`.
    pub fn spawn_on<F, Fut>(&self, shard: ShardId, f: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.submit_job(
            shard,
            Box::new(move || -> LocalBoxFuture<'static, ()> { f().boxed_local() }),
        )
    }

    /// Returns an iterator over every shard of the runtime.
    pub fn shards(&self) -> impl Iterator<Item = ShardId> {
        ShardId::all(self.shard_count())
    }
}

impl Dispatch for ShardHandle {
    fn shard_count(&self) -> usize {
        Self::shard_count(self)
    }

    fn submit_to<F, Fut, R>(&self, shard: ShardId, f: F) -> BoxFuture<'static, Result<R>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<R>> + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<R>>();
        let job: Job = Box::new(move || -> LocalBoxFuture<'static, ()> {
            async move {
                let out = f().await;
                // The caller may have given up; nobody to tell.
                let _ = reply_tx.send(out);
            }
            .boxed_local()
        });
        let submitted = self.submit_job(shard, job);

        async move {
            submitted?;
            match reply_rx.await {
                Ok(result) => result,
                Err(oneshot::Canceled) => Err(Error::new(ErrorKind::Cancelled)
                    .with_message(format!("{shard} dropped the dispatched work"))
                    .with_shard(shard)),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ShardRuntime;
    use crate::test_utils::init_test_logging;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    fn runtime(shards: usize) -> ShardRuntime {
        ShardRuntime::builder()
            .shards(shards)
            .thread_name_prefix("dispatch-test")
            .build()
            .expect("runtime")
    }

    #[test]
    fn submit_runs_on_target_shard() {
        init_test("submit_runs_on_target_shard");
        let rt = runtime(3);
        let handle = rt.handle();

        for shard in handle.shards() {
            let seen = futures::executor::block_on(
                handle.submit_to(shard, || async {
                    Ok::<_, Error>(crate::runtime::ShardContext::current_shard())
                }),
            )
            .expect("dispatch");
            crate::assert_with_log!(seen == Some(shard), "ran on target", Some(shard), seen);
        }
        crate::test_complete!("submit_runs_on_target_shard");
    }

    #[test]
    fn closure_error_propagates_unchanged() {
        init_test("closure_error_propagates_unchanged");
        let rt = runtime(2);
        let err = futures::executor::block_on(rt.handle().submit_to(ShardId::new(1), || async {
            Err::<(), _>(Error::overloaded("busy"))
        }))
        .expect_err("closure failed");
        crate::assert_with_log!(
            err.kind() == ErrorKind::Overloaded,
            "kind kept",
            ErrorKind::Overloaded,
            err.kind()
        );
        crate::test_complete!("closure_error_propagates_unchanged");
    }

    #[test]
    fn spawn_on_runs_detached_task() {
        init_test("spawn_on_runs_detached_task");
        let rt = runtime(2);
        let (done_tx, done_rx) = oneshot::channel();
        rt.handle()
            .spawn_on(ShardId::new(1), move || async move {
                let _ = done_tx.send(crate::runtime::ShardContext::current_shard());
            })
            .expect("spawn");
        let ran_on = futures::executor::block_on(done_rx).expect("task ran");
        crate::assert_with_log!(
            ran_on == Some(ShardId::new(1)),
            "ran on target",
            Some(ShardId::new(1)),
            ran_on
        );
        crate::test_complete!("spawn_on_runs_detached_task");
    }

    #[test]
    fn out_of_range_shard_is_rejected() {
        init_test("out_of_range_shard_is_rejected");
        let rt = runtime(2);
        let err = futures::executor::block_on(
            rt.handle()
                .submit_to(ShardId::new(5), || async { Ok::<_, Error>(()) }),
        )
        .expect_err("no such shard");
        crate::assert_with_log!(
            err.kind() == ErrorKind::InvalidShard,
            "invalid shard",
            ErrorKind::InvalidShard,
            err.kind()
        );
        crate::test_complete!("out_of_range_shard_is_rejected");
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        init_test("submit_after_shutdown_is_rejected");
        let mut rt = runtime(1);
        let handle = rt.handle();
        rt.shutdown();
        let err = futures::executor::block_on(handle.submit_to(ShardId::ZERO, || async { Ok::<_, Error>(()) }))
            .expect_err("closed");
        crate::assert_with_log!(
            err.kind() == ErrorKind::ShardClosed,
            "closed",
            ErrorKind::ShardClosed,
            err.kind()
        );
        crate::test_complete!("submit_after_shutdown_is_rejected");
    }

    #[test]
    fn shutdown_cancels_pending_work() {
        init_test("shutdown_cancels_pending_work");
        let mut rt = runtime(1);
        let pending = rt
            .handle()
            .submit_to(ShardId::ZERO, || futures::future::pending::<Result<()>>());
        // Make sure the job reached the shard before stopping it.
        rt.block_on_shard(ShardId::ZERO, || async { Ok::<_, Error>(()) })
            .expect("round trip");
        rt.shutdown();
        let err = futures::executor::block_on(pending).expect_err("cancelled");
        crate::assert_with_log!(err.is_cancelled(), "cancelled", true, err.is_cancelled());
        crate::test_complete!("shutdown_cancels_pending_work");
    }
}
