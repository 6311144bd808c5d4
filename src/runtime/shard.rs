//! Shard event loop and the thread-local shard context.
//!
//! Each shard is one OS thread running a single-threaded [`LocalPool`].
//! Work arrives as [`Command`]s on the shard's queue; a command builds a
//! future on the shard thread and spawns it locally, so the future itself
//! never needs to be `Send`.
//!
//! Wakers handed to shard-local futures also post [`Command::Wake`] on the
//! shard's own queue. That keeps the loop simple: it only ever blocks on the
//! queue, and a wake-up from any thread unblocks it.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use crossbeam_channel::{Receiver, Sender};
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;

use crate::runtime::dispatch::ShardHandle;
use crate::tracing_compat::{debug, trace, warn};
use crate::types::ShardId;

/// Builds a shard-local future on the shard thread.
pub(crate) type Job = Box<dyn FnOnce() -> LocalBoxFuture<'static, ()> + Send>;

/// Message delivered to a shard's queue.
pub(crate) enum Command {
    /// Build and spawn a local task.
    Run(Job),
    /// A local task was woken; poll the pool.
    Wake,
    /// Stop the event loop, dropping unfinished tasks.
    Shutdown,
}

thread_local! {
    static CURRENT_SHARD: RefCell<Option<ShardContext>> = const { RefCell::new(None) };
}

/// Handle to the shard the current thread is running.
///
/// Only available on shard threads; see [`ShardContext::current`].
#[derive(Clone)]
pub struct ShardContext {
    shard: ShardId,
    handle: ShardHandle,
    spawner: LocalSpawner,
}

impl std::fmt::Debug for ShardContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardContext")
            .field("shard", &self.shard)
            .field("shard_count", &self.handle.shard_count())
            .finish_non_exhaustive()
    }
}

impl ShardContext {
    /// Returns the context of the shard running on this thread.
    #[must_use]
    pub fn current() -> Option<Self> {
        CURRENT_SHARD.with(|ctx| ctx.borrow().clone())
    }

    /// Returns the id of the shard running on this thread, if any.
    #[must_use]
    pub fn current_shard() -> Option<ShardId> {
        CURRENT_SHARD.with(|ctx| ctx.borrow().as_ref().map(|c| c.shard))
    }

    /// Returns this shard's id.
    #[must_use]
    pub fn shard_id(&self) -> ShardId {
        self.shard
    }

    /// Returns the number of shards in the runtime.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.handle.shard_count()
    }

    /// Returns a submission handle for the runtime this shard belongs to.
    #[must_use]
    pub fn handle(&self) -> &ShardHandle {
        &self.handle
    }

    /// Spawns a task on this shard's event loop.
    ///
    /// Returns `false` if the event loop is shutting down.
    pub fn spawn_local<F>(&self, fut: F) -> bool
    where
        F: Future<Output = ()> + 'static,
    {
        spawn_job(
            &self.spawner,
            self.shard,
            self.handle.waker_sender(self.shard),
            Box::pin(fut),
        )
    }
}

/// Waker that wakes the pool's task and nudges the shard loop.
struct ShardWaker {
    inner: Waker,
    tx: Sender<Command>,
}

impl Wake for ShardWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.inner.wake_by_ref();
        // A closed queue means the loop already stopped.
        let _ = self.tx.send(Command::Wake);
    }
}

/// Shard-local task whose wake-ups reach the shard loop.
struct LoopTask {
    fut: LocalBoxFuture<'static, ()>,
    tx: Sender<Command>,
    /// Pool waker and the wrapper built around it, reused while the pool
    /// waker stays the same so `will_wake` holds across polls.
    waker: Option<(Waker, Waker)>,
}

impl LoopTask {
    fn new(fut: LocalBoxFuture<'static, ()>, tx: Sender<Command>) -> Self {
        Self {
            fut,
            tx,
            waker: None,
        }
    }
}

impl Future for LoopTask {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        let fresh = this
            .waker
            .as_ref()
            .is_some_and(|(inner, _)| inner.will_wake(cx.waker()));
        if !fresh {
            this.waker = None;
        }
        let (_, wrapped) = this.waker.get_or_insert_with(|| {
            let wrapped = Waker::from(Arc::new(ShardWaker {
                inner: cx.waker().clone(),
                tx: this.tx.clone(),
            }));
            (cx.waker().clone(), wrapped)
        });
        let mut cx = Context::from_waker(wrapped);
        this.fut.as_mut().poll(&mut cx)
    }
}

fn spawn_job(
    spawner: &LocalSpawner,
    shard: ShardId,
    tx: Option<Sender<Command>>,
    fut: LocalBoxFuture<'static, ()>,
) -> bool {
    let Some(tx) = tx else {
        return false;
    };
    match spawner.spawn_local(LoopTask::new(fut, tx)) {
        Ok(()) => true,
        Err(_) => {
            warn!(shard = %shard, "shard event loop refused task");
            false
        }
    }
}

/// Runs the event loop of one shard until shutdown.
pub(crate) fn run_shard(shard: ShardId, rx: Receiver<Command>, handle: ShardHandle) {
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    let tx = handle.waker_sender(shard);

    CURRENT_SHARD.with(|slot| {
        *slot.borrow_mut() = Some(ShardContext {
            shard,
            handle,
            spawner: spawner.clone(),
        });
    });
    debug!(shard = %shard, "shard event loop started");

    'event_loop: loop {
        pool.run_until_stalled();

        // Park until there is something to do, then drain without blocking.
        let Ok(first) = rx.recv() else {
            break;
        };
        let mut next = Some(first);
        while let Some(command) = next.take() {
            match command {
                Command::Run(job) => {
                    trace!(shard = %shard, "shard running submitted job");
                    spawn_job(&spawner, shard, tx.clone(), job());
                }
                Command::Wake => {}
                Command::Shutdown => break 'event_loop,
            }
            next = rx.try_recv().ok();
        }
    }

    CURRENT_SHARD.with(|slot| slot.borrow_mut().take());
    // Unfinished tasks are dropped here, which cancels their reply channels.
    drop(pool);
    debug!(shard = %shard, "shard event loop stopped");
}
