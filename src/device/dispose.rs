//! Cross-Thread Dispose Queue
//!
//! Native objects must only be released on the thread that owns the
//! context, but resource wrappers are dropped from wherever their owners
//! live (background loaders, finalizing threads). The queue accepts
//! deferred release actions from any thread and hands them to the owning
//! thread, which drains them at the end of each present call.

use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// A deferred release operation capturing the resources it frees.
pub type DisposeAction = Box<dyn FnOnce() + Send + 'static>;

/// Thread-safe queue of deferred release actions.
///
/// Only the dispose queue may be touched from non-owning threads; every
/// other device operation belongs to the owning thread alone.
pub struct DisposeQueue {
    owner: ThreadId,
    pending: Mutex<Vec<DisposeAction>>,
}

impl std::fmt::Debug for DisposeQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposeQueue")
            .field("owner", &self.owner)
            .field("pending_len", &self.pending.lock().len())
            .finish()
    }
}

impl DisposeQueue {
    /// Creates the queue, capturing the calling thread as owner.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self { owner: thread::current().id(), pending: Mutex::new(Vec::new()) })
    }

    /// Whether the calling thread owns the queue.
    #[must_use]
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Runs the action immediately when called on the owning thread;
    /// otherwise appends it for the next drain.
    pub fn enqueue(&self, action: impl FnOnce() + Send + 'static) {
        if self.is_owner_thread() {
            action();
        } else {
            self.pending.lock().push(Box::new(action));
        }
    }

    /// Executes every pending action. Called by the owning thread once per
    /// present.
    ///
    /// The pending list is swapped out under the lock and executed outside
    /// it, so an action may itself enqueue further work without
    /// deadlocking. A panicking action is reported and does not prevent
    /// the remaining actions in the same drain cycle from running.
    pub fn drain_pending(&self) {
        debug_assert!(
            self.is_owner_thread(),
            "DisposeQueue::drain_pending called off the owning thread"
        );

        let pending = std::mem::take(&mut *self.pending.lock());
        for action in pending {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(action)) {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_owned());
                log::error!("dispose action panicked: {message}");
            }
        }
    }

    /// Number of actions waiting for the next drain.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}
