//! Model observers and the executor they are notified on.
//!
//! Observers are presentation-side callbacks. Every notification a store
//! sends goes through one [`ObserverExecutor`], so observer code never runs
//! concurrently with itself.

use serde::{Deserialize, Serialize};
use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use tracing::warn;
use uuid::Uuid;

/// A unit of observer work.
pub type ObserverJob = Box<dyn FnOnce() + Send + 'static>;

/// Callback invoked with the latest model snapshot.
pub type Observer<M> = Arc<dyn Fn(&M) + Send + Sync>;

/// Handle returned by [`Store::subscribe`](crate::Store::subscribe).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(Uuid);

impl ObserverId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// The execution context observer notifications are marshaled onto.
pub trait ObserverExecutor: Send + Sync {
    fn execute(&self, job: ObserverJob);
}

/// Runs notifications immediately on whichever thread published the change.
///
/// Only suitable when the caller already guarantees a single publishing
/// thread, e.g. in tests or with `Strategy::Sync` from one thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl ObserverExecutor for InlineExecutor {
    fn execute(&self, job: ObserverJob) {
        job();
    }
}

/// A dedicated thread that runs notifications one at a time, in order.
///
/// Clones share the same thread. The thread exits once every clone is
/// dropped.
#[derive(Clone)]
pub struct MainExecutor {
    sender: Arc<Mutex<mpsc::Sender<ObserverJob>>>,
    thread: ThreadId,
}

impl MainExecutor {
    pub fn spawn(name: &str) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<ObserverJob>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })?;

        Ok(Self {
            sender: Arc::new(Mutex::new(sender)),
            thread: handle.thread().id(),
        })
    }

    /// Whether the calling thread is this executor's thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread
    }
}

impl ObserverExecutor for MainExecutor {
    fn execute(&self, job: ObserverJob) {
        if self.is_current() {
            job();
            return;
        }
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if sender.send(job).is_err() {
            warn!("observer thread has exited, dropping notification");
        }
    }
}

impl std::fmt::Debug for MainExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainExecutor")
            .field("thread", &self.thread)
            .finish()
    }
}
