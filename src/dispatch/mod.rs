//! Transaction scheduling.
//!
//! The [`Dispatcher`] decides on which execution context a transaction's
//! reducer body runs:
//!
//! - [`Strategy::Sync`] runs it on the caller's thread
//! - [`Strategy::Async`] hands it to the tokio blocking pool
//! - [`Strategy::Serial`] appends it to a named FIFO lane, shared by every
//!   dispatcher in the process
//! - [`Strategy::Detached`] gives it a thread of its own
//!
//! Scheduling and model atomicity are independent: many transactions may be
//! running at once, but their mutations still serialize inside the store.

mod queue;
mod strategy;
mod throttle;

pub use strategy::Strategy;

pub(crate) use throttle::{Admission, Throttle};

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{trace, warn};

/// A unit of work handed to an execution context.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors that can occur when creating a dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No tokio runtime is running. Use Dispatcher::new(handle) instead")]
    NoRuntime,

    #[error("Invalid dispatcher config: {0}")]
    Config(#[from] serde_json::Error),
}

/// Dispatcher settings.
///
/// Every field has a default, so a partial JSON document is a valid config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Throttle intervals at or below this value disable throttling.
    pub throttle_epsilon: Duration,

    /// Thread name for [`Strategy::Detached`] work.
    pub detached_thread_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            throttle_epsilon: Duration::from_micros(1),
            detached_thread_name: "storekit-detached".to_string(),
        }
    }
}

impl DispatcherConfig {
    pub fn from_json(json: &str) -> Result<Self, DispatchError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Whether `interval` opens a throttle window at all.
    pub fn throttles(&self, interval: Option<Duration>) -> Option<Duration> {
        interval.filter(|i| *i > self.throttle_epsilon)
    }
}

struct Inner {
    runtime: Handle,
    throttle: Throttle,
    config: DispatcherConfig,
}

/// Scheduler shared by any number of stores.
///
/// Cloning is cheap; clones share throttle windows. Serial lanes are shared
/// by every dispatcher in the process.
///
/// # Example
///
/// ```rust
/// use storekit::dispatch::{Dispatcher, Strategy};
///
/// # #[tokio::main]
/// # async fn main() {
/// let dispatcher = Dispatcher::current().unwrap();
/// assert_eq!(dispatcher.config().detached_thread_name, "storekit-detached");
/// # let _ = Strategy::serial("io");
/// # }
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Create a dispatcher that schedules on the given runtime.
    pub fn new(runtime: Handle) -> Self {
        Self::with_config(runtime, DispatcherConfig::default())
    }

    pub fn with_config(runtime: Handle, config: DispatcherConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                runtime,
                throttle: Throttle::default(),
                config,
            }),
        }
    }

    /// Create a dispatcher on the runtime the caller is running in.
    pub fn current() -> Result<Self, DispatchError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| DispatchError::NoRuntime)
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    /// Names of the serial lanes started in this process, sorted.
    pub fn queue_names(&self) -> Vec<String> {
        queue::names()
    }

    pub(crate) fn throttle(&self) -> &Throttle {
        &self.inner.throttle
    }

    /// Execute `job` according to `strategy`.
    pub(crate) fn submit(&self, strategy: &Strategy, job: Job) {
        trace!(%strategy, "submitting job");
        match strategy {
            Strategy::Sync => job(),
            Strategy::Async => {
                self.inner.runtime.spawn_blocking(job);
            }
            Strategy::Serial(name) => self.enqueue(name, job),
            Strategy::Detached => self.detach(job),
        }
    }

    fn enqueue(&self, name: &str, job: Job) {
        let runtime = self.inner.runtime.clone();
        let job: Job = Box::new(move || {
            let _context = runtime.enter();
            job()
        });
        if let Err(job) = queue::enqueue(name, job) {
            warn!(queue = name, "serial queue unavailable, using blocking pool");
            self.inner.runtime.spawn_blocking(job);
        }
    }

    fn detach(&self, job: Job) {
        let slot = Arc::new(Mutex::new(Some(job)));
        let thread_slot = Arc::clone(&slot);

        let spawned = thread::Builder::new()
            .name(self.inner.config.detached_thread_name.clone())
            .spawn(move || {
                if let Some(job) = take(&thread_slot) {
                    job();
                }
            });

        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn detached thread, using blocking pool");
            if let Some(job) = take(&slot) {
                self.inner.runtime.spawn_blocking(job);
            }
        }
    }
}

fn take(slot: &Mutex<Option<Job>>) -> Option<Job> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("throttled_actions", &self.inner.throttle.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
