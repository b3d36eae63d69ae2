//! Named serial lanes.
//!
//! Lanes are process-wide and keyed by name: every dispatcher, and so every
//! store, submitting to `"io"` feeds the same lane. Each lane is an unbounded
//! channel drained by one dedicated thread, so jobs on a lane run one at a
//! time in submission order.

use super::Job;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use std::thread;
use tokio::sync::mpsc;
use tracing::{error, trace};

static LANES: OnceLock<DashMap<String, SerialQueue>> = OnceLock::new();

fn lanes() -> &'static DashMap<String, SerialQueue> {
    LANES.get_or_init(DashMap::new)
}

struct SerialQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl SerialQueue {
    fn spawn(name: &str) -> io::Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let lane = name.to_string();

        thread::Builder::new()
            .name(format!("storekit-serial-{name}"))
            .spawn(move || {
                trace!(queue = %lane, "serial queue started");
                while let Some(job) = receiver.blocking_recv() {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!(queue = %lane, "serial queue job panicked");
                    }
                }
            })?;

        Ok(Self { sender })
    }
}

/// Append `job` to the lane called `name`, starting the lane on first use.
///
/// Returns the job back if the lane's thread could not be started.
pub(crate) fn enqueue(name: &str, job: Job) -> Result<(), Job> {
    let lane = match lanes().entry(name.to_string()) {
        Entry::Occupied(entry) => entry.into_ref(),
        Entry::Vacant(entry) => match SerialQueue::spawn(name) {
            Ok(queue) => entry.insert(queue),
            Err(e) => {
                error!(queue = name, error = %e, "failed to start serial queue");
                return Err(job);
            }
        },
    };
    lane.sender.send(job).map_err(|e| e.0)
}

/// Names of every lane started in this process, sorted.
pub(crate) fn names() -> Vec<String> {
    let mut names: Vec<String> = lanes().iter().map(|entry| entry.key().clone()).collect();
    names.sort();
    names
}
