//! Throttle windows keyed by store and action identity.

use crate::core::ActionId;
use crate::store::StoreId;
use crate::transaction::Outcome;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Result of asking the throttle table for permission to run.
pub(crate) enum Admission {
    Admitted,
    /// A run of the same action started inside the window. Carries that
    /// run's outcome feed.
    Suppressed(watch::Receiver<Option<Outcome>>),
}

struct Window {
    started: Instant,
    interval: Duration,
    outcome: watch::Receiver<Option<Outcome>>,
}

impl Window {
    fn is_open(&self, now: Instant) -> bool {
        now.duration_since(self.started) < self.interval
    }
}

#[derive(Default)]
pub(crate) struct Throttle {
    windows: DashMap<(StoreId, ActionId), Window>,
}

impl Throttle {
    /// Admit a run of `action` on `store` or suppress it if an admitted run
    /// started less than `interval` ago. An admitted run opens a new window.
    ///
    /// Expired windows are evicted on every call.
    pub(crate) fn admit(
        &self,
        store: StoreId,
        action: &ActionId,
        interval: Duration,
        outcome: &watch::Receiver<Option<Outcome>>,
    ) -> Admission {
        let now = Instant::now();
        self.windows.retain(|_, window| window.is_open(now));

        let window = Window {
            started: now,
            interval,
            outcome: outcome.clone(),
        };

        match self.windows.entry((store, action.clone())) {
            Entry::Occupied(entry) if now.duration_since(entry.get().started) < interval => {
                Admission::Suppressed(entry.get().outcome.clone())
            }
            Entry::Occupied(mut entry) => {
                entry.insert(window);
                Admission::Admitted
            }
            Entry::Vacant(entry) => {
                entry.insert(window);
                Admission::Admitted
            }
        }
    }

    /// Number of open windows.
    pub(crate) fn len(&self) -> usize {
        self.windows.len()
    }
}
