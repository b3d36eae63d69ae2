//! Execution strategies a transaction can request.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where and when a transaction's reducer body runs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Run on the calling thread before `run` returns.
    Sync,

    /// Run on the runtime's blocking pool. No ordering guarantee.
    Async,

    /// Run on the named serial lane. Transactions sharing a name execute one
    /// at a time, in submission order, whichever store they belong to.
    Serial(String),

    /// Run on a dedicated thread with no queue or runtime affinity.
    Detached,
}

impl Strategy {
    /// Shorthand for [`Strategy::Serial`].
    pub fn serial(queue: impl Into<String>) -> Self {
        Self::Serial(queue.into())
    }

    /// Whether `run` returns before the reducer body has executed.
    pub fn is_async(&self) -> bool {
        !matches!(self, Self::Sync)
    }

    pub fn queue_name(&self) -> Option<&str> {
        match self {
            Self::Serial(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => f.write_str("sync"),
            Self::Async => f.write_str("async"),
            Self::Serial(name) => write!(f, "serial({name})"),
            Self::Detached => f.write_str("detached"),
        }
    }
}
