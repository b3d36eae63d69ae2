//! Transaction lifecycle states and their history.
//!
//! A transaction moves through `Created → Scheduled → Running` and ends in
//! one of the terminal states. The history is an immutable log of those
//! moves, each stamped with the time it happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle state of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    Created,
    Scheduled,
    Running,
    Completed,
    Failed,
    /// Dropped by a throttle window. Not an error.
    Suppressed,
}

impl TransactionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Scheduled => "Scheduled",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Suppressed => "Suppressed",
        }
    }

    /// Terminal states never change again.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Suppressed)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_advance_to(&self, next: TransactionState) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Scheduled)
                | (Self::Created, Self::Suppressed)
                | (Self::Scheduled, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Record of a single lifecycle move.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LifecycleTransition {
    /// The state being left
    pub from: TransactionState,
    /// The state being entered
    pub to: TransactionState,
    /// When the move occurred
    pub timestamp: DateTime<Utc>,
}

/// Ordered history of lifecycle moves.
///
/// History is immutable - `record` returns a new history with the move
/// appended.
///
/// # Example
///
/// ```rust
/// use storekit::core::{LifecycleHistory, LifecycleTransition, TransactionState};
/// use chrono::Utc;
///
/// let history = LifecycleHistory::new().record(LifecycleTransition {
///     from: TransactionState::Created,
///     to: TransactionState::Scheduled,
///     timestamp: Utc::now(),
/// });
///
/// assert_eq!(
///     history.get_path(),
///     vec![TransactionState::Created, TransactionState::Scheduled]
/// );
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleHistory {
    transitions: Vec<LifecycleTransition>,
}

impl LifecycleHistory {
    pub fn new() -> Self {
        Self {
            transitions: Vec::new(),
        }
    }

    /// Return a new history with `transition` appended.
    pub fn record(&self, transition: LifecycleTransition) -> Self {
        let mut transitions = self.transitions.clone();
        transitions.push(transition);
        Self { transitions }
    }

    /// The sequence of states visited, starting from the first `from`.
    pub fn get_path(&self) -> Vec<TransactionState> {
        let mut path = Vec::with_capacity(self.transitions.len() + 1);
        if let Some(first) = self.transitions.first() {
            path.push(first.from);
        }
        path.extend(self.transitions.iter().map(|t| t.to));
        path
    }

    /// Time between the first and the last recorded move.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.transitions.first()?, self.transitions.last()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }

    /// When the given state was entered, if it was.
    pub fn entered_at(&self, state: TransactionState) -> Option<DateTime<Utc>> {
        self.transitions
            .iter()
            .find(|t| t.to == state)
            .map(|t| t.timestamp)
    }

    pub fn transitions(&self) -> &[LifecycleTransition] {
        &self.transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(from: TransactionState, to: TransactionState) -> LifecycleTransition {
        LifecycleTransition {
            from,
            to,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn is_final_identifies_terminal_states() {
        assert!(!TransactionState::Created.is_final());
        assert!(!TransactionState::Scheduled.is_final());
        assert!(!TransactionState::Running.is_final());
        assert!(TransactionState::Completed.is_final());
        assert!(TransactionState::Failed.is_final());
        assert!(TransactionState::Suppressed.is_final());
    }

    #[test]
    fn only_failed_is_an_error() {
        assert!(TransactionState::Failed.is_error());
        assert!(!TransactionState::Suppressed.is_error());
        assert!(!TransactionState::Completed.is_error());
    }

    #[test]
    fn legal_moves_follow_the_lifecycle() {
        use TransactionState::*;

        assert!(Created.can_advance_to(Scheduled));
        assert!(Created.can_advance_to(Suppressed));
        assert!(Scheduled.can_advance_to(Running));
        assert!(Running.can_advance_to(Completed));
        assert!(Running.can_advance_to(Failed));

        assert!(!Created.can_advance_to(Running));
        assert!(!Scheduled.can_advance_to(Completed));
        assert!(!Completed.can_advance_to(Running));
        assert!(!Failed.can_advance_to(Scheduled));
        assert!(!Suppressed.can_advance_to(Scheduled));
    }

    #[test]
    fn terminal_states_have_no_successor() {
        use TransactionState::*;
        let all = [Created, Scheduled, Running, Completed, Failed, Suppressed];

        for terminal in all.iter().filter(|s| s.is_final()) {
            assert!(all.iter().all(|next| !terminal.can_advance_to(*next)));
        }
    }

    #[test]
    fn new_history_is_empty() {
        let history = LifecycleHistory::new();
        assert!(history.transitions().is_empty());
        assert!(history.get_path().is_empty());
        assert!(history.duration().is_none());
    }

    #[test]
    fn record_is_immutable() {
        let history = LifecycleHistory::new();
        let next = history.record(step(TransactionState::Created, TransactionState::Scheduled));

        assert_eq!(history.transitions().len(), 0);
        assert_eq!(next.transitions().len(), 1);
    }

    #[test]
    fn get_path_returns_state_sequence() {
        let history = LifecycleHistory::new()
            .record(step(TransactionState::Created, TransactionState::Scheduled))
            .record(step(TransactionState::Scheduled, TransactionState::Running))
            .record(step(TransactionState::Running, TransactionState::Completed));

        assert_eq!(
            history.get_path(),
            vec![
                TransactionState::Created,
                TransactionState::Scheduled,
                TransactionState::Running,
                TransactionState::Completed,
            ]
        );
    }

    #[test]
    fn duration_calculates_elapsed_time() {
        let history =
            LifecycleHistory::new().record(step(TransactionState::Created, TransactionState::Scheduled));

        std::thread::sleep(Duration::from_millis(10));

        let history = history.record(step(TransactionState::Scheduled, TransactionState::Running));

        assert!(history.duration().unwrap() >= Duration::from_millis(10));
    }

    #[test]
    fn entered_at_finds_state() {
        let history = LifecycleHistory::new()
            .record(step(TransactionState::Created, TransactionState::Scheduled));

        assert!(history.entered_at(TransactionState::Scheduled).is_some());
        assert!(history.entered_at(TransactionState::Running).is_none());
    }

    #[test]
    fn history_serializes_correctly() {
        let history = LifecycleHistory::new()
            .record(step(TransactionState::Created, TransactionState::Scheduled));

        let json = serde_json::to_string(&history).unwrap();
        let deserialized: LifecycleHistory = serde_json::from_str(&json).unwrap();

        assert_eq!(history, deserialized);
    }
}
