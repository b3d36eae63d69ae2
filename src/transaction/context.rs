//! Context handed to a reducer body.

use super::error::ActionError;
use super::TransactionInfo;
use crate::core::{Model, TransactionState};
use crate::store::Store;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// What a running action sees: its store and its own transaction record.
pub struct TransactionContext<'a, M: Model> {
    store: &'a Store<M>,
    transaction: &'a TransactionInfo,
}

impl<'a, M: Model> TransactionContext<'a, M> {
    pub(crate) fn new(store: &'a Store<M>, transaction: &'a TransactionInfo) -> Self {
        Self { store, transaction }
    }

    /// The current model snapshot.
    pub fn read(&self) -> Arc<M> {
        self.store.read()
    }

    /// Edit a copy of the model and publish it, on behalf of this transaction.
    pub fn reduce_model<F>(&self, edit: F)
    where
        F: FnOnce(&mut M),
    {
        self.store.mutate(Some(self.transaction), edit)
    }

    /// Fallible [`reduce_model`](Self::reduce_model). An error publishes
    /// nothing and can be returned straight from `Action::reduce`.
    pub fn try_reduce_model<F>(&self, edit: F) -> Result<(), ActionError>
    where
        F: FnOnce(&mut M) -> Result<(), ActionError>,
    {
        self.store.try_mutate(Some(self.transaction), edit)
    }

    pub fn transaction(&self) -> &TransactionInfo {
        self.transaction
    }

    pub fn store(&self) -> &Store<M> {
        self.store
    }

    /// Time since the transaction was scheduled.
    pub fn elapsed(&self) -> Duration {
        self.transaction
            .history
            .entered_at(TransactionState::Scheduled)
            .and_then(|at| Utc::now().signed_duration_since(at).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }
}
