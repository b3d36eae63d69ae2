//! Errors surfaced by transactions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure signalled by a reducer body.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionError {
    #[error("Action rejected: {0}")]
    Rejected(String),

    #[error("Action panicked: {0}")]
    Panicked(String),
}

impl ActionError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}

/// Errors that can occur when scheduling or running a transaction.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionError {
    #[error("No strategy attached. Call .on(strategy) before .run()")]
    MissingStrategy,

    #[error("Transaction is not bound to a store. Call .bind(&store) before .run()")]
    Unbound,

    #[error("The store this transaction was bound to has been dropped")]
    StoreDropped,

    #[error("Store type mismatch: expected {expected}")]
    StoreMismatch { expected: String },

    #[error("Transaction was abandoned before reaching a terminal state")]
    Abandoned,

    #[error(transparent)]
    Action(#[from] ActionError),
}
