//! Middleware: observers of transaction lifecycle changes.

use crate::transaction::TransactionInfo;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Notified every time a transaction enters `Running` or a terminal state.
///
/// Closures taking `&TransactionInfo` are middleware too.
pub trait Middleware: Send + Sync {
    fn on_transaction_state_change(&self, transaction: &TransactionInfo);
}

impl<F> Middleware for F
where
    F: Fn(&TransactionInfo) + Send + Sync,
{
    fn on_transaction_state_change(&self, transaction: &TransactionInfo) {
        self(transaction)
    }
}

/// Opaque handle assigned at registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MiddlewareId(Uuid);

/// Logs every lifecycle change through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn on_transaction_state_change(&self, transaction: &TransactionInfo) {
        match &transaction.error {
            Some(error) => warn!(
                transaction = %transaction.id,
                action = %transaction.action,
                state = %transaction.state,
                %error,
                "transaction failed"
            ),
            None => debug!(
                transaction = %transaction.id,
                action = %transaction.action,
                state = %transaction.state,
                elapsed = ?transaction.history.duration(),
                "transaction state changed"
            ),
        }
    }
}

/// Insertion-ordered set of middleware, deduplicated by `Arc` identity.
#[derive(Default)]
pub(crate) struct MiddlewareRegistry {
    entries: Vec<(MiddlewareId, Arc<dyn Middleware>)>,
}

fn same_instance(a: &Arc<dyn Middleware>, b: &Arc<dyn Middleware>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl MiddlewareRegistry {
    /// Add `middleware`, or return the id it is already registered under.
    pub(crate) fn register(&mut self, middleware: Arc<dyn Middleware>) -> MiddlewareId {
        if let Some((id, _)) = self
            .entries
            .iter()
            .find(|(_, existing)| same_instance(existing, &middleware))
        {
            return *id;
        }
        let id = MiddlewareId(Uuid::new_v4());
        self.entries.push((id, middleware));
        id
    }

    pub(crate) fn unregister(&mut self, id: MiddlewareId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        before != self.entries.len()
    }

    /// Remove every entry sharing `middleware`'s identity.
    pub(crate) fn unregister_instance(&mut self, middleware: &Arc<dyn Middleware>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|(_, existing)| !same_instance(existing, middleware));
        before - self.entries.len()
    }

    /// Registered middleware in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Middleware>> {
        self.entries.iter().map(|(_, m)| Arc::clone(m)).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
