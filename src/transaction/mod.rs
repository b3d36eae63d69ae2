//! Transactions: one scheduled execution of an action against a store.
//!
//! A [`Transaction`] binds an action to a store, carries a [`Strategy`] and
//! an optional throttle interval, and is consumed by `run`. The lifecycle is
//! `Created → Scheduled → Running → (Completed | Failed)`; the store's
//! middleware is notified on entering `Running` and on the terminal state.
//!
//! # Example
//!
//! ```rust
//! use storekit::{Action, Model, Store, Strategy};
//! use storekit::transaction::{ActionError, TransactionContext};
//!
//! #[derive(Clone, Debug, Default)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! impl Model for Counter {}
//!
//! struct Increment;
//!
//! impl Action for Increment {
//!     type Model = Counter;
//!
//!     fn reduce(&self, ctx: &TransactionContext<'_, Counter>) -> Result<(), ActionError> {
//!         ctx.reduce_model(|m| m.count += 1);
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = Store::new(Counter::default()).unwrap();
//!
//! store.transaction(Increment).on(Strategy::Sync).run().unwrap();
//! assert_eq!(store.read().count, 1);
//!
//! let handle = store.transaction(Increment).on(Strategy::Async).run().unwrap();
//! handle.wait().await.unwrap();
//! assert_eq!(store.read().count, 2);
//! # }
//! ```

mod context;
mod error;

pub use context::TransactionContext;
pub use error::{ActionError, TransactionError};

use crate::core::{
    Action, ActionId, LifecycleHistory, LifecycleTransition, Model, TransactionState,
};
use crate::dispatch::{Admission, Dispatcher, Strategy};
use crate::store::{Store, WeakStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Terminal result of a transaction.
pub type Outcome = Result<(), TransactionError>;

/// Callback fired once with the transaction's outcome.
pub type CompletionHandler = Box<dyn FnOnce(&Outcome) + Send + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Observable record of a transaction, handed to middleware.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub action: ActionId,
    pub strategy: Option<Strategy>,
    pub throttle: Option<Duration>,
    pub state: TransactionState,
    pub history: LifecycleHistory,
    /// Set when the transaction fails.
    pub error: Option<TransactionError>,
}

impl TransactionInfo {
    pub fn new(action: ActionId, strategy: Option<Strategy>, throttle: Option<Duration>) -> Self {
        Self {
            id: TransactionId(Uuid::new_v4()),
            action,
            strategy,
            throttle,
            state: TransactionState::Created,
            history: LifecycleHistory::new(),
            error: None,
        }
    }

    pub fn is_final(&self) -> bool {
        self.state.is_final()
    }

    fn advance(&mut self, next: TransactionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal lifecycle move {} -> {}",
            self.state,
            next
        );
        self.history = self.history.record(LifecycleTransition {
            from: self.state,
            to: next,
            timestamp: Utc::now(),
        });
        self.state = next;
    }
}

/// Handle to the outcome of a scheduled transaction.
#[derive(Clone, Debug)]
pub struct TransactionHandle {
    id: TransactionId,
    outcome: watch::Receiver<Option<Outcome>>,
}

impl TransactionHandle {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// The outcome, if the transaction has finished.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Wait for the terminal outcome.
    pub async fn wait(self) -> Outcome {
        wait_outcome(self.outcome).await
    }
}

async fn wait_outcome(mut outcome: watch::Receiver<Option<Outcome>>) -> Outcome {
    match outcome.wait_for(Option::is_some).await {
        Ok(ready) => (*ready).clone().unwrap_or(Err(TransactionError::Abandoned)),
        Err(_) => Err(TransactionError::Abandoned),
    }
}

/// One scheduled execution of an action against a store.
pub struct Transaction<A: Action> {
    action: Arc<A>,
    store: Option<WeakStore<A::Model>>,
    info: TransactionInfo,
}

impl<A: Action> Transaction<A> {
    /// Create a transaction bound to `store`.
    pub fn new(action: A, store: &Store<A::Model>) -> Self {
        Self::unbound(action).bind(store)
    }

    /// Create a transaction with no store yet. It must be bound before it
    /// runs; plans bind their steps automatically.
    pub fn unbound(action: A) -> Self {
        let info = TransactionInfo::new(action.id(), None, None);
        Self {
            action: Arc::new(action),
            store: None,
            info,
        }
    }

    pub fn bind(mut self, store: &Store<A::Model>) -> Self {
        self.bind_in_place(store);
        self
    }

    pub(crate) fn bind_in_place(&mut self, store: &Store<A::Model>) {
        self.store = Some(store.downgrade());
    }

    /// Bind to a type-erased store, checking that it is a
    /// `Store<A::Model>`.
    pub fn bind_any(self, store: &dyn Any) -> Result<Self, TransactionError> {
        let store = store
            .downcast_ref::<Store<A::Model>>()
            .ok_or_else(|| TransactionError::StoreMismatch {
                expected: std::any::type_name::<Store<A::Model>>().to_string(),
            })?;
        Ok(self.bind(store))
    }

    /// Attach the execution strategy (required before `run`).
    pub fn on(mut self, strategy: Strategy) -> Self {
        self.info.strategy = Some(strategy);
        self
    }

    /// Suppress runs of the same action identity that start within
    /// `interval` of an admitted run.
    pub fn throttle(mut self, interval: Duration) -> Self {
        self.info.throttle = Some(interval);
        self
    }

    pub fn info(&self) -> &TransactionInfo {
        &self.info
    }

    pub fn action(&self) -> &A {
        &self.action
    }

    pub(crate) fn has_strategy(&self) -> bool {
        self.info.strategy.is_some()
    }

    pub(crate) fn set_strategy(&mut self, strategy: Strategy) {
        self.info.strategy = Some(strategy);
    }

    /// Schedule the transaction.
    ///
    /// With [`Strategy::Sync`] the reducer has finished when this returns.
    /// Errors are returned only for transactions that could not be
    /// scheduled; execution failures arrive through the handle.
    pub fn run(self) -> Result<TransactionHandle, TransactionError> {
        self.dispatch(None)
    }

    /// Schedule the transaction and call `handler` with its outcome.
    ///
    /// A run suppressed by a throttle window still calls `handler`, with
    /// the outcome of the run that opened the window.
    pub fn run_with<F>(self, handler: F) -> Result<TransactionHandle, TransactionError>
    where
        F: FnOnce(&Outcome) + Send + 'static,
    {
        self.dispatch(Some(Box::new(handler)))
    }

    fn dispatch(
        self,
        handler: Option<CompletionHandler>,
    ) -> Result<TransactionHandle, TransactionError> {
        let Transaction {
            action,
            store,
            mut info,
        } = self;

        let strategy = info
            .strategy
            .clone()
            .ok_or(TransactionError::MissingStrategy)?;
        let store = store.ok_or(TransactionError::Unbound)?;
        let (store_id, dispatcher) = {
            let bound = store.upgrade().ok_or(TransactionError::StoreDropped)?;
            (bound.id(), bound.dispatcher().clone())
        };

        let (sender, receiver) = watch::channel(None);

        if let Some(interval) = dispatcher.config().throttles(info.throttle) {
            if let Admission::Suppressed(original) = dispatcher
                .throttle()
                .admit(store_id, &info.action, interval, &receiver)
            {
                info.advance(TransactionState::Suppressed);
                debug!(
                    transaction = %info.id,
                    action = %info.action,
                    ?interval,
                    "transaction suppressed by throttle"
                );
                if let Some(handler) = handler {
                    deliver_when_ready(&dispatcher, original.clone(), handler);
                }
                return Ok(TransactionHandle {
                    id: info.id,
                    outcome: original,
                });
            }
        }

        info.advance(TransactionState::Scheduled);
        debug!(
            transaction = %info.id,
            action = %info.action,
            %strategy,
            "transaction scheduled"
        );

        let handle = TransactionHandle {
            id: info.id,
            outcome: receiver,
        };
        dispatcher.submit(
            &strategy,
            Box::new(move || execute(store, action, info, sender, handler)),
        );
        Ok(handle)
    }
}

impl<A: Action> fmt::Debug for Transaction<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("info", &self.info)
            .field("bound", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

fn deliver_when_ready(
    dispatcher: &Dispatcher,
    outcome: watch::Receiver<Option<Outcome>>,
    handler: CompletionHandler,
) {
    let ready = outcome.borrow().clone();
    match ready {
        Some(outcome) => handler(&outcome),
        None => {
            dispatcher.runtime().spawn(async move {
                let outcome = wait_outcome(outcome).await;
                handler(&outcome);
            });
        }
    }
}

fn execute<A: Action>(
    store: WeakStore<A::Model>,
    action: Arc<A>,
    mut info: TransactionInfo,
    sender: watch::Sender<Option<Outcome>>,
    handler: Option<CompletionHandler>,
) {
    info.advance(TransactionState::Running);
    let store = store.upgrade();

    let outcome = match &store {
        Some(store) => {
            store.notify_middleware(&info);
            reduce(store, action.as_ref(), &info)
        }
        None => Err(TransactionError::StoreDropped),
    };

    match &outcome {
        Ok(()) => {
            info.advance(TransactionState::Completed);
            debug!(
                transaction = %info.id,
                action = %info.action,
                elapsed = ?info.history.duration(),
                "transaction completed"
            );
        }
        Err(e) => {
            info.error = Some(e.clone());
            info.advance(TransactionState::Failed);
            warn!(
                transaction = %info.id,
                action = %info.action,
                error = %e,
                "transaction failed"
            );
        }
    }

    if let Some(store) = &store {
        store.notify_middleware(&info);
    }

    sender.send_replace(Some(outcome.clone()));
    if let Some(handler) = handler {
        handler(&outcome);
    }
}

fn reduce<A: Action>(store: &Store<A::Model>, action: &A, info: &TransactionInfo) -> Outcome {
    let ctx = TransactionContext::new(store, info);
    match panic::catch_unwind(AssertUnwindSafe(|| action.reduce(&ctx))) {
        Ok(result) => result.map_err(TransactionError::from),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(transaction = %info.id, panic = %message, "reducer panicked");
            Err(ActionError::Panicked(message).into())
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one transaction per action with a shared strategy.
///
/// The transactions are independent: this is not a barrier. Scheduling
/// stops at the first transaction that cannot be scheduled; those already
/// scheduled keep running.
pub fn run_all<M, A, I>(
    store: &Store<M>,
    actions: I,
    strategy: Strategy,
) -> Result<Vec<TransactionHandle>, TransactionError>
where
    M: Model,
    A: Action<Model = M>,
    I: IntoIterator<Item = A>,
{
    actions
        .into_iter()
        .map(|action| Transaction::new(action, store).on(strategy.clone()).run())
        .collect()
}
