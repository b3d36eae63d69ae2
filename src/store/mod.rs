//! The store: owner of the current model.
//!
//! A [`Store`] holds one model value and replaces it wholesale on every
//! mutation. Mutations are serialized by the store's lock; reads only ever
//! see fully published snapshots. After each mutation the store's observers
//! are notified on the store's [`ObserverExecutor`].

mod error;
mod middleware;
mod observer;

pub use error::BuildError;
pub use middleware::{Middleware, MiddlewareId, TracingMiddleware};
pub use observer::{
    InlineExecutor, MainExecutor, Observer, ObserverExecutor, ObserverId, ObserverJob,
};

use crate::core::{Action, Model};
use crate::dispatch::Dispatcher;
use crate::transaction::{Transaction, TransactionInfo};
use middleware::MiddlewareRegistry;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tracing::trace;
use uuid::Uuid;

/// Hook called after every publication with the transaction (if any), the
/// previous model and the new one. Runs while the mutation lock is held.
pub type MutationHook<M> = Arc<dyn Fn(Option<&TransactionInfo>, &M, &M) + Send + Sync>;

/// Identity of a store, stable for its whole life.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId(Uuid);

impl StoreId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

struct Shared<M: Model> {
    id: StoreId,
    model: watch::Sender<Arc<M>>,
    /// The mutation lock. Also guards the middleware registry.
    lock: Mutex<MiddlewareRegistry>,
    observers: Mutex<Vec<(ObserverId, Observer<M>)>>,
    executor: Arc<dyn ObserverExecutor>,
    dispatcher: Dispatcher,
    on_mutation: Option<MutationHook<M>>,
}

/// Shared handle to a model and everything that watches it.
///
/// Cloning is cheap; clones refer to the same store.
///
/// # Example
///
/// ```rust
/// use storekit::{Model, Store};
///
/// #[derive(Clone, Debug, Default)]
/// struct Counter {
///     count: i64,
/// }
///
/// impl Model for Counter {}
///
/// # #[tokio::main]
/// # async fn main() {
/// let store = Store::new(Counter::default()).unwrap();
/// store.mutate(None, |m| m.count += 1);
///
/// assert_eq!(store.read().count, 1);
/// # }
/// ```
pub struct Store<M: Model> {
    shared: Arc<Shared<M>>,
}

impl<M: Model> Clone for Store<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Non-owning reference to a store, held by transactions.
pub struct WeakStore<M: Model> {
    shared: Weak<Shared<M>>,
}

impl<M: Model> Clone for WeakStore<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<M: Model> WeakStore<M> {
    pub fn upgrade(&self) -> Option<Store<M>> {
        self.shared.upgrade().map(|shared| Store { shared })
    }
}

impl<M: Model> Store<M> {
    /// Build a store with the default dispatcher and observer thread.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn new(initial: M) -> Result<Self, BuildError> {
        StoreBuilder::new().initial(initial).build()
    }

    pub fn builder() -> StoreBuilder<M> {
        StoreBuilder::new()
    }

    pub fn id(&self) -> StoreId {
        self.shared.id
    }

    /// The current snapshot.
    pub fn read(&self) -> Arc<M> {
        Arc::clone(&self.shared.model.borrow())
    }

    /// A feed of published snapshots.
    pub fn watch(&self) -> watch::Receiver<Arc<M>> {
        self.shared.model.subscribe()
    }

    /// Apply `body` to a copy of the current model and publish the copy.
    pub fn mutate<F>(&self, transaction: Option<&TransactionInfo>, body: F)
    where
        F: FnOnce(&mut M),
    {
        let result = self.try_mutate::<_, Infallible>(transaction, |model| {
            body(model);
            Ok(())
        });
        match result {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    /// Like [`mutate`](Store::mutate), but `body` may fail. On failure the
    /// copy is discarded and nothing is published.
    pub fn try_mutate<F, E>(&self, transaction: Option<&TransactionInfo>, body: F) -> Result<(), E>
    where
        F: FnOnce(&mut M) -> Result<(), E>,
    {
        {
            let _guard = self.lock();
            let old = self.read();
            let new = Arc::new(old.try_with_edits(body)?);
            self.shared.model.send_replace(Arc::clone(&new));
            if let Some(hook) = &self.shared.on_mutation {
                hook(transaction, &old, &new);
            }
            trace!(transaction = ?transaction.map(|t| t.id), "model published");
        }
        self.notify_observers();
        Ok(())
    }

    /// Schedule observer notification on the store's executor.
    ///
    /// Observers receive the snapshot current at delivery time.
    pub fn notify_observers(&self) {
        let observers: Vec<Observer<M>> = self
            .observers()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        if observers.is_empty() {
            return;
        }

        let store = self.downgrade();
        self.shared.executor.execute(Box::new(move || {
            let Some(store) = store.upgrade() else {
                return;
            };
            let model = store.read();
            for observer in &observers {
                observer(&model);
            }
        }));
    }

    /// Call every registered middleware, in registration order, on the
    /// calling thread.
    pub fn notify_middleware(&self, transaction: &TransactionInfo) {
        let middleware = self.lock().snapshot();
        for m in middleware {
            m.on_transaction_state_change(transaction);
        }
    }

    /// Register `middleware`. Registering the same `Arc` twice returns the
    /// original id and adds nothing.
    pub fn register(&self, middleware: Arc<dyn Middleware>) -> MiddlewareId {
        self.lock().register(middleware)
    }

    pub fn unregister(&self, id: MiddlewareId) -> bool {
        self.lock().unregister(id)
    }

    /// Remove every registration of this `Arc`. Returns how many were removed.
    pub fn unregister_instance(&self, middleware: &Arc<dyn Middleware>) -> usize {
        self.lock().unregister_instance(middleware)
    }

    pub fn middleware_count(&self) -> usize {
        self.lock().len()
    }

    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        let id = ObserverId::new();
        self.observers().push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        before != observers.len()
    }

    /// Create a transaction for `action` bound to this store.
    pub fn transaction<A>(&self, action: A) -> Transaction<A>
    where
        A: Action<Model = M>,
    {
        Transaction::new(action, self)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.shared.dispatcher
    }

    pub fn downgrade(&self) -> WeakStore<M> {
        WeakStore {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Whether both handles refer to the same store.
    pub fn ptr_eq(&self, other: &Store<M>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn lock(&self) -> MutexGuard<'_, MiddlewareRegistry> {
        self.shared
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn observers(&self) -> MutexGuard<'_, Vec<(ObserverId, Observer<M>)>> {
        self.shared
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M: Model> std::fmt::Debug for Store<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("model", &self.read())
            .field("middleware", &self.middleware_count())
            .finish_non_exhaustive()
    }
}

/// Builder for constructing stores with a fluent API.
pub struct StoreBuilder<M: Model> {
    initial: Option<M>,
    dispatcher: Option<Dispatcher>,
    executor: Option<Arc<dyn ObserverExecutor>>,
    on_mutation: Option<MutationHook<M>>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl<M: Model> StoreBuilder<M> {
    pub fn new() -> Self {
        Self {
            initial: None,
            dispatcher: None,
            executor: None,
            on_mutation: None,
            middleware: Vec::new(),
        }
    }

    /// Set the initial model (required).
    pub fn initial(mut self, model: M) -> Self {
        self.initial = Some(model);
        self
    }

    /// Share a dispatcher. Defaults to one on the current tokio runtime.
    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Executor for observer notifications. Defaults to a dedicated
    /// [`MainExecutor`] thread.
    pub fn executor(mut self, executor: Arc<dyn ObserverExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn on_mutation<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&TransactionInfo>, &M, &M) + Send + Sync + 'static,
    {
        self.on_mutation = Some(Arc::new(hook));
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn build(self) -> Result<Store<M>, BuildError> {
        let initial = self.initial.ok_or(BuildError::MissingInitialModel)?;

        let dispatcher = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => Dispatcher::current().map_err(|_| BuildError::NoRuntime)?,
        };

        let executor = match self.executor {
            Some(executor) => executor,
            None => Arc::new(MainExecutor::spawn("storekit-observers")?),
        };

        let mut registry = MiddlewareRegistry::default();
        for middleware in self.middleware {
            registry.register(middleware);
        }

        let (model, _) = watch::channel(Arc::new(initial));

        Ok(Store {
            shared: Arc::new(Shared {
                id: StoreId::new(),
                model,
                lock: Mutex::new(registry),
                observers: Mutex::new(Vec::new()),
                executor,
                dispatcher,
                on_mutation: self.on_mutation,
            }),
        })
    }
}

impl<M: Model> Default for StoreBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}
