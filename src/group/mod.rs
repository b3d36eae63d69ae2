//! Plans: ordered groups of transactions with barrier steps.
//!
//! A [`Plan`] is a sequence of [`PlanNode`]s. A node is either a single
//! transaction or a concurrent bundle. Nodes run strictly one after another;
//! a concurrent node fans its transactions out at once and only completes
//! when every one of them has reached a terminal state.
//!
//! Transactions in a plan may be unbound. They are bound to the store the
//! plan runs against just before they launch, so one plan description can
//! target any `Store<M>`.
//!
//! # Example
//!
//! ```rust
//! use storekit::group::{concurrent, sequence, PlanNode};
//! use storekit::transaction::{ActionError, TransactionContext};
//! use storekit::{Action, Model, Store};
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
//! let plan = sequence([
//!     PlanNode::action(Increment),
//!     concurrent([PlanNode::action(Increment), PlanNode::action(Increment)]),
//! ]);
//!
//! let report = plan.run(&store).await;
//! assert!(report.is_success());
//! assert_eq!(store.read().count, 3);
//! # }
//! ```

use crate::core::{Action, ActionId, Model};
use crate::dispatch::Strategy;
use crate::store::Store;
use crate::transaction::{Outcome, Transaction, TransactionError, TransactionHandle};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::debug;

/// A transaction with its action type erased.
trait Step<M: Model>: Send {
    fn action_id(&self) -> ActionId;

    fn launch(
        self: Box<Self>,
        store: &Store<M>,
        default_strategy: &Strategy,
    ) -> Result<TransactionHandle, TransactionError>;
}

impl<A: Action> Step<A::Model> for Transaction<A> {
    fn action_id(&self) -> ActionId {
        self.info().action.clone()
    }

    fn launch(
        mut self: Box<Self>,
        store: &Store<A::Model>,
        default_strategy: &Strategy,
    ) -> Result<TransactionHandle, TransactionError> {
        self.bind_in_place(store);
        if !self.has_strategy() {
            self.set_strategy(default_strategy.clone());
        }
        (*self).run()
    }
}

enum NodeKind<M: Model> {
    Single(Box<dyn Step<M>>),
    Concurrent(Vec<Box<dyn Step<M>>>),
}

/// One step of a plan.
pub struct PlanNode<M: Model> {
    kind: NodeKind<M>,
}

impl<M: Model> PlanNode<M> {
    pub fn single<A>(transaction: Transaction<A>) -> Self
    where
        A: Action<Model = M>,
    {
        Self {
            kind: NodeKind::Single(Box::new(transaction)),
        }
    }

    /// A single step for an unbound transaction of `action`.
    pub fn action<A>(action: A) -> Self
    where
        A: Action<Model = M>,
    {
        Self::single(Transaction::unbound(action))
    }

    pub fn is_concurrent(&self) -> bool {
        matches!(self.kind, NodeKind::Concurrent(_))
    }

    /// Number of transactions in this step.
    pub fn len(&self) -> usize {
        match &self.kind {
            NodeKind::Single(_) => 1,
            NodeKind::Concurrent(steps) => steps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn into_steps(self) -> Vec<Box<dyn Step<M>>> {
        match self.kind {
            NodeKind::Single(step) => vec![step],
            NodeKind::Concurrent(steps) => steps,
        }
    }
}

impl<A: Action> From<Transaction<A>> for PlanNode<A::Model> {
    fn from(transaction: Transaction<A>) -> Self {
        Self::single(transaction)
    }
}

/// A barrier step running every transaction in `nodes` at once.
///
/// Nested concurrent nodes are flattened into this one.
pub fn concurrent<M, I>(nodes: I) -> PlanNode<M>
where
    M: Model,
    I: IntoIterator<Item = PlanNode<M>>,
{
    PlanNode {
        kind: NodeKind::Concurrent(nodes.into_iter().flat_map(PlanNode::into_steps).collect()),
    }
}

/// A plan running `nodes` in order.
pub fn sequence<M, I>(nodes: I) -> Plan<M>
where
    M: Model,
    I: IntoIterator<Item = PlanNode<M>>,
{
    nodes.into_iter().fold(Plan::new(), Plan::then)
}

/// Outcome of one transaction in a plan.
#[derive(Clone, Debug, PartialEq)]
pub struct StepReport {
    pub action: ActionId,
    pub outcome: Outcome,
}

/// What happened when a plan ran.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlanReport {
    /// Reports in plan order; members of a concurrent step keep their
    /// declaration order.
    pub steps: Vec<StepReport>,
    /// Transactions never launched because an earlier step failed.
    pub skipped: usize,
}

impl PlanReport {
    pub fn is_success(&self) -> bool {
        self.skipped == 0 && self.steps.iter().all(|s| s.outcome.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.outcome.is_err())
    }
}

/// An ordered execution plan.
pub struct Plan<M: Model> {
    nodes: Vec<PlanNode<M>>,
    default_strategy: Strategy,
    fail_fast: bool,
}

impl<M: Model> Plan<M> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            default_strategy: Strategy::Async,
            fail_fast: false,
        }
    }

    /// Append a step.
    pub fn then(mut self, node: PlanNode<M>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Strategy for transactions that were not given one. Defaults to
    /// [`Strategy::Async`].
    pub fn default_strategy(mut self, strategy: Strategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Stop after the first step containing a failed transaction.
    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Run every step against `store`, waiting on each before the next.
    pub async fn run(self, store: &Store<M>) -> PlanReport {
        let Plan {
            nodes,
            default_strategy,
            fail_fast,
        } = self;
        let mut report = PlanReport::default();
        let total = nodes.len();
        let mut nodes = nodes.into_iter();

        debug!(steps = total, "running plan");

        while let Some(node) = nodes.next() {
            let width = node.len();
            let launched: Vec<_> = node
                .into_steps()
                .into_iter()
                .map(|step| {
                    let action = step.action_id();
                    (action, step.launch(store, &default_strategy))
                })
                .collect();

            let finished = join_all(launched.into_iter().map(|(action, launched)| async move {
                let outcome = match launched {
                    Ok(handle) => handle.wait().await,
                    Err(e) => Err(e),
                };
                StepReport { action, outcome }
            }))
            .await;

            let failed = finished.iter().any(|s| s.outcome.is_err());
            report.steps.extend(finished);
            debug!(width, failed, "plan step finished");

            if failed && fail_fast {
                report.skipped = nodes.by_ref().map(|n| n.len()).sum();
                debug!(skipped = report.skipped, "plan stopped after failure");
                break;
            }
        }

        report
    }

    /// Run the plan on the store's runtime without waiting for it.
    pub fn spawn(self, store: &Store<M>) -> JoinHandle<PlanReport> {
        let store = store.clone();
        let runtime = store.dispatcher().runtime().clone();
        runtime.spawn(async move { self.run(&store).await })
    }
}

impl<M: Model> Default for Plan<M> {
    fn default() -> Self {
        Self::new()
    }
}
