//! Storekit: a unidirectional state store with scheduled transactions
//!
//! A [`Store`] owns one immutable [`Model`] value. The model only changes
//! through [`Action`]s, each executed as a [`Transaction`] under a
//! [`Strategy`] chosen by the caller. Middleware sees every transaction's
//! lifecycle; observers see every published model.
//!
//! # Core Concepts
//!
//! - **Model**: a plain value, replaced wholesale on every mutation
//! - **Action**: intent, statically tied to one model type
//! - **Transaction**: one scheduled run of an action against a store
//! - **Dispatcher**: decides where a transaction runs (caller thread,
//!   blocking pool, named serial lane, or a detached thread)
//! - **Plan**: sequential steps and concurrent barrier steps
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
//! store.transaction(Increment).on(Strategy::Sync).run().unwrap();
//!
//! assert_eq!(store.read().count, 1);
//! # }
//! ```

pub mod core;
pub mod dispatch;
pub mod group;
pub mod store;
pub mod transaction;

// Re-export commonly used types
pub use crate::core::{Action, ActionId, Model, TransactionState};
pub use dispatch::{Dispatcher, DispatcherConfig, Strategy};
pub use group::{concurrent, sequence, Plan, PlanNode, PlanReport};
pub use store::{Middleware, MiddlewareId, Store, StoreBuilder};
pub use transaction::{
    run_all, Outcome, Transaction, TransactionError, TransactionHandle, TransactionInfo,
};
