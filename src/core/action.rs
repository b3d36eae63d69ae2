//! Actions: immutable descriptions of intent.

use super::model::Model;
use crate::transaction::{ActionError, TransactionContext};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an action, used for throttling and diagnostics.
///
/// Two transactions carrying actions with the same id fall into the same
/// throttle window.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(String);

impl ActionId {
    /// Create an id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id derived from a Rust type name.
    pub fn of<T: ?Sized>() -> Self {
        Self(std::any::type_name::<T>().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// An immutable description of a change to a [`Model`].
///
/// The associated `Model` type ties an action to the stores it may run
/// against: a `Transaction<A>` can only be bound to a `Store<A::Model>`.
///
/// # Example
///
/// ```rust
/// use storekit::core::{Action, Model};
/// use storekit::transaction::{ActionError, TransactionContext};
///
/// #[derive(Clone, Debug, Default)]
/// struct Counter {
///     count: i64,
/// }
///
/// impl Model for Counter {}
///
/// struct Increment;
///
/// impl Action for Increment {
///     type Model = Counter;
///
///     fn reduce(&self, ctx: &TransactionContext<'_, Counter>) -> Result<(), ActionError> {
///         ctx.reduce_model(|m| m.count += 1);
///         Ok(())
///     }
/// }
/// ```
pub trait Action: Send + Sync + 'static {
    /// The model this action operates on.
    type Model: Model;

    /// Identity used for throttling and logs.
    ///
    /// Defaults to the type name, so every value of one action type shares
    /// an identity. Override it to throttle per payload.
    fn id(&self) -> ActionId {
        ActionId::of::<Self>()
    }

    /// The reducer body.
    ///
    /// Model changes go through `ctx`. Returning an error marks the
    /// transaction as failed; edits already published stay published.
    fn reduce(&self, ctx: &TransactionContext<'_, Self::Model>) -> Result<(), ActionError>;
}
