//! Core Model trait for store-owned values.
//!
//! A model is a plain value type. Stores never hand out a live mutable
//! reference to it: every change produces a new value from a copy of the
//! old one.

use std::fmt::Debug;

/// Trait for values owned by a [`Store`](crate::Store).
///
/// Models are replaced wholesale on every mutation. The copy used for a
/// mutation comes from `Clone`, so any record type that can be cloned can be
/// a model.
///
/// # Required Traits
///
/// - `Clone`: a mutation edits a copy of the current snapshot
/// - `Debug`: models are debuggable for diagnostics
/// - `Send` + `Sync`: snapshots are shared across worker threads
///
/// # Example
///
/// ```rust
/// use storekit::core::Model;
///
/// #[derive(Clone, Debug, Default, PartialEq)]
/// struct Counter {
///     count: i64,
/// }
///
/// impl Model for Counter {}
///
/// let zero = Counter::default();
/// let one = zero.with_edits(|c| c.count += 1);
///
/// assert_eq!(zero.count, 0);
/// assert_eq!(one.count, 1);
/// ```
pub trait Model: Clone + Debug + Send + Sync + 'static {
    /// Return a copy of this value with `edit` applied to it.
    ///
    /// The receiver is left untouched.
    fn with_edits<F>(&self, edit: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut copy = self.clone();
        edit(&mut copy);
        copy
    }

    /// Fallible variant of [`with_edits`](Model::with_edits).
    ///
    /// When `edit` fails the partially edited copy is discarded.
    fn try_with_edits<F, E>(&self, edit: F) -> Result<Self, E>
    where
        F: FnOnce(&mut Self) -> Result<(), E>,
    {
        let mut copy = self.clone();
        edit(&mut copy)?;
        Ok(copy)
    }
}
