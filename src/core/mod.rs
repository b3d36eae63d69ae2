//! Core value types of the store.
//!
//! This module contains the pieces with no scheduling behavior:
//! - The `Model` trait for store-owned values
//! - The `Action` trait describing intent
//! - Transaction lifecycle states and their immutable history

mod action;
mod lifecycle;
mod model;

pub use action::{Action, ActionId};
pub use lifecycle::{LifecycleHistory, LifecycleTransition, TransactionState};
pub use model::Model;
