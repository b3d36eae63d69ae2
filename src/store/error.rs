//! Build errors for stores.

use thiserror::Error;

/// Errors that can occur when building a store.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Initial model not specified. Call .initial(model) before .build()")]
    MissingInitialModel,

    #[error("No dispatcher given and no tokio runtime is running. Call .dispatcher(d)")]
    NoRuntime,

    #[error("Failed to start the observer thread: {0}")]
    Executor(#[from] std::io::Error),
}
