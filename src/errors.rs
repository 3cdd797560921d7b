//! Change Propagation Error Hierarchy
//!
//! Defines the error types raised by caches, operators and the configuration
//! layer, categorized by where in the pipeline the failure originates.

use std::sync::Arc;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

/// Error carried by terminal `on_error` notifications.
///
/// A single upstream failure fans out to every downstream observer, so the
/// error is shared rather than cloned.
pub type SharedError = Arc<Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required collaborator (source stream, selector, key function) is
    /// missing or unusable at construction time
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Protocol violation, e.g. a nested write issued with no write in progress
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Failure raised by an upstream change stream
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Scheduler collaborator unavailable (e.g. no async runtime)
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl Error {
    /// Wraps this error for delivery through `on_error`.
    pub fn shared(self) -> SharedError {
        Arc::new(self)
    }

    pub(crate) fn nested_write_without_active() -> Self {
        Error::InvalidOperation(
            "write_nested can only be used if another write is already in progress".into(),
        )
    }
}
