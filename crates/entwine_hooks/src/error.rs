//! Errors raised by hook chains and the class registry.

use core::error::Error;
use core::fmt;

use entwine_state::state::MissingStateError;

use crate::class::ClassId;

/// Result alias used by every hook and callable.
pub type HookResult<T> = Result<T, HookError>;

/// Errors that can occur while composing or invoking hooked callables.
///
/// Errors returned by user hooks are carried unchanged in
/// [`HookError::Failed`] and abort the rest of the chain, including every
/// pending after hook.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// A before hook returned something other than an argument array.
    #[error("before hook `{hook}` of `{target}` must return an argument array, got {value}")]
    InvalidBeforeResult {
        /// Name of the offending hook.
        hook: String,
        /// Name of the hooked callable.
        target: String,
        /// Best-effort serialization of the returned value.
        value: String,
    },

    /// A required private state slot was never created.
    #[error(transparent)]
    MissingState(#[from] MissingStateError),

    /// Internal bookkeeping disagrees with itself. Indicates a bug in a
    /// collaborator rather than a runtime condition.
    #[error("unexpected wrap state: {0}")]
    UnexpectedWrapState(String),

    /// The method does not resolve on the instance's class.
    #[error("`{class}` has no method `{method}`")]
    MissingMethod {
        /// Name of the concrete class.
        class: String,
        /// The requested method.
        method: String,
    },

    /// A method body was invoked without an instance.
    #[error("method `{target}` requires a receiver")]
    MissingReceiver {
        /// Name of the method.
        target: String,
    },

    /// The class id is not registered.
    #[error("unknown class {0}")]
    UnknownClass(ClassId),

    /// A user-supplied hook or body failed.
    #[error(transparent)]
    Failed(Box<dyn Error + Send + Sync>),
}

impl HookError {
    /// Wraps an arbitrary error raised by user code.
    pub fn custom(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Failed(err.into())
    }

    /// Builds a user error from a message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::Failed(message.to_string().into())
    }
}
