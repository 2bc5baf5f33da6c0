//! Errors raised while wrapping targets and applying features.

use entwine_hooks::error::HookError;

/// Result alias for the feature layer.
pub type FeatureResult<T> = Result<T, FeatureError>;

/// Errors that can occur while wrapping a target.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// The underlying hook machinery failed (e.g. an unknown class).
    #[error(transparent)]
    Hook(#[from] HookError),

    /// The wrapper does not handle this kind of target.
    #[error("wrapper `{wrapper}` cannot wrap {target}")]
    UnsupportedTarget {
        /// Name of the wrapper.
        wrapper: String,
        /// Description of the rejected target.
        target: String,
    },

    /// Wrapper metadata disagrees with itself, e.g. a stored configuration of
    /// the wrong type or a wrapper that returned its input unchanged.
    #[error("unexpected wrap state: {0}")]
    UnexpectedWrapState(String),
}
