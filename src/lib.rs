//! Composable before, after and middleware hooks for functions and classes.
//!

pub use entwine_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use entwine_internal::prelude::*;
}
