//! # entwine Internal Library
//!
//! Re-exports the core entwine crates for convenience.

/// Layer 0: private state and configuration.
pub use entwine_state;

/// Layer 1: hook chains and class hooks.
pub use entwine_hooks;

/// Layer 2: feature wrapping and ordering.
pub use entwine_feature;

/// Subscriber setup and the diagnostics switch.
pub use entwine_tracing;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use entwine_feature::prelude::*;
    pub use entwine_hooks::prelude::*;
    pub use entwine_state::prelude::*;
    pub use entwine_tracing::{TracingFormat, TracingSetup};
}
