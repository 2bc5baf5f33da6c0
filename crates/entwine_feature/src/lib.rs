//! Feature wrapping and ordering for entwine (Layer 2).
//!
//! `entwine_feature` is the outermost composition surface. It lets
//! independently authored decorations wrap the same class or function,
//! merge instead of nesting when applied twice, carry identities that can be
//! queried later and declare which of them must run outside which.
//!
//! - [`target`] - Wrap targets and feature symbols
//! - [`wrapper`] - The [`Wrapper`](wrapper::Wrapper) trait and [`Decor`](wrapper::Decor)
//! - [`registry`] - Wrapper metadata lookups
//! - [`feature`] - Features and their ordering metadata
//! - [`ordering`] - Ordering and applying a list of features
//! - [`builtin`] - Wrappers for functions and classes
//! - [`error`] - The crate error type
//!
//! # Example
//!
//! ```
//! use entwine_feature::prelude::*;
//! use entwine_hooks::prelude::*;
//!
//! let registry = FeatureRegistry::new();
//! let decor = FunctionDecor::decor(&registry);
//!
//! let double = make_feature(
//!     &decor,
//!     HookSet::new().after(AfterHook::new(|r| Ok(json!(r.as_i64().unwrap_or(0) * 2)))),
//! );
//! let increment = make_feature(
//!     &decor,
//!     HookSet::new().after(AfterHook::new(|r| Ok(json!(r.as_i64().unwrap_or(0) + 1)))),
//! );
//! // `increment` must wrap `double`, so it sees the doubled result.
//! force_feature_order(&increment, double.symbol());
//!
//! let base = Target::from(Callable::from_fn("answer", |_| Ok(json!(20))));
//! let decorated = decorate(&base, &[increment.clone(), double.clone()]).unwrap();
//!
//! assert!(registry.is_decorated(&decorated, Some(increment.symbol())));
//! let answer = decorated.as_function().unwrap().invoke(vec![]).unwrap();
//! assert_eq!(answer, json!(41));
//! ```

/// Built-in function and class wrappers.
pub mod builtin;

/// Feature error types.
pub mod error;

/// Features and their identities.
pub mod feature;

/// Feature ordering.
pub mod ordering;

/// Wrapper metadata registry.
pub mod registry;

/// Wrap targets and symbols.
pub mod target;

/// The wrapper trait and decor handle.
pub mod wrapper;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::builtin::{ClassDecor, ClassHook, ClassHooks, FunctionDecor};
    pub use crate::error::{FeatureError, FeatureResult};
    pub use crate::feature::{
        Feature, FeatureMetadata, force_feature_before, force_feature_order, make_feature,
        mark_feature_with,
    };
    pub use crate::ordering::{decorate, order_features};
    pub use crate::registry::FeatureRegistry;
    pub use crate::target::{FeatureSymbol, Target};
    pub use crate::wrapper::{Decor, Wrapper};
}
