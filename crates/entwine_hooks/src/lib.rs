//! Hook chains and class hooks for entwine (Layer 1).
//!
//! `entwine_hooks` lets independent call sites attach ordered interception
//! logic to a callable and guarantees that those attachments compose
//! predictably:
//!
//! - [`value`] - The dynamic value model (`serde_json::Value` arguments)
//! - [`callable`] - Named, type-erased callables
//! - [`hook`] - Before, middleware, after and constructor hooks
//! - [`chain`] - Composing a hook set around one callable
//! - [`class`] - A runtime class model with prototype-style lookup
//! - [`mixer`] - Method hooks that accumulate along a class hierarchy
//! - [`error`] - The crate error type
//!
//! # Architecture
//!
//! - **Layer 0** (`entwine_state`): private state and configuration
//! - **Layer 1** (`entwine_hooks`): hook chains and class hooks (this crate)
//! - **Layer 2** (`entwine_feature`): feature wrapping and ordering
//!
//! # Example
//!
//! ```
//! use entwine_hooks::prelude::*;
//!
//! let base = Callable::from_fn("base", |args| {
//!     assert_eq!(args, vec![json!(2)]);
//!     Ok(json!(42))
//! });
//!
//! let wrapped = wrap(
//!     &base,
//!     HookSet::new()
//!         .before(BeforeHook::new(|args| {
//!             Ok(json!([args[0].as_i64().unwrap_or(0) + 1]))
//!         }))
//!         .after(AfterHook::new(|r| Ok(json!(r.as_i64().unwrap_or(0) + 1)))),
//! );
//!
//! assert_eq!(wrapped.invoke(vec![json!(1)]).unwrap(), json!(43));
//! ```

/// Named, type-erased callables.
pub mod callable;

/// Hook chain composition and function wrapping.
pub mod chain;

/// Runtime classes, instances and method dispatch.
pub mod class;

/// Hook error types.
pub mod error;

/// Hook handles and hook sets.
pub mod hook;

/// Inheritance-aware method hook registry.
pub mod mixer;

/// Dynamic argument and result values.
pub mod value;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::callable::Callable;
    pub use crate::chain::{Next, compose, compose_with, hooks, unwrap, wrap, wrap_with};
    pub use crate::class::{ClassDef, ClassId, ClassRegistry, Instance};
    pub use crate::error::{HookError, HookResult};
    pub use crate::hook::{
        AfterHook, BeforeHook, ConstructorHook, HookKind, HookOptions, HookSet, MethodHook,
        MiddlewareHook,
    };
    pub use crate::mixer::{
        ClassMixerData, EdgeClassData, EdgeMethod, HookEntry, HookList, MergedHooks,
    };
    pub use crate::value::{Args, Value, json};
}
