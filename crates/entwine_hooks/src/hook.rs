//! Hook handles and hook sets.
//!
//! Every hook is a reference-counted closure with a display name. Clones of a
//! hook share identity, and identity (not behavior) is what de-duplication and
//! equality compare.
//!
//! | Kind | Receives | Returns |
//! |------|----------|---------|
//! | [`BeforeHook`] | receiver, argument tuple | new argument array |
//! | [`MiddlewareHook`] | argument tuple, [`Next`] continuation | result |
//! | [`AfterHook`] | receiver, current result | new result |
//! | [`ConstructorHook`] | freshly constructed instance, constructor args | nothing |

use core::fmt;
use std::sync::Arc;

use crate::chain::Next;
use crate::class::Instance;
use crate::error::HookResult;
use crate::value::{Args, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Hook handles
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! hook_handle {
    ($(#[$meta:meta])* $hook:ident => $body:ty) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $hook {
            name: Arc<str>,
            f: Arc<$body>,
        }

        impl $hook {
            /// Replaces the display name used in diagnostics.
            ///
            /// Renaming does not change identity: the renamed handle still
            /// compares equal to the original.
            #[must_use]
            pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
                self.name = name.into();
                self
            }

            /// Returns the display name.
            #[must_use]
            pub fn name(&self) -> &str {
                &self.name
            }
        }

        impl PartialEq for $hook {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.f, &other.f)
            }
        }

        impl Eq for $hook {}

        impl fmt::Debug for $hook {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($hook)).field(&self.name).finish()
            }
        }
    };
}

hook_handle! {
    /// Transforms the argument tuple before the hooked callable runs.
    ///
    /// The returned value must be a JSON array; it becomes the argument tuple
    /// of the next stage.
    BeforeHook => dyn Fn(Option<&Instance>, Args) -> HookResult<Value> + Send + Sync
}

hook_handle! {
    /// Wraps the rest of the chain, onion style.
    ///
    /// A middleware decides whether (and with which arguments) the inner
    /// stages run by calling [`Next::run`].
    MiddlewareHook => dyn for<'a> Fn(Args, Next<'a>) -> HookResult<Value> + Send + Sync
}

hook_handle! {
    /// Transforms the result after the hooked callable returned.
    AfterHook => dyn Fn(Option<&Instance>, Value) -> HookResult<Value> + Send + Sync
}

hook_handle! {
    /// Runs once per instance during construction.
    ConstructorHook => dyn Fn(&Instance, &Args) -> HookResult<()> + Send + Sync
}

impl BeforeHook {
    /// Creates a before hook that ignores the receiver.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Args) -> HookResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: core::any::type_name::<F>().into(),
            f: Arc::new(move |_this, args| f(args)),
        }
    }

    /// Creates a before hook that sees the receiver.
    pub fn with_receiver<F>(f: F) -> Self
    where
        F: Fn(Option<&Instance>, Args) -> HookResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: core::any::type_name::<F>().into(),
            f: Arc::new(f),
        }
    }

    pub(crate) fn call(&self, this: Option<&Instance>, args: Args) -> HookResult<Value> {
        (self.f)(this, args)
    }
}

impl MiddlewareHook {
    /// Creates a middleware. The receiver is available through
    /// [`Next::receiver`].
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(Args, Next<'a>) -> HookResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: core::any::type_name::<F>().into(),
            f: Arc::new(f),
        }
    }

    pub(crate) fn call(&self, args: Args, next: Next<'_>) -> HookResult<Value> {
        (self.f)(args, next)
    }
}

impl AfterHook {
    /// Creates an after hook that ignores the receiver.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value) -> HookResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: core::any::type_name::<F>().into(),
            f: Arc::new(move |_this, result| f(result)),
        }
    }

    /// Creates an after hook that sees the receiver.
    pub fn with_receiver<F>(f: F) -> Self
    where
        F: Fn(Option<&Instance>, Value) -> HookResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: core::any::type_name::<F>().into(),
            f: Arc::new(f),
        }
    }

    pub(crate) fn call(&self, this: Option<&Instance>, result: Value) -> HookResult<Value> {
        (self.f)(this, result)
    }
}

impl ConstructorHook {
    /// Creates a constructor hook.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Instance, &Args) -> HookResult<()> + Send + Sync + 'static,
    {
        Self {
            name: core::any::type_name::<F>().into(),
            f: Arc::new(f),
        }
    }

    pub(crate) fn call(&self, instance: &Instance, args: &Args) -> HookResult<()> {
        (self.f)(instance, args)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MethodHook
// ─────────────────────────────────────────────────────────────────────────────

/// The stage a method hook attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Argument transform.
    Before,
    /// Onion wrapper.
    Middleware,
    /// Result transform.
    After,
}

/// A hook that can be attached to a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodHook {
    /// See [`BeforeHook`].
    Before(BeforeHook),
    /// See [`MiddlewareHook`].
    Middleware(MiddlewareHook),
    /// See [`AfterHook`].
    After(AfterHook),
}

impl MethodHook {
    /// Returns the stage this hook attaches to.
    #[must_use]
    pub fn kind(&self) -> HookKind {
        match self {
            Self::Before(_) => HookKind::Before,
            Self::Middleware(_) => HookKind::Middleware,
            Self::After(_) => HookKind::After,
        }
    }

    /// Returns the display name of the wrapped hook.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Before(hook) => hook.name(),
            Self::Middleware(hook) => hook.name(),
            Self::After(hook) => hook.name(),
        }
    }
}

impl From<BeforeHook> for MethodHook {
    fn from(hook: BeforeHook) -> Self {
        Self::Before(hook)
    }
}

impl From<MiddlewareHook> for MethodHook {
    fn from(hook: MiddlewareHook) -> Self {
        Self::Middleware(hook)
    }
}

impl From<AfterHook> for MethodHook {
    fn from(hook: AfterHook) -> Self {
        Self::After(hook)
    }
}

/// Options for [`ClassRegistry::add_method_hook`](crate::class::ClassRegistry::add_method_hook).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookOptions {
    /// Only install the hook if the class resolves an implementation.
    pub if_exists: bool,
}

impl HookOptions {
    /// Options with `if_exists` set.
    #[must_use]
    pub fn if_exists() -> Self {
        Self { if_exists: true }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HookSet
// ─────────────────────────────────────────────────────────────────────────────

/// The ordered hook lists attached to one callable.
///
/// # Example
///
/// ```
/// use entwine_hooks::hook::{AfterHook, BeforeHook, HookSet};
/// use entwine_hooks::value::{Value, json};
///
/// let set = HookSet::new()
///     .before(BeforeHook::new(|args| Ok(Value::Array(args))))
///     .after(AfterHook::new(|r| Ok(json!(r.as_i64().unwrap_or(0) + 1))));
///
/// assert_eq!(set.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookSet {
    /// Argument transforms, run in order.
    pub before: Vec<BeforeHook>,
    /// Onion wrappers, outermost first.
    pub middleware: Vec<MiddlewareHook>,
    /// Result transforms, run in order.
    pub after: Vec<AfterHook>,
}

impl HookSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a before hook.
    #[must_use]
    pub fn before(mut self, hook: BeforeHook) -> Self {
        self.before.push(hook);
        self
    }

    /// Appends a middleware.
    #[must_use]
    pub fn middleware(mut self, hook: MiddlewareHook) -> Self {
        self.middleware.push(hook);
        self
    }

    /// Appends an after hook.
    #[must_use]
    pub fn after(mut self, hook: AfterHook) -> Self {
        self.after.push(hook);
        self
    }

    /// Appends a hook of any kind.
    #[must_use]
    pub fn with(self, hook: impl Into<MethodHook>) -> Self {
        match hook.into() {
            MethodHook::Before(hook) => self.before(hook),
            MethodHook::Middleware(hook) => self.middleware(hook),
            MethodHook::After(hook) => self.after(hook),
        }
    }

    /// Total number of hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.before.len() + self.middleware.len() + self.after.len()
    }

    /// Returns `true` if no hook is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merges a set applied later (`newer`) on top of this one.
    ///
    /// The result behaves like wrapping the callable with `self` first and
    /// `newer` around it: `before` and `middleware` become `newer ++ self`,
    /// `after` becomes `self ++ newer`. Each list keeps only the first
    /// occurrence of a hook.
    #[must_use]
    pub fn merge(&self, newer: &HookSet) -> HookSet {
        HookSet {
            before: dedup_chain(&newer.before, &self.before),
            middleware: dedup_chain(&newer.middleware, &self.middleware),
            after: dedup_chain(&self.after, &newer.after),
        }
    }
}

fn dedup_chain<H: Clone + PartialEq>(first: &[H], second: &[H]) -> Vec<H> {
    let mut out: Vec<H> = Vec::with_capacity(first.len() + second.len());
    for hook in first.iter().chain(second) {
        if !out.contains(hook) {
            out.push(hook.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::json;

    fn identity_before() -> BeforeHook {
        BeforeHook::new(|args| Ok(Value::Array(args)))
    }

    #[test]
    fn clones_are_equal_fresh_hooks_are_not() {
        let a = identity_before();
        let b = a.clone().named("renamed");
        assert_eq!(a, b);
        assert_eq!(b.name(), "renamed");
        assert_ne!(a, identity_before());
    }

    #[test]
    fn default_name_is_closure_type() {
        let hook = AfterHook::new(|r| Ok(r));
        assert!(hook.name().contains("closure"));
        let named = AfterHook::new(|r| Ok(r)).named("passthrough");
        assert_eq!(named.name(), "passthrough");
    }

    #[test]
    fn method_hook_kinds() {
        let before: MethodHook = identity_before().into();
        let after: MethodHook = AfterHook::new(Ok).into();
        let middle: MethodHook = MiddlewareHook::new(|args, next| next.run(args)).into();
        assert_eq!(before.kind(), HookKind::Before);
        assert_eq!(after.kind(), HookKind::After);
        assert_eq!(middle.kind(), HookKind::Middleware);
    }

    #[test]
    fn merge_follows_onion_order() {
        let b_old = identity_before().named("b_old");
        let b_new = identity_before().named("b_new");
        let a_old = AfterHook::new(Ok).named("a_old");
        let a_new = AfterHook::new(Ok).named("a_new");

        let old = HookSet::new().before(b_old.clone()).after(a_old.clone());
        let new = HookSet::new().before(b_new.clone()).after(a_new.clone());
        let merged = old.merge(&new);

        assert_eq!(merged.before, vec![b_new, b_old]);
        assert_eq!(merged.after, vec![a_old, a_new]);
    }

    #[test]
    fn merge_with_itself_is_idempotent() {
        let set = HookSet::new()
            .before(identity_before())
            .middleware(MiddlewareHook::new(|args, next| next.run(args)))
            .after(AfterHook::new(|r| Ok(json!([r]))));

        assert_eq!(set.merge(&set), set);
    }

    #[test]
    fn with_dispatches_on_kind() {
        let set = HookSet::new()
            .with(identity_before())
            .with(AfterHook::new(Ok))
            .with(MiddlewareHook::new(|args, next| next.run(args)));
        assert_eq!(set.before.len(), 1);
        assert_eq!(set.middleware.len(), 1);
        assert_eq!(set.after.len(), 1);
        assert!(!set.is_empty());
        assert!(HookSet::new().is_empty());
    }
}
