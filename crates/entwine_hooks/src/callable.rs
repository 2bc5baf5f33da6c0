//! Type-erased callables.
//!
//! A [`Callable`] is the unit every hook chain wraps: a named body taking an
//! optional receiver and an argument tuple, plus a property map carrying
//! static metadata. Free functions are called without a receiver, methods
//! with `Some(&Instance)`.
//!
//! A callable produced by [`compose`](crate::chain::compose) remembers the
//! callable it wraps and the hooks it was composed with. That tag is what
//! [`unwrap`](crate::chain::unwrap) and [`hooks`](crate::chain::hooks) read.

use core::fmt;
use std::sync::Arc;

use entwine_state::owner::{OwnerId, StateOwner};

use crate::class::Instance;
use crate::error::{HookError, HookResult};
use crate::hook::HookSet;
use crate::value::{Args, Map, Value};

type Body = dyn Fn(Option<&Instance>, Args) -> HookResult<Value> + Send + Sync;

/// The callable a wrapped callable was composed from.
pub(crate) struct WrappedFrom {
    pub(crate) original: Callable,
    pub(crate) hooks: HookSet,
}

/// A named, cheaply clonable function value.
///
/// Clones share identity: [`id`](Self::id) and equality follow the body, not
/// the handle.
///
/// # Example
///
/// ```
/// use entwine_hooks::callable::Callable;
/// use entwine_hooks::value::json;
///
/// let double = Callable::from_fn("double", |args| {
///     Ok(json!(args[0].as_i64().unwrap_or(0) * 2))
/// })
/// .with_property("pure", json!(true));
///
/// assert_eq!(double.invoke(vec![json!(21)]).unwrap(), json!(42));
/// assert_eq!(double.property("pure"), Some(&json!(true)));
/// ```
#[derive(Clone)]
pub struct Callable {
    id: OwnerId,
    name: Arc<str>,
    body: Arc<Body>,
    properties: Arc<Map<String, Value>>,
    wrapped: Option<Arc<WrappedFrom>>,
}

impl Callable {
    /// Creates a callable whose body sees the receiver.
    #[must_use]
    pub fn new(
        name: impl Into<Arc<str>>,
        body: impl Fn(Option<&Instance>, Args) -> HookResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: OwnerId::next(),
            name: name.into(),
            body: Arc::new(body),
            properties: Arc::new(Map::new()),
            wrapped: None,
        }
    }

    /// Creates a callable that ignores its receiver.
    #[must_use]
    pub fn from_fn(
        name: impl Into<Arc<str>>,
        body: impl Fn(Args) -> HookResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, move |_this, args| body(args))
    }

    /// Creates a method body that requires a receiver.
    ///
    /// Invoking it without one fails with [`HookError::MissingReceiver`].
    #[must_use]
    pub fn method(
        name: impl Into<Arc<str>>,
        body: impl Fn(&Instance, Args) -> HookResult<Value> + Send + Sync + 'static,
    ) -> Self {
        let name: Arc<str> = name.into();
        let target = Arc::clone(&name);
        Self::new(name, move |this, args| match this {
            Some(instance) => body(instance, args),
            None => Err(HookError::MissingReceiver {
                target: target.to_string(),
            }),
        })
    }

    /// Creates a body that does nothing and returns `Null`.
    #[must_use]
    pub fn noop(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, |_this, _args| Ok(Value::Null))
    }

    pub(crate) fn wrapping(
        name: Arc<str>,
        body: Arc<Body>,
        properties: Arc<Map<String, Value>>,
        from: WrappedFrom,
    ) -> Self {
        Self {
            id: OwnerId::next(),
            name,
            body,
            properties,
            wrapped: Some(Arc::new(from)),
        }
    }

    /// Adds a static property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        let properties = Arc::make_mut(&mut self.properties);
        properties.insert(key.into(), value);
        self
    }

    /// Returns the identity of this callable.
    #[must_use]
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// Returns a static property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Returns every static property.
    #[must_use]
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub(crate) fn shared_properties(&self) -> Arc<Map<String, Value>> {
        Arc::clone(&self.properties)
    }

    /// Returns `true` if this callable was produced by composing hooks.
    #[must_use]
    pub fn is_wrapped(&self) -> bool {
        self.wrapped.is_some()
    }

    pub(crate) fn wrapped_from(&self) -> Option<&WrappedFrom> {
        self.wrapped.as_deref()
    }

    /// Calls the body with an optional receiver.
    ///
    /// # Errors
    ///
    /// Propagates whatever the body (or, for wrapped callables, any hook)
    /// returns.
    pub fn call(&self, this: Option<&Instance>, args: Args) -> HookResult<Value> {
        (self.body)(this, args)
    }

    /// Calls the body without a receiver.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub fn invoke(&self, args: Args) -> HookResult<Value> {
        self.call(None, args)
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Callable {}

impl StateOwner for Callable {
    fn owner_id(&self) -> OwnerId {
        self.id
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("wrapped", &self.is_wrapped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::json;

    #[test]
    fn clones_share_identity() {
        let f = Callable::noop("f");
        let g = f.clone();
        assert_eq!(f, g);
        assert_eq!(f.id(), g.id());
        assert_ne!(f, Callable::noop("f"));
    }

    #[test]
    fn noop_returns_null() {
        let result = Callable::noop("n").invoke(vec![json!(1)]).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn method_requires_receiver() {
        let m = Callable::method("greet", |_this, _args| Ok(json!("hi")));
        let err = m.invoke(Vec::new()).unwrap_err();
        assert!(matches!(err, HookError::MissingReceiver { .. }));
        assert_eq!(err.to_string(), "method `greet` requires a receiver");
    }

    #[test]
    fn properties_accumulate() {
        let f = Callable::noop("f")
            .with_property("a", json!(1))
            .with_property("b", json!("two"));
        assert_eq!(f.properties().len(), 2);
        assert_eq!(f.property("b"), Some(&json!("two")));
        assert!(f.property("c").is_none());
    }
}
