//! A minimal runtime class model.
//!
//! Classes are registered in a [`ClassRegistry`] and addressed by [`ClassId`].
//! Each class has a name, an optional parent, a table of own methods and an
//! optional constructor body. Method lookup walks the parent chain the way a
//! prototype chain would.
//!
//! The registry is also where method hooks live (see [`crate::mixer`]): once a
//! class with hooked ancestry is instantiated, its dispatch table is
//! materialized and takes precedence over plain lookup.
//!
//! # Example
//!
//! ```
//! use entwine_hooks::class::{ClassDef, ClassRegistry};
//! use entwine_hooks::value::json;
//!
//! let registry = ClassRegistry::new();
//! let counter = registry
//!     .define(
//!         ClassDef::new("Counter")
//!             .constructor(|this, args| {
//!                 this.set_field("count", args.first().cloned().unwrap_or(json!(0)));
//!                 Ok(())
//!             })
//!             .method("get", |this, _args| Ok(this.get_field("count").unwrap_or_default())),
//!     )
//!     .unwrap();
//!
//! let instance = registry.instantiate(counter, vec![json!(3)]).unwrap();
//! assert_eq!(instance.call("get", vec![]).unwrap(), json!(3));
//! ```

use core::fmt;
use std::sync::{Arc, OnceLock};

use entwine_state::config::ConfigContext;
use entwine_state::owner::{OwnerId, StateOwner};
use entwine_state::state::{StateKey, StateStore};
use hashbrown::HashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::callable::Callable;
use crate::error::{HookError, HookResult};
use crate::mixer::{ClassMixerData, EdgeClassData};
use crate::value::{Args, Map, Value};

/// Constructor body of a class.
pub type ConstructorFn = Arc<dyn Fn(&Instance, &Args) -> HookResult<()> + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// ClassId
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of a registered class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) OwnerId);

impl ClassId {
    fn next() -> Self {
        Self(OwnerId::next())
    }
}

impl StateOwner for ClassId {
    fn owner_id(&self) -> OwnerId {
        self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0.raw())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ClassDef
// ─────────────────────────────────────────────────────────────────────────────

/// Builder describing a class before registration.
pub struct ClassDef {
    name: String,
    parent: Option<ClassId>,
    methods: IndexMap<String, Callable>,
    constructor: Option<ConstructorFn>,
}

impl ClassDef {
    /// Starts a root class.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            methods: IndexMap::new(),
            constructor: None,
        }
    }

    /// Sets the parent class.
    #[must_use]
    pub fn extends(mut self, parent: ClassId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Adds an own method that requires a receiver.
    #[must_use]
    pub fn method(
        self,
        name: impl Into<String>,
        body: impl Fn(&Instance, Args) -> HookResult<Value> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let callable = Callable::method(name.as_str(), body);
        self.method_callable(name, callable)
    }

    /// Adds an own method from an existing callable.
    #[must_use]
    pub fn method_callable(mut self, name: impl Into<String>, callable: Callable) -> Self {
        self.methods.insert(name.into(), callable);
        self
    }

    /// Sets the constructor body.
    ///
    /// Constructor bodies run root class first, once per instance.
    #[must_use]
    pub fn constructor(
        mut self,
        body: impl Fn(&Instance, &Args) -> HookResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.constructor = Some(Arc::new(body));
        self
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("constructor", &self.constructor.is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ClassRegistry
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct ClassEntry {
    pub(crate) name: String,
    pub(crate) parent: Option<ClassId>,
    pub(crate) methods: IndexMap<String, Callable>,
    pub(crate) constructor: Option<ConstructorFn>,
    /// Set on the class whose construction runs the collected constructor
    /// hooks and materializes the dispatch table.
    pub(crate) mixed_root: bool,
}

pub(crate) struct RegistryInner {
    pub(crate) classes: RwLock<HashMap<ClassId, ClassEntry>>,
    pub(crate) config: Arc<ConfigContext>,
    pub(crate) store: Arc<StateStore>,
    pub(crate) mixer_key: StateKey<ClassMixerData>,
    pub(crate) edge_key: StateKey<OnceLock<EdgeClassData>>,
}

/// Shared handle to a set of classes and their method hooks.
///
/// Cloning is cheap; clones observe the same classes.
#[derive(Clone)]
pub struct ClassRegistry {
    pub(crate) inner: Arc<RegistryInner>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.inner.classes.read().len())
            .finish()
    }
}

impl ClassRegistry {
    /// Creates an empty registry reading the global configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ConfigContext::global())
    }

    /// Creates an empty registry reading the given configuration.
    ///
    /// The registry keeps its mixer metadata in a private [`StateStore`]
    /// bound to the same configuration.
    #[must_use]
    pub fn with_config(config: Arc<ConfigContext>) -> Self {
        let store = Arc::new(StateStore::with_config(Arc::clone(&config)));
        Self {
            inner: Arc::new(RegistryInner {
                classes: RwLock::new(HashMap::new()),
                config,
                store,
                mixer_key: StateKey::new("class_mixer_data"),
                edge_key: StateKey::new("edge_class_data"),
            }),
        }
    }

    /// Returns the configuration context diagnostics are read from.
    #[must_use]
    pub fn config(&self) -> &Arc<ConfigContext> {
        &self.inner.config
    }

    /// Returns the store holding per-class metadata.
    #[must_use]
    pub fn store(&self) -> &Arc<StateStore> {
        &self.inner.store
    }

    /// Registers a class.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::UnknownClass`] if the parent is not registered.
    pub fn define(&self, def: ClassDef) -> HookResult<ClassId> {
        self.insert(def, false)
    }

    /// Registers an empty subclass of `base` carrying the same name.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::UnknownClass`] if `base` is not registered.
    pub fn derive(&self, base: ClassId) -> HookResult<ClassId> {
        let name = self.name_of(base)?;
        self.define(ClassDef::new(name).extends(base))
    }

    pub(crate) fn derive_mixed_root(&self, base: ClassId) -> HookResult<ClassId> {
        let name = self.name_of(base)?;
        self.insert(ClassDef::new(name).extends(base), true)
    }

    fn insert(&self, def: ClassDef, mixed_root: bool) -> HookResult<ClassId> {
        let mut classes = self.inner.classes.write();
        if let Some(parent) = def.parent
            && !classes.contains_key(&parent)
        {
            return Err(HookError::UnknownClass(parent));
        }

        let id = ClassId::next();
        tracing::trace!(class = %id, name = %def.name, mixed_root, "class registered");
        classes.insert(
            id,
            ClassEntry {
                name: def.name,
                parent: def.parent,
                methods: def.methods,
                constructor: def.constructor,
                mixed_root,
            },
        );
        Ok(id)
    }

    /// Adds or replaces an own method of `class`.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::UnknownClass`] if `class` is not registered.
    pub fn define_method(
        &self,
        class: ClassId,
        name: impl Into<String>,
        callable: Callable,
    ) -> HookResult<()> {
        let mut classes = self.inner.classes.write();
        let entry = classes
            .get_mut(&class)
            .ok_or(HookError::UnknownClass(class))?;
        entry.methods.insert(name.into(), callable);
        Ok(())
    }

    /// Returns `true` if `class` is registered.
    #[must_use]
    pub fn contains(&self, class: ClassId) -> bool {
        self.inner.classes.read().contains_key(&class)
    }

    /// Returns the display name of `class`.
    #[must_use]
    pub fn class_name(&self, class: ClassId) -> Option<String> {
        self.inner
            .classes
            .read()
            .get(&class)
            .map(|entry| entry.name.clone())
    }

    fn name_of(&self, class: ClassId) -> HookResult<String> {
        self.class_name(class).ok_or(HookError::UnknownClass(class))
    }

    /// Returns the direct parent of `class`.
    #[must_use]
    pub fn parent_of(&self, class: ClassId) -> Option<ClassId> {
        self.inner
            .classes
            .read()
            .get(&class)
            .and_then(|entry| entry.parent)
    }

    /// Returns the ancestry of `class`, root first, ending with `class`.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::UnknownClass`] if `class` is not registered.
    pub fn lineage(&self, class: ClassId) -> HookResult<Vec<ClassId>> {
        let classes = self.inner.classes.read();
        if !classes.contains_key(&class) {
            return Err(HookError::UnknownClass(class));
        }

        let mut chain = Vec::new();
        let mut current = Some(class);
        while let Some(id) = current {
            chain.push(id);
            current = classes.get(&id).and_then(|entry| entry.parent);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Returns `true` if `class` is `ancestor` or derives from it.
    #[must_use]
    pub fn is_subclass_of(&self, class: ClassId, ancestor: ClassId) -> bool {
        let classes = self.inner.classes.read();
        let mut current = Some(class);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = classes.get(&id).and_then(|entry| entry.parent);
        }
        false
    }

    /// Resolves `method` through the own methods of `class` and its
    /// ancestors, ignoring any materialized dispatch table.
    #[must_use]
    pub fn resolve_method(&self, class: ClassId, method: &str) -> Option<Callable> {
        let classes = self.inner.classes.read();
        let mut current = Some(class);
        while let Some(id) = current {
            let entry = classes.get(&id)?;
            if let Some(callable) = entry.methods.get(method) {
                return Some(callable.clone());
            }
            current = entry.parent;
        }
        None
    }

    /// Returns the callable an instance of `class` runs for `method`.
    ///
    /// A materialized dispatch table decides first, including the decision
    /// to leave a method absent; otherwise the plain lookup applies.
    #[must_use]
    pub fn dispatch(&self, class: ClassId, method: &str) -> Option<Callable> {
        match self.edge_dispatch(class, method) {
            Some(entry) => entry,
            None => self.resolve_method(class, method),
        }
    }

    /// Constructs an instance of `class`.
    ///
    /// Constructor bodies run from the root class down. When the lineage
    /// contains the root of a mixed hierarchy, its construction first
    /// materializes the dispatch table of `class` (once per class) and runs
    /// the collected constructor hooks.
    ///
    /// # Errors
    ///
    /// - [`HookError::UnknownClass`] if `class` is not registered
    /// - [`HookError::UnexpectedWrapState`] if a mixed root lost its metadata
    /// - any error raised by a constructor body or constructor hook
    pub fn instantiate(&self, class: ClassId, args: Args) -> HookResult<Instance> {
        let lineage = self.lineage(class)?;
        let instance = Instance::new(self.clone(), class);

        for id in lineage {
            let (constructor, mixed_root) = {
                let classes = self.inner.classes.read();
                let entry = classes.get(&id).ok_or(HookError::UnknownClass(id))?;
                (entry.constructor.clone(), entry.mixed_root)
            };
            if mixed_root {
                self.on_mixed_construct(&instance, &args)?;
            }
            if let Some(constructor) = constructor {
                constructor(&instance, &args)?;
            }
        }

        Ok(instance)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Instance
// ─────────────────────────────────────────────────────────────────────────────

struct InstanceInner {
    id: OwnerId,
    class: ClassId,
    registry: ClassRegistry,
    fields: RwLock<Map<String, Value>>,
}

/// A constructed object.
///
/// Cloning yields another handle to the same object.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

impl Instance {
    fn new(registry: ClassRegistry, class: ClassId) -> Self {
        Self {
            inner: Arc::new(InstanceInner {
                id: OwnerId::next(),
                class,
                registry,
                fields: RwLock::new(Map::new()),
            }),
        }
    }

    /// Returns the identity of this object.
    #[must_use]
    pub fn id(&self) -> OwnerId {
        self.inner.id
    }

    /// Returns the concrete class.
    #[must_use]
    pub fn class(&self) -> ClassId {
        self.inner.class
    }

    /// Returns the display name of the concrete class.
    #[must_use]
    pub fn class_name(&self) -> String {
        self.inner
            .registry
            .class_name(self.inner.class)
            .unwrap_or_default()
    }

    /// Returns the registry the class lives in.
    #[must_use]
    pub fn registry(&self) -> &ClassRegistry {
        &self.inner.registry
    }

    /// Returns `true` if the concrete class is `class` or derives from it.
    #[must_use]
    pub fn is_instance_of(&self, class: ClassId) -> bool {
        self.inner.registry.is_subclass_of(self.inner.class, class)
    }

    /// Returns the callable this object runs for `method`.
    #[must_use]
    pub fn method(&self, method: &str) -> Option<Callable> {
        self.inner.registry.dispatch(self.inner.class, method)
    }

    /// Returns `true` if `method` resolves on this object.
    #[must_use]
    pub fn has_method(&self, method: &str) -> bool {
        self.method(method).is_some()
    }

    /// Calls `method` with this object as receiver.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::MissingMethod`] if the method does not resolve,
    /// otherwise whatever the method (or its hooks) return.
    pub fn call(&self, method: &str, args: Args) -> HookResult<Value> {
        let callable = self.method(method).ok_or_else(|| HookError::MissingMethod {
            class: self.class_name(),
            method: method.to_owned(),
        })?;
        callable.call(Some(self), args)
    }

    /// Returns a copy of a field.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.inner.fields.read().get(name).cloned()
    }

    /// Sets a field, returning the previous value.
    pub fn set_field(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.inner.fields.write().insert(name.into(), value)
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Instance {}

impl StateOwner for Instance {
    fn owner_id(&self) -> OwnerId {
        self.inner.id
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.inner.id)
            .field("class", &self.inner.class)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::json;
    use parking_lot::Mutex;

    fn registry() -> ClassRegistry {
        ClassRegistry::with_config(Arc::new(ConfigContext::new()))
    }

    #[test]
    fn methods_resolve_through_parents() {
        let registry = registry();
        let def = ClassDef::new("Base")
            .method("hello", |_this, _args| Ok(json!("base")));
        let base = registry.define(def).unwrap();
        let child = registry
            .define(
                ClassDef::new("Child")
                    .extends(base)
                    .method("bye", |_this, _args| Ok(json!("child"))),
            )
            .unwrap();

        let instance = registry.instantiate(child, Vec::new()).unwrap();
        assert_eq!(instance.call("hello", Vec::new()).unwrap(), json!("base"));
        assert_eq!(instance.call("bye", Vec::new()).unwrap(), json!("child"));
        assert!(instance.is_instance_of(base));
        assert!(instance.is_instance_of(child));
        assert_eq!(registry.lineage(child).unwrap(), vec![base, child]);
    }

    #[test]
    fn override_shadows_parent() {
        let registry = registry();
        let def = ClassDef::new("Base")
            .method("who", |_this, _args| Ok(json!("base")));
        let base = registry.define(def).unwrap();
        let child = registry
            .define(
                ClassDef::new("Child")
                    .extends(base)
                    .method("who", |_this, _args| Ok(json!("child"))),
            )
            .unwrap();

        let instance = registry.instantiate(child, Vec::new()).unwrap();
        assert_eq!(instance.call("who", Vec::new()).unwrap(), json!("child"));
    }

    #[test]
    fn constructors_run_root_first() {
        let registry = registry();
        let order = Arc::new(Mutex::new(Vec::new()));
        let base_order = Arc::clone(&order);
        let child_order = Arc::clone(&order);

        let def = ClassDef::new("Base").constructor(move |_this, _args| {
            base_order.lock().push("base");
            Ok(())
        });
        let base = registry.define(def).unwrap();
        let child = registry
            .define(
                ClassDef::new("Child")
                    .extends(base)
                    .constructor(move |_this, _args| {
                        child_order.lock().push("child");
                        Ok(())
                    }),
            )
            .unwrap();

        registry.instantiate(child, Vec::new()).unwrap();
        assert_eq!(*order.lock(), vec!["base", "child"]);
    }

    #[test]
    fn missing_method_names_class() {
        let registry = registry();
        let class = registry.define(ClassDef::new("Empty")).unwrap();
        let instance = registry.instantiate(class, Vec::new()).unwrap();

        let err = instance.call("nope", Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            HookError::MissingMethod { class, method } if class == "Empty" && method == "nope"
        ));
        assert!(!instance.has_method("nope"));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let registry = registry();
        let other = self::registry();
        let foreign = other.define(ClassDef::new("Foreign")).unwrap();

        let err = registry
            .define(ClassDef::new("Orphan").extends(foreign))
            .unwrap_err();
        assert!(matches!(err, HookError::UnknownClass(id) if id == foreign));
        assert!(registry.instantiate(foreign, Vec::new()).is_err());
    }

    #[test]
    fn fields_are_per_instance() {
        let registry = registry();
        let class = registry.define(ClassDef::new("Bag")).unwrap();
        let a = registry.instantiate(class, Vec::new()).unwrap();
        let b = registry.instantiate(class, Vec::new()).unwrap();

        a.set_field("x", json!(1));
        assert_eq!(a.get_field("x"), Some(json!(1)));
        assert_eq!(b.get_field("x"), None);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn derive_keeps_name_and_methods() {
        let registry = registry();
        let def = ClassDef::new("Widget")
            .method("draw", |_this, _args| Ok(json!("drawn")));
        let base = registry.define(def).unwrap();
        let derived = registry.derive(base).unwrap();

        assert_eq!(registry.class_name(derived).as_deref(), Some("Widget"));
        assert_eq!(registry.parent_of(derived), Some(base));
        let instance = registry.instantiate(derived, Vec::new()).unwrap();
        assert_eq!(instance.call("draw", Vec::new()).unwrap(), json!("drawn"));
    }

    #[test]
    fn define_method_patches_existing_class() {
        let registry = registry();
        let class = registry.define(ClassDef::new("Late")).unwrap();
        let added = Callable::from_fn("added", |_| Ok(json!(1)));
        registry.define_method(class, "added", added).unwrap();

        let instance = registry.instantiate(class, Vec::new()).unwrap();
        assert_eq!(instance.call("added", Vec::new()).unwrap(), json!(1));
    }

    #[test]
    fn receiver_is_passed_to_methods() {
        let registry = registry();
        let class = registry
            .define(
                ClassDef::new("Named")
                    .constructor(|this, args| {
                        this.set_field("name", args[0].clone());
                        Ok(())
                    })
                    .method("name", |this, _args| {
                        Ok(this.get_field("name").unwrap_or_default())
                    }),
            )
            .unwrap();

        let instance = registry.instantiate(class, vec![json!("ada")]).unwrap();
        assert_eq!(instance.call("name", Vec::new()).unwrap(), json!("ada"));
        assert_eq!(instance.class_name(), "Named");
    }
}
