//! Inheritance-aware method hooks.
//!
//! Hooks attached to a class apply to every subclass. Each class that received
//! hooks owns a [`ClassMixerData`] node pointing at the nearest ancestor's
//! node, and each hooked method owns one [`HookList`] per stage, linked to the
//! same list one level up. Nodes and their links are fixed once created; later
//! hooks only extend the own level.
//!
//! # Materialization
//!
//! The first time a concrete class with mixed ancestry is instantiated, its
//! accumulated hooks are resolved into an [`EdgeClassData`] dispatch table:
//! every hooked method name maps to the implementation the class resolved at
//! that moment and to the wrapped callable instances actually run. This
//! happens at most once per concrete class. Hooks registered after that are
//! not picked up by classes that were already materialized.
//!
//! # Ordering
//!
//! | Stage | Merged order |
//! |-------|--------------|
//! | before, middleware | ancestor levels first, own level last |
//! | after | own level first, ancestor levels last |
//! | constructor | ancestor levels first, own level last |
//!
//! Within one level, hooks keep their registration order. The after order
//! makes the hooks of the most recently applied level run closest to the
//! original result.

use core::fmt;
use std::sync::{Arc, OnceLock};

use entwine_state::owner::StateOwner;
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use crate::callable::Callable;
use crate::chain::compose_with;
use crate::class::{ClassId, ClassRegistry, Instance};
use crate::error::{HookError, HookResult};
use crate::hook::{
    AfterHook, BeforeHook, ConstructorHook, HookOptions, HookSet, MethodHook, MiddlewareHook,
};
use crate::value::Args;

// ─────────────────────────────────────────────────────────────────────────────
// HookList
// ─────────────────────────────────────────────────────────────────────────────

/// A hook registered on one level of a [`HookList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookEntry<H> {
    /// The hook itself.
    pub hook: H,
    /// Whether the hook only applies when an implementation exists.
    pub if_exists: bool,
}

/// An ordered hook list that inherits from an ancestor list.
///
/// The ancestor link is fixed at construction. Membership is de-duplicated
/// per level: adding a hook already present on this level is a no-op, while a
/// hook present on an ancestor level is still added.
pub struct HookList<H> {
    parent: Option<Arc<HookList<H>>>,
    own: RwLock<Vec<HookEntry<H>>>,
}

impl<H: Clone + PartialEq> HookList<H> {
    /// Creates an empty list delegating to `parent`.
    #[must_use]
    pub fn new(parent: Option<Arc<HookList<H>>>) -> Self {
        Self {
            parent,
            own: RwLock::new(Vec::new()),
        }
    }

    /// Returns the ancestor list.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<HookList<H>>> {
        self.parent.as_ref()
    }

    /// Appends a hook to this level. Returns `false` if it was already there.
    pub fn add(&self, hook: H, if_exists: bool) -> bool {
        let mut own = self.own.write();
        if own.iter().any(|entry| entry.hook == hook) {
            return false;
        }
        own.push(HookEntry { hook, if_exists });
        true
    }

    /// Returns the hooks of this level only.
    #[must_use]
    pub fn own(&self) -> Vec<HookEntry<H>> {
        self.own.read().clone()
    }

    /// Returns `true` if this level holds no hook.
    #[must_use]
    pub fn is_own_empty(&self) -> bool {
        self.own.read().is_empty()
    }

    /// Returns every hook, ancestor levels first.
    #[must_use]
    pub fn collect(&self) -> Vec<HookEntry<H>> {
        let mut out = self
            .parent
            .as_ref()
            .map(|parent| parent.collect())
            .unwrap_or_default();
        out.extend(self.own.read().iter().cloned());
        out
    }

    /// Returns every hook, this level first.
    #[must_use]
    pub fn collect_nearest_first(&self) -> Vec<HookEntry<H>> {
        let mut out = self.own();
        if let Some(parent) = &self.parent {
            out.extend(parent.collect_nearest_first());
        }
        out
    }
}

impl<H> fmt::Debug for HookList<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookList")
            .field("own", &self.own.read().len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// The three stage lists of one method on one class.
#[derive(Debug)]
pub struct MethodHookLists {
    /// Before hooks.
    pub before: Arc<HookList<BeforeHook>>,
    /// Middleware.
    pub middleware: Arc<HookList<MiddlewareHook>>,
    /// After hooks.
    pub after: Arc<HookList<AfterHook>>,
}

impl MethodHookLists {
    fn new(parent: Option<&MethodHookLists>) -> Self {
        Self {
            before: Arc::new(HookList::new(parent.map(|p| Arc::clone(&p.before)))),
            middleware: Arc::new(HookList::new(parent.map(|p| Arc::clone(&p.middleware)))),
            after: Arc::new(HookList::new(parent.map(|p| Arc::clone(&p.after)))),
        }
    }

    fn has_own_hooks(&self) -> bool {
        let empty = self.before.is_own_empty()
            && self.middleware.is_own_empty()
            && self.after.is_own_empty();
        !empty
    }

    fn add(&self, hook: MethodHook, if_exists: bool) -> bool {
        match hook {
            MethodHook::Before(hook) => self.before.add(hook, if_exists),
            MethodHook::Middleware(hook) => self.middleware.add(hook, if_exists),
            MethodHook::After(hook) => self.after.add(hook, if_exists),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ClassMixerData
// ─────────────────────────────────────────────────────────────────────────────

/// Hooks registered on one class, linked to the nearest hooked ancestor.
pub struct ClassMixerData {
    class: ClassId,
    super_data: Option<Arc<ClassMixerData>>,
    constructor_hooks: Arc<HookList<ConstructorHook>>,
    methods: RwLock<IndexMap<String, Arc<MethodHookLists>>>,
}

impl ClassMixerData {
    fn new(class: ClassId, super_data: Option<Arc<ClassMixerData>>) -> Self {
        let parent = super_data
            .as_ref()
            .map(|data| Arc::clone(&data.constructor_hooks));
        Self {
            class,
            super_data,
            constructor_hooks: Arc::new(HookList::new(parent)),
            methods: RwLock::new(IndexMap::new()),
        }
    }

    /// Returns the class owning this node.
    #[must_use]
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Returns the nearest ancestor's node.
    #[must_use]
    pub fn super_data(&self) -> Option<&Arc<ClassMixerData>> {
        self.super_data.as_ref()
    }

    /// Returns the constructor hook list of this level.
    #[must_use]
    pub fn constructor_hooks(&self) -> &Arc<HookList<ConstructorHook>> {
        &self.constructor_hooks
    }

    /// Returns the stage lists of `method`, creating them (and the missing
    /// ancestor lists they link to) on first use.
    pub fn method_lists(&self, method: &str) -> Arc<MethodHookLists> {
        if let Some(lists) = self.methods.read().get(method) {
            return Arc::clone(lists);
        }

        let parent = self
            .super_data
            .as_ref()
            .map(|data| data.method_lists(method));
        let mut methods = self.methods.write();
        let lists = methods
            .entry(method.to_owned())
            .or_insert_with(|| Arc::new(MethodHookLists::new(parent.as_deref())));
        Arc::clone(lists)
    }

    /// Returns the stage lists of `method` on the nearest level that has them.
    ///
    /// Never creates lists. A level that has lists for `method` is linked to
    /// lists on every level above it, so the nearest one sees all hooks.
    #[must_use]
    pub fn find_lists(&self, method: &str) -> Option<Arc<MethodHookLists>> {
        let mut current = Some(self);
        while let Some(level) = current {
            if let Some(lists) = level.methods.read().get(method) {
                return Some(Arc::clone(lists));
            }
            current = level.super_data.as_deref();
        }
        None
    }

    /// Returns the names of every method hooked on this level or above,
    /// root level first, without duplicates.
    #[must_use]
    pub fn hooked_method_names(&self) -> Vec<String> {
        let mut levels = Vec::new();
        let mut current = Some(self);
        while let Some(level) = current {
            levels.push(level);
            current = level.super_data.as_deref();
        }

        let mut names = IndexSet::new();
        for level in levels.into_iter().rev() {
            for (name, lists) in level.methods.read().iter() {
                if lists.has_own_hooks() {
                    names.insert(name.clone());
                }
            }
        }
        names.into_iter().collect()
    }

    /// Resolves the merged hooks of `method` across every level.
    ///
    /// Reading never creates lists on any level.
    #[must_use]
    pub fn merged_hooks(&self, method: &str) -> MergedHooks {
        let Some(lists) = self.find_lists(method) else {
            return MergedHooks::empty();
        };
        let before = lists.before.collect();
        let middleware = lists.middleware.collect();
        let after = lists.after.collect_nearest_first();

        let if_exists_only = before.iter().all(|entry| entry.if_exists)
            && middleware.iter().all(|entry| entry.if_exists)
            && after.iter().all(|entry| entry.if_exists);

        MergedHooks {
            hooks: HookSet {
                before: before.into_iter().map(|entry| entry.hook).collect(),
                middleware: middleware.into_iter().map(|entry| entry.hook).collect(),
                after: after.into_iter().map(|entry| entry.hook).collect(),
            },
            if_exists_only,
        }
    }
}

impl fmt::Debug for ClassMixerData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMixerData")
            .field("class", &self.class)
            .field("super", &self.super_data.as_ref().map(|data| data.class))
            .field("methods", &self.methods.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The hooks of one method, merged across a class's ancestry.
#[derive(Debug, Clone, Default)]
pub struct MergedHooks {
    /// Hooks in execution order.
    pub hooks: HookSet,
    /// `true` when every hook was registered with `if_exists` (vacuously
    /// true when there are none).
    pub if_exists_only: bool,
}

impl MergedHooks {
    fn empty() -> Self {
        Self {
            hooks: HookSet::new(),
            if_exists_only: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EdgeClassData
// ─────────────────────────────────────────────────────────────────────────────

/// One hooked method of a materialized class.
#[derive(Debug, Clone)]
pub struct EdgeMethod {
    /// The implementation resolved at materialization time, if any.
    pub original: Option<Callable>,
    /// What instances run, or `None` if the method stays absent.
    pub dispatch: Option<Callable>,
}

/// The dispatch table of a concrete class, built on first instantiation.
#[derive(Debug, Clone)]
pub struct EdgeClassData {
    /// The concrete class.
    pub class: ClassId,
    /// Hooked methods by name, in hooking order.
    pub methods: IndexMap<String, EdgeMethod>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry operations
// ─────────────────────────────────────────────────────────────────────────────

impl ClassRegistry {
    /// Returns the mixer data `class` uses: its own node, or the nearest
    /// ancestor's.
    #[must_use]
    pub fn mixer_data(&self, class: ClassId) -> Option<Arc<ClassMixerData>> {
        let key = &self.inner.mixer_key;
        let parent_of = |owner| self.parent_of(ClassId(owner)).map(|p| p.owner_id());
        self.inner
            .store
            .inherited(class.owner_id(), key, parent_of)
            .map(|(_, data)| data)
    }

    /// Returns `true` if `class` or one of its ancestors received hooks.
    #[must_use]
    pub fn is_mixed(&self, class: ClassId) -> bool {
        self.mixer_data(class).is_some()
    }

    fn create_mixer_data(
        &self,
        class: ClassId,
        super_data: Option<Arc<ClassMixerData>>,
    ) -> Arc<ClassMixerData> {
        self.inner
            .store
            .get_or_init(class.owner_id(), &self.inner.mixer_key, |_| {
                tracing::trace!(
                    %class,
                    super_class = ?super_data.as_ref().map(|data| data.class),
                    "mixer data created"
                );
                ClassMixerData::new(class, super_data)
            })
    }

    /// Returns the class hooks must be registered on, with its own node.
    ///
    /// An unmixed ancestry gets a fresh mixed root subclass; a mixed one gets
    /// an own node on `class` itself.
    fn mixer_target(&self, class: ClassId) -> HookResult<(ClassId, Arc<ClassMixerData>)> {
        let key = &self.inner.mixer_key;
        if let Some(own) = self.inner.store.get(class.owner_id(), key) {
            return Ok((class, own));
        }
        match self.mixer_data(class) {
            Some(inherited) => Ok((class, self.create_mixer_data(class, Some(inherited)))),
            None => {
                let root = self.derive_mixed_root(class)?;
                Ok((root, self.create_mixer_data(root, None)))
            }
        }
    }

    /// Derives a fresh subclass of `base` with its own mixer node.
    ///
    /// If the ancestry of `base` is not mixed yet, the subclass becomes the
    /// root of a new mixed hierarchy.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::UnknownClass`] if `base` is not registered.
    pub fn derive_mixed(&self, base: ClassId) -> HookResult<ClassId> {
        match self.mixer_data(base) {
            Some(inherited) => {
                let class = self.derive(base)?;
                self.create_mixer_data(class, Some(inherited));
                Ok(class)
            }
            None => {
                let root = self.derive_mixed_root(base)?;
                self.create_mixer_data(root, None);
                Ok(root)
            }
        }
    }

    /// Registers a constructor hook.
    ///
    /// Returns the class to instantiate from now on: a new mixed subclass if
    /// the ancestry of `class` was unmixed, otherwise `class` itself.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::UnknownClass`] if `class` is not registered.
    pub fn add_constructor_hook(
        &self,
        class: ClassId,
        hook: ConstructorHook,
    ) -> HookResult<ClassId> {
        let (target, data) = self.mixer_target(class)?;
        data.constructor_hooks.add(hook, false);
        Ok(target)
    }

    /// Registers a method hook.
    ///
    /// Returns the class to instantiate from now on, like
    /// [`add_constructor_hook`](Self::add_constructor_hook).
    ///
    /// # Errors
    ///
    /// Returns [`HookError::UnknownClass`] if `class` is not registered.
    ///
    /// # Example
    ///
    /// ```
    /// use entwine_hooks::class::{ClassDef, ClassRegistry};
    /// use entwine_hooks::hook::{AfterHook, HookOptions};
    /// use entwine_hooks::value::json;
    ///
    /// let registry = ClassRegistry::new();
    /// let plain = registry
    ///     .define(ClassDef::new("Answer").method("get", |_this, _args| Ok(json!(41))))
    ///     .unwrap();
    ///
    /// let hooked = registry
    ///     .add_method_hook(
    ///         plain,
    ///         "get",
    ///         AfterHook::new(|r| Ok(json!(r.as_i64().unwrap_or(0) + 1))),
    ///         HookOptions::default(),
    ///     )
    ///     .unwrap();
    ///
    /// assert_ne!(hooked, plain);
    /// let instance = registry.instantiate(hooked, vec![]).unwrap();
    /// assert_eq!(instance.call("get", vec![]).unwrap(), json!(42));
    /// ```
    pub fn add_method_hook(
        &self,
        class: ClassId,
        method: &str,
        hook: impl Into<MethodHook>,
        options: HookOptions,
    ) -> HookResult<ClassId> {
        let (target, data) = self.mixer_target(class)?;
        let hook = hook.into();
        tracing::trace!(
            class = %target,
            method,
            hook = hook.name(),
            kind = ?hook.kind(),
            "method hook added"
        );
        data.method_lists(method).add(hook, options.if_exists);
        Ok(target)
    }

    /// Returns every method name hooked anywhere in the ancestry of `class`.
    #[must_use]
    pub fn hooked_method_names(&self, class: ClassId) -> Vec<String> {
        self.mixer_data(class)
            .map(|data| data.hooked_method_names())
            .unwrap_or_default()
    }

    /// Returns the merged hooks of `method` as seen from `class`.
    ///
    /// A class without hooked ancestry yields an empty set.
    #[must_use]
    pub fn merged_hooks(&self, class: ClassId, method: &str) -> MergedHooks {
        self.mixer_data(class)
            .map(|data| data.merged_hooks(method))
            .unwrap_or_else(MergedHooks::empty)
    }

    /// Returns the constructor hooks instances of `class` run, ancestor
    /// levels first.
    #[must_use]
    pub fn constructor_hooks(&self, class: ClassId) -> Vec<ConstructorHook> {
        self.mixer_data(class)
            .map(|data| {
                data.constructor_hooks
                    .collect()
                    .into_iter()
                    .map(|entry| entry.hook)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the dispatch table of `class` if it was materialized.
    #[must_use]
    pub fn edge_data(&self, class: ClassId) -> Option<EdgeClassData> {
        self.inner
            .store
            .get(class.owner_id(), &self.inner.edge_key)
            .and_then(|cell| cell.get().cloned())
    }

    /// Looks `method` up in the dispatch table of `class`.
    ///
    /// The outer `None` means the table does not decide; `Some(None)` means
    /// the method was deliberately left absent.
    pub(crate) fn edge_dispatch(&self, class: ClassId, method: &str) -> Option<Option<Callable>> {
        let key = &self.inner.edge_key;
        let cell = self.inner.store.get(class.owner_id(), key)?;
        let edge = cell.get()?;
        edge.methods.get(method).map(|entry| entry.dispatch.clone())
    }

    /// Runs at the mixed root of `instance`'s lineage during construction.
    pub(crate) fn on_mixed_construct(&self, instance: &Instance, args: &Args) -> HookResult<()> {
        let class = instance.class();
        let data = self.mixer_data(class).ok_or_else(|| {
            HookError::UnexpectedWrapState(format!(
                "{class} is part of a mixed hierarchy but has no mixer data"
            ))
        })?;

        self.materialize(class, &data);

        for entry in data.constructor_hooks.collect() {
            entry.hook.call(instance, args)?;
        }
        Ok(())
    }

    fn materialize(&self, class: ClassId, data: &ClassMixerData) {
        let cell = self
            .inner
            .store
            .get_or_init(class.owner_id(), &self.inner.edge_key, |_| OnceLock::new());
        cell.get_or_init(|| self.build_edge(class, data));
    }

    fn build_edge(&self, class: ClassId, data: &ClassMixerData) -> EdgeClassData {
        let mut methods = IndexMap::new();

        for name in data.hooked_method_names() {
            let merged = data.merged_hooks(&name);
            let original = self.resolve_method(class, &name);

            let base = match &original {
                Some(callable) => Some(callable.clone()),
                None if !merged.if_exists_only => Some(Callable::noop(name.as_str())),
                None => None,
            };
            let config = Arc::clone(&self.inner.config);
            let dispatch = base.map(|base| compose_with(config, &base, merged.hooks));

            tracing::debug!(
                %class,
                method = %name,
                resolved = original.is_some(),
                installed = dispatch.is_some(),
                "materialized hooked method"
            );
            methods.insert(name, EdgeMethod { original, dispatch });
        }

        EdgeClassData { class, methods }
    }
}
