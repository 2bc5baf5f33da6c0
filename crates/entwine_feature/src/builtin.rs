//! Built-in wrappers for functions and classes.

use std::sync::Arc;

use entwine_hooks::chain::compose_with;
use entwine_hooks::class::ClassRegistry;
use entwine_hooks::hook::{ConstructorHook, HookOptions, HookSet, MethodHook};
use entwine_state::config::ConfigContext;

use crate::error::{FeatureError, FeatureResult};
use crate::registry::FeatureRegistry;
use crate::target::Target;
use crate::wrapper::{Decor, Wrapper};

// ─────────────────────────────────────────────────────────────────────────────
// FunctionDecor
// ─────────────────────────────────────────────────────────────────────────────

/// Wraps free functions with a [`HookSet`].
///
/// Re-wrapping merges hook sets with [`HookSet::merge`], so applying the same
/// hooks twice installs them once.
#[derive(Debug, Clone)]
pub struct FunctionDecor {
    config: Arc<ConfigContext>,
}

impl FunctionDecor {
    /// Creates the wrapper, reading diagnostics settings from `config`.
    #[must_use]
    pub fn new(config: Arc<ConfigContext>) -> Self {
        Self { config }
    }

    /// Creates a decor bound to `registry`, sharing its configuration.
    #[must_use]
    pub fn decor(registry: &FeatureRegistry) -> Decor<Self> {
        Decor::new(registry, Self::new(Arc::clone(registry.config())))
    }
}

impl Wrapper for FunctionDecor {
    type Config = HookSet;

    fn name(&self) -> &str {
        "function_decor"
    }

    fn wrap_target(&self, original: &Target, config: &HookSet) -> FeatureResult<Target> {
        match original {
            Target::Function(base) => Ok(Target::Function(compose_with(
                Arc::clone(&self.config),
                base,
                config.clone(),
            ))),
            Target::Class(_) => Err(FeatureError::UnsupportedTarget {
                wrapper: self.name().into(),
                target: original.to_string(),
            }),
        }
    }

    fn merge(&self, old: &HookSet, new: &HookSet) -> HookSet {
        old.merge(new)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ClassDecor
// ─────────────────────────────────────────────────────────────────────────────

/// One hook registration performed by [`ClassDecor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassHook {
    /// A constructor hook.
    Constructor(ConstructorHook),
    /// A method hook.
    Method {
        /// Method name.
        name: String,
        /// The hook.
        hook: MethodHook,
        /// Registration options.
        options: HookOptions,
    },
}

/// An ordered list of class hook registrations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassHooks {
    hooks: Vec<ClassHook>,
}

impl ClassHooks {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a constructor hook.
    #[must_use]
    pub fn constructor(mut self, hook: ConstructorHook) -> Self {
        self.hooks.push(ClassHook::Constructor(hook));
        self
    }

    /// Appends a method hook with default options.
    #[must_use]
    pub fn method(self, name: impl Into<String>, hook: impl Into<MethodHook>) -> Self {
        self.method_with(name, hook, HookOptions::default())
    }

    /// Appends a method hook with explicit options.
    #[must_use]
    pub fn method_with(
        mut self,
        name: impl Into<String>,
        hook: impl Into<MethodHook>,
        options: HookOptions,
    ) -> Self {
        self.hooks.push(ClassHook::Method {
            name: name.into(),
            hook: hook.into(),
            options,
        });
        self
    }

    /// Returns the registrations in order.
    #[must_use]
    pub fn hooks(&self) -> &[ClassHook] {
        &self.hooks
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

/// Wraps classes by deriving a mixed subclass and registering hooks on it.
///
/// The original class is never modified. Re-wrapping derives a new subclass
/// of the original with the merged registrations.
///
/// Merged registrations all land on that one subclass, so their after hooks
/// run in registration order. Nested classes differ: there the after hooks of
/// the nearest class run first.
#[derive(Debug, Clone)]
pub struct ClassDecor {
    classes: ClassRegistry,
}

impl ClassDecor {
    /// Creates the wrapper for classes defined in `classes`.
    #[must_use]
    pub fn new(classes: ClassRegistry) -> Self {
        Self { classes }
    }

    /// Creates a decor bound to `registry`.
    #[must_use]
    pub fn decor(registry: &FeatureRegistry, classes: &ClassRegistry) -> Decor<Self> {
        Decor::new(registry, Self::new(classes.clone()))
    }

    /// Returns the class registry.
    #[must_use]
    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }
}

impl Wrapper for ClassDecor {
    type Config = ClassHooks;

    fn name(&self) -> &str {
        "class_decor"
    }

    fn wrap_target(&self, original: &Target, config: &ClassHooks) -> FeatureResult<Target> {
        let Target::Class(base) = original else {
            return Err(FeatureError::UnsupportedTarget {
                wrapper: self.name().into(),
                target: original.to_string(),
            });
        };

        let class = self.classes.derive_mixed(*base)?;
        for hook in &config.hooks {
            match hook {
                ClassHook::Constructor(hook) => {
                    self.classes.add_constructor_hook(class, hook.clone())?;
                }
                ClassHook::Method {
                    name,
                    hook,
                    options,
                } => {
                    let hook = hook.clone();
                    self.classes.add_method_hook(class, name, hook, *options)?;
                }
            }
        }
        tracing::debug!(
            original = %base,
            %class,
            hooks = config.len(),
            "class wrapped"
        );
        Ok(Target::Class(class))
    }

    fn merge(&self, old: &ClassHooks, new: &ClassHooks) -> ClassHooks {
        let mut hooks = old.hooks.clone();
        for hook in &new.hooks {
            if !hooks.contains(hook) {
                hooks.push(hook.clone());
            }
        }
        ClassHooks { hooks }
    }
}
