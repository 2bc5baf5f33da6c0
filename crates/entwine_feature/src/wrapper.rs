//! The wrapper abstraction.
//!
//! A [`Wrapper`] knows how to decorate a [`Target`] given a configuration and
//! how to merge two configurations. A [`Decor`] binds a wrapper to a
//! [`FeatureRegistry`] and takes care of the bookkeeping:
//!
//! - wrapping a plain target records the original, the symbols and the
//!   configuration on the result
//! - wrapping a target the same decor produced unwraps it first, merges the
//!   old configuration with the new one, unions the symbols and wraps the
//!   original exactly once
//!
//! Re-wrapping is therefore idempotent whenever `merge(c, c)` equals `c`.
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
//! let base = Target::from(Callable::from_fn("answer", |_| Ok(json!(41))));
//! let hooks = HookSet::new().after(AfterHook::new(|r| Ok(json!(r.as_i64().unwrap_or(0) + 1))));
//!
//! let once = decor.wrap(&base, hooks.clone(), &[]).unwrap();
//! let twice = decor.wrap(&once, hooks, &[]).unwrap();
//!
//! assert_eq!(registry.get_original(&twice), Some(base));
//! let answer = twice.as_function().unwrap().invoke(vec![]).unwrap();
//! assert_eq!(answer, json!(42));
//! ```

use core::fmt;
use std::sync::Arc;

use entwine_state::owner::OwnerId;

use crate::error::{FeatureError, FeatureResult};
use crate::registry::{DecorRecord, FeatureRegistry};
use crate::target::{FeatureSymbol, Target, union_symbols};

// ─────────────────────────────────────────────────────────────────────────────
// Wrapper
// ─────────────────────────────────────────────────────────────────────────────

/// Decorates targets.
///
/// # Contract
///
/// - [`wrap_target`](Self::wrap_target) must return a new target, never its
///   input
/// - [`merge`](Self::merge) must be associative; `merge(old, new)` treats
///   `new` as applied on top of `old`
pub trait Wrapper: Send + Sync + 'static {
    /// Per-application configuration.
    type Config: Clone + Send + Sync + 'static;

    /// Returns the display name used in diagnostics.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }

    /// Produces the decorated version of `original`.
    ///
    /// # Errors
    ///
    /// Implementations return [`FeatureError::UnsupportedTarget`] for target
    /// kinds they do not handle.
    fn wrap_target(&self, original: &Target, config: &Self::Config) -> FeatureResult<Target>;

    /// Combines a configuration already applied (`old`) with a new one.
    fn merge(&self, old: &Self::Config, new: &Self::Config) -> Self::Config;
}

// ─────────────────────────────────────────────────────────────────────────────
// Decor
// ─────────────────────────────────────────────────────────────────────────────

/// A wrapper bound to a registry, with a stable identity.
///
/// Cloning shares the identity: targets produced by any clone are recognized
/// as produced by this decor.
pub struct Decor<W: Wrapper> {
    id: OwnerId,
    wrapper: Arc<W>,
    registry: FeatureRegistry,
}

impl<W: Wrapper> Clone for Decor<W> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            wrapper: Arc::clone(&self.wrapper),
            registry: self.registry.clone(),
        }
    }
}

impl<W: Wrapper> fmt::Debug for Decor<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decor")
            .field("id", &self.id)
            .field("wrapper", &self.wrapper.name())
            .finish()
    }
}

impl<W: Wrapper> Decor<W> {
    /// Binds `wrapper` to `registry`.
    #[must_use]
    pub fn new(registry: &FeatureRegistry, wrapper: W) -> Self {
        Self {
            id: OwnerId::next(),
            wrapper: Arc::new(wrapper),
            registry: registry.clone(),
        }
    }

    /// Returns the identity of this decor.
    #[must_use]
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// Returns the wrapper.
    #[must_use]
    pub fn wrapper(&self) -> &W {
        &self.wrapper
    }

    /// Returns the registry metadata is recorded in.
    #[must_use]
    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    /// Wraps `target`, merging into an earlier wrap by this decor.
    ///
    /// # Errors
    ///
    /// - any error of [`Wrapper::wrap_target`]
    /// - [`FeatureError::UnexpectedWrapState`] if recorded metadata is
    ///   inconsistent or the wrapper returned a target it did not create
    pub fn wrap(
        &self,
        target: &Target,
        config: W::Config,
        symbols: &[FeatureSymbol],
    ) -> FeatureResult<Target> {
        let (original, config, merged_symbols) = match self.registry.record(target) {
            Some(record) if record.wrapper == self.id => {
                let old = downcast_config::<W>(&record.config, self.wrapper.name())?;
                let merged = self.wrapper.merge(old, &config);
                let mut merged_symbols = record.symbols.clone();
                union_symbols(&mut merged_symbols, symbols);
                tracing::debug!(
                    wrapper = self.wrapper.name(),
                    original = %record.original,
                    symbols = merged_symbols.len(),
                    "re-wrapping: merged into existing wrap"
                );
                (record.original.clone(), merged, merged_symbols)
            }
            _ => {
                let mut fresh = Vec::with_capacity(symbols.len());
                union_symbols(&mut fresh, symbols);
                (target.clone(), config, fresh)
            }
        };

        let wrapped = self.wrapper.wrap_target(&original, &config)?;
        self.registry.attach(
            &wrapped,
            DecorRecord {
                wrapper: self.id,
                wrapper_name: self.wrapper.name().into(),
                original,
                symbols: merged_symbols,
                config: Arc::new(config),
            },
        )?;
        Ok(wrapped)
    }

    /// Returns the configuration `target` was wrapped with, if this decor
    /// produced it.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::UnexpectedWrapState`] if the stored
    /// configuration has the wrong type.
    pub fn config_of(&self, target: &Target) -> FeatureResult<Option<W::Config>> {
        match self.registry.record(target) {
            Some(record) if record.wrapper == self.id => {
                let config = downcast_config::<W>(&record.config, self.wrapper.name())?;
                Ok(Some(config.clone()))
            }
            _ => Ok(None),
        }
    }

    /// Returns `true` if this decor produced `target`.
    #[must_use]
    pub fn produced(&self, target: &Target) -> bool {
        self.registry
            .record(target)
            .is_some_and(|record| record.wrapper == self.id)
    }
}

fn downcast_config<'a, W: Wrapper>(
    config: &'a Arc<dyn core::any::Any + Send + Sync>,
    wrapper: &str,
) -> FeatureResult<&'a W::Config> {
    config.downcast_ref::<W::Config>().ok_or_else(|| {
        FeatureError::UnexpectedWrapState(format!(
            "configuration recorded for wrapper `{wrapper}` has the wrong type"
        ))
    })
}
