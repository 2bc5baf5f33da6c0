//! Wrapper metadata and decoration lookups.
//!
//! Every target produced by a [`Decor`](crate::wrapper::Decor) carries a
//! metadata record naming the wrapper that produced it, the original target,
//! the accumulated symbols and the configuration. The record is a private
//! state slot keyed by the wrapped target's identity, so "is this wrapped"
//! is a lookup and never a structural inspection.

use core::any::Any;
use core::fmt;
use std::sync::Arc;

use entwine_state::config::ConfigContext;
use entwine_state::owner::{OwnerId, StateOwner};
use entwine_state::state::{StateKey, StateStore};
use parking_lot::RwLock;

use crate::error::{FeatureError, FeatureResult};
use crate::feature::FeatureMetadata;
use crate::target::{FeatureSymbol, Target};

/// Metadata attached to a wrapped target.
pub(crate) struct DecorRecord {
    pub(crate) wrapper: OwnerId,
    pub(crate) wrapper_name: Arc<str>,
    pub(crate) original: Target,
    pub(crate) symbols: Vec<FeatureSymbol>,
    pub(crate) config: Arc<dyn Any + Send + Sync>,
}

pub(crate) struct RegistryInner {
    pub(crate) config: Arc<ConfigContext>,
    pub(crate) store: Arc<StateStore>,
    pub(crate) records: StateKey<DecorRecord>,
    pub(crate) decorated: StateKey<RwLock<Target>>,
    pub(crate) features: StateKey<RwLock<FeatureMetadata>>,
}

/// Shared home of wrapper and feature metadata.
///
/// Wrappers, features and the lookups below only see metadata recorded in
/// the same registry.
#[derive(Clone)]
pub struct FeatureRegistry {
    pub(crate) inner: Arc<RegistryInner>,
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("owners", &self.inner.store.owner_count())
            .finish()
    }
}

impl FeatureRegistry {
    /// Creates an empty registry reading the global configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ConfigContext::global())
    }

    /// Creates an empty registry reading the given configuration.
    #[must_use]
    pub fn with_config(config: Arc<ConfigContext>) -> Self {
        let store = Arc::new(StateStore::with_config(Arc::clone(&config)));
        Self {
            inner: Arc::new(RegistryInner {
                config,
                store,
                records: StateKey::new("wrapper_metadata"),
                decorated: StateKey::new("decorated"),
                features: StateKey::new("feature_metadata"),
            }),
        }
    }

    /// Returns the configuration context.
    #[must_use]
    pub fn config(&self) -> &Arc<ConfigContext> {
        &self.inner.config
    }

    /// Returns the store holding the metadata.
    #[must_use]
    pub fn store(&self) -> &Arc<StateStore> {
        &self.inner.store
    }

    pub(crate) fn record(&self, target: &Target) -> Option<Arc<DecorRecord>> {
        self.inner.store.get(target.owner_id(), &self.inner.records)
    }

    /// Records that `wrapped` was produced from `record.original`.
    pub(crate) fn attach(&self, wrapped: &Target, record: DecorRecord) -> FeatureResult<()> {
        let owner = wrapped.owner_id();
        let known = self.inner.store.contains(owner, &self.inner.records);
        if owner == record.original.owner_id() || known {
            return Err(FeatureError::UnexpectedWrapState(format!(
                "wrapper `{}` did not return a fresh target for {}",
                record.wrapper_name, record.original
            )));
        }

        let original = record.original.clone();
        self.inner
            .store
            .get_or_init(wrapped.owner_id(), &self.inner.records, |_| record);

        let latest = self
            .inner
            .store
            .get_or_init(original.owner_id(), &self.inner.decorated, |_| {
                RwLock::new(wrapped.clone())
            });
        *latest.write() = wrapped.clone();
        Ok(())
    }

    /// Returns `true` if `target` was produced by a wrapper, optionally
    /// requiring that it carries `symbol`.
    #[must_use]
    pub fn is_decorated(&self, target: &Target, symbol: Option<&FeatureSymbol>) -> bool {
        self.record(target).is_some_and(|record| {
            symbol.is_none_or(|symbol| record.symbols.contains(symbol))
        })
    }

    /// Returns the target `target` was wrapped from, one level down.
    #[must_use]
    pub fn get_original(&self, target: &Target) -> Option<Target> {
        self.record(target).map(|record| record.original.clone())
    }

    /// Returns the most recent wrapped result produced from `original`.
    #[must_use]
    pub fn get_decorated(&self, original: &Target) -> Option<Target> {
        self.inner
            .store
            .get(original.owner_id(), &self.inner.decorated)
            .map(|latest| latest.read().clone())
    }

    /// Returns the symbols `target` carries, in accumulation order.
    #[must_use]
    pub fn symbols_of(&self, target: &Target) -> Vec<FeatureSymbol> {
        self.record(target)
            .map(|record| record.symbols.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entwine_hooks::callable::Callable;

    fn registry() -> FeatureRegistry {
        FeatureRegistry::with_config(Arc::new(ConfigContext::new()))
    }

    fn record(original: &Target, symbols: Vec<FeatureSymbol>) -> DecorRecord {
        DecorRecord {
            wrapper: OwnerId::next(),
            wrapper_name: "test".into(),
            original: original.clone(),
            symbols,
            config: Arc::new(()),
        }
    }

    #[test]
    fn plain_targets_are_not_decorated() {
        let registry = registry();
        let target = Target::from(Callable::noop("plain"));

        assert!(!registry.is_decorated(&target, None));
        assert!(registry.get_original(&target).is_none());
        assert!(registry.get_decorated(&target).is_none());
        assert!(registry.symbols_of(&target).is_empty());
    }

    #[test]
    fn attach_links_both_directions() {
        let registry = registry();
        let original = Target::from(Callable::noop("f"));
        let wrapped = Target::from(Callable::noop("f"));
        let symbol = FeatureSymbol::new("s");

        registry
            .attach(&wrapped, record(&original, vec![symbol.clone()]))
            .unwrap();

        assert!(registry.is_decorated(&wrapped, None));
        assert!(registry.is_decorated(&wrapped, Some(&symbol)));
        let other = FeatureSymbol::new("s");
        assert!(!registry.is_decorated(&wrapped, Some(&other)));
        assert_eq!(registry.get_original(&wrapped), Some(original.clone()));
        assert_eq!(registry.get_decorated(&original), Some(wrapped));
    }

    #[test]
    fn get_decorated_tracks_latest() {
        let registry = registry();
        let original = Target::from(Callable::noop("f"));
        let first = Target::from(Callable::noop("f"));
        let second = Target::from(Callable::noop("f"));

        let first_record = record(&original, Vec::new());
        registry.attach(&first, first_record).unwrap();
        let second_record = record(&original, Vec::new());
        registry.attach(&second, second_record).unwrap();

        assert_eq!(registry.get_decorated(&original), Some(second));
    }

    #[test]
    fn attach_rejects_reused_targets() {
        let registry = registry();
        let original = Target::from(Callable::noop("f"));

        let err = registry
            .attach(&original, record(&original, Vec::new()))
            .unwrap_err();
        assert!(matches!(err, FeatureError::UnexpectedWrapState(_)));
    }
}
