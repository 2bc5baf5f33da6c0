//! Features: reusable, identifiable applications of a wrapper.
//!
//! A [`Feature`] is a decor paired with a configuration. Applying it wraps a
//! target with the feature's symbols, so the result can later be recognized
//! with [`FeatureRegistry::is_decorated`]. Features also carry ordering
//! constraints consumed by [`order_features`](crate::ordering::order_features).

use core::fmt;
use std::sync::Arc;

use entwine_state::owner::{OwnerId, StateOwner};
use parking_lot::RwLock;

use crate::error::FeatureResult;
use crate::registry::FeatureRegistry;
use crate::target::{FeatureSymbol, Target, union_symbols};
use crate::wrapper::{Decor, Wrapper};

type ApplyFn = dyn Fn(&Target, &[FeatureSymbol]) -> FeatureResult<Target> + Send + Sync;

/// Identity and ordering metadata of a feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureMetadata {
    /// Identities the feature carries; starts with its own symbol.
    pub symbols: Vec<FeatureSymbol>,
    /// Identities that must be ordered after this feature.
    pub force_before: Vec<FeatureSymbol>,
}

struct FeatureInner {
    id: OwnerId,
    symbol: FeatureSymbol,
    apply: Arc<ApplyFn>,
    registry: FeatureRegistry,
}

/// A decor bound to a configuration.
///
/// Cloning yields another handle to the same feature.
#[derive(Clone)]
pub struct Feature {
    inner: Arc<FeatureInner>,
}

impl Feature {
    /// Creates a feature from a decor and a configuration.
    #[must_use]
    pub fn new<W: Wrapper>(name: &str, decor: &Decor<W>, config: W::Config) -> Self {
        let decor = decor.clone();
        let registry = decor.registry().clone();
        let apply = move |target: &Target, symbols: &[FeatureSymbol]| {
            decor.wrap(target, config.clone(), symbols)
        };
        Self {
            inner: Arc::new(FeatureInner {
                id: OwnerId::next(),
                symbol: FeatureSymbol::new(name),
                apply: Arc::new(apply),
                registry,
            }),
        }
    }

    /// Returns the feature's own symbol.
    #[must_use]
    pub fn symbol(&self) -> &FeatureSymbol {
        &self.inner.symbol
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.symbol.name()
    }

    fn metadata_slot(&self) -> Arc<RwLock<FeatureMetadata>> {
        let symbol = self.inner.symbol.clone();
        let registry = &self.inner.registry.inner;
        registry.store.get_or_init(self.inner.id, &registry.features, |_| {
            RwLock::new(FeatureMetadata {
                symbols: vec![symbol],
                force_before: Vec::new(),
            })
        })
    }

    /// Returns a snapshot of the metadata.
    #[must_use]
    pub fn metadata(&self) -> FeatureMetadata {
        self.metadata_slot().read().clone()
    }

    /// Returns the identities this feature carries.
    #[must_use]
    pub fn symbols(&self) -> Vec<FeatureSymbol> {
        self.metadata_slot().read().symbols.clone()
    }

    /// Returns the identities that must come after this feature.
    #[must_use]
    pub fn force_before(&self) -> Vec<FeatureSymbol> {
        self.metadata_slot().read().force_before.clone()
    }

    /// Returns `true` if this feature carries `symbol`.
    #[must_use]
    pub fn carries(&self, symbol: &FeatureSymbol) -> bool {
        self.metadata_slot().read().symbols.contains(symbol)
    }

    /// Adds an identity. Adding one twice has no effect.
    pub fn mark_with(&self, symbol: &FeatureSymbol) {
        let slot = self.metadata_slot();
        let added = core::slice::from_ref(symbol);
        union_symbols(&mut slot.write().symbols, added);
    }

    /// Requires this feature to be positioned before any feature carrying
    /// `symbol`.
    pub fn force_before_symbol(&self, symbol: &FeatureSymbol) {
        let slot = self.metadata_slot();
        let added = core::slice::from_ref(symbol);
        union_symbols(&mut slot.write().force_before, added);
    }

    /// Wraps `target` with this feature, tagging the result with every
    /// identity the feature carries.
    ///
    /// # Errors
    ///
    /// See [`Decor::wrap`].
    pub fn apply(&self, target: &Target) -> FeatureResult<Target> {
        let symbols = self.symbols();
        tracing::trace!(feature = self.name(), %target, "applying feature");
        (self.inner.apply)(target, &symbols)
    }
}

impl PartialEq for Feature {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Feature {}

impl StateOwner for Feature {
    fn owner_id(&self) -> OwnerId {
        self.inner.id
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("name", &self.name())
            .field("metadata", &self.metadata())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Free functions
// ─────────────────────────────────────────────────────────────────────────────

/// Creates a feature applying `decor` with `config`, named after the wrapper.
#[must_use]
pub fn make_feature<W: Wrapper>(decor: &Decor<W>, config: W::Config) -> Feature {
    Feature::new(decor.wrapper().name(), decor, config)
}

/// Adds `symbol` to the identities of `feature`.
pub fn mark_feature_with(feature: &Feature, symbol: &FeatureSymbol) {
    feature.mark_with(symbol);
}

/// Declares that `first` must be positioned before any feature carrying
/// `then`.
///
/// To order against a single feature pass its own symbol, `other.symbol()`,
/// or call [`force_feature_before`]. A symbol shared through
/// [`mark_feature_with`] orders `first` before every feature marked with it.
pub fn force_feature_order(first: &Feature, then: &FeatureSymbol) {
    tracing::debug!(feature = first.name(), before = %then, "feature order constraint added");
    first.force_before_symbol(then);
}

/// Declares that `first` must be positioned before `then`, and before any
/// feature marked with the symbol of `then`.
pub fn force_feature_before(first: &Feature, then: &Feature) {
    force_feature_order(first, then.symbol());
}
