//! Wrap targets and feature identities.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use entwine_hooks::callable::Callable;
use entwine_hooks::class::ClassId;
use entwine_state::owner::{OwnerId, StateOwner};

// ─────────────────────────────────────────────────────────────────────────────
// Target
// ─────────────────────────────────────────────────────────────────────────────

/// Something a wrapper can decorate.
///
/// Targets compare by identity: two `Function` targets are equal only if
/// they hold the same callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A registered class.
    Class(ClassId),
    /// A free function.
    Function(Callable),
}

impl Target {
    /// Returns the class, if this is a class target.
    #[must_use]
    pub fn as_class(&self) -> Option<ClassId> {
        match self {
            Self::Class(class) => Some(*class),
            Self::Function(_) => None,
        }
    }

    /// Returns the callable, if this is a function target.
    #[must_use]
    pub fn as_function(&self) -> Option<&Callable> {
        match self {
            Self::Class(_) => None,
            Self::Function(callable) => Some(callable),
        }
    }
}

impl StateOwner for Target {
    fn owner_id(&self) -> OwnerId {
        match self {
            Self::Class(class) => class.owner_id(),
            Self::Function(callable) => callable.owner_id(),
        }
    }
}

impl From<ClassId> for Target {
    fn from(class: ClassId) -> Self {
        Self::Class(class)
    }
}

impl From<Callable> for Target {
    fn from(callable: Callable) -> Self {
        Self::Function(callable)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(class) => write!(f, "{class}"),
            Self::Function(callable) => write!(f, "function `{}`", callable.name()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FeatureSymbol
// ─────────────────────────────────────────────────────────────────────────────

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// An identity a feature can carry.
///
/// Every feature owns one symbol and may be marked with more. Ordering
/// constraints and [`is_decorated`](crate::registry::FeatureRegistry::is_decorated)
/// queries refer to symbols rather than to features. Two symbols created with
/// the same name are distinct.
#[derive(Clone)]
pub struct FeatureSymbol {
    id: u64,
    name: Arc<str>,
}

impl FeatureSymbol {
    /// Creates a new, unique symbol.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
        }
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for FeatureSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FeatureSymbol {}

impl core::hash::Hash for FeatureSymbol {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for FeatureSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeatureSymbol({}#{})", self.name, self.id)
    }
}

impl fmt::Display for FeatureSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Appends the symbols of `extra` that `symbols` does not hold yet.
pub(crate) fn union_symbols(symbols: &mut Vec<FeatureSymbol>, extra: &[FeatureSymbol]) {
    for symbol in extra {
        if !symbols.contains(symbol) {
            symbols.push(symbol.clone());
        }
    }
}
