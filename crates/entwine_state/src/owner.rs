//! Identities for anything that can own private state.
//!
//! Classes, instances, callables and features all receive an [`OwnerId`] when
//! they are created. Identity is the only thing the state store needs to know
//! about an owner, so every owner type simply implements [`StateOwner`].

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a state owner.
///
/// Ids are never reused, so a slot keyed by an `OwnerId` can never be observed
/// by a different owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Allocates a fresh identity.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    #[must_use]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// Anything that can own private state slots.
pub trait StateOwner {
    /// Returns the identity under which this owner's slots are stored.
    fn owner_id(&self) -> OwnerId;
}

impl StateOwner for OwnerId {
    fn owner_id(&self) -> OwnerId {
        *self
    }
}
