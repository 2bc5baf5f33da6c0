//! Private per-owner state slots.
//!
//! A slot is the association `(owner, key) -> value`. Slots are created lazily
//! by the key's initializer the first time they are requested, and their
//! presence can be queried without creating them. There is at most one slot
//! per `(owner, key)` pair.
//!
//! # Storage
//!
//! The [`StateStore`] keeps one slot table per owner. Values are type-erased
//! (`Arc<dyn Any + Send + Sync>`) and recovered through the typed
//! [`StateKey`] that created them, so a key can only ever observe the type it
//! was declared with.
//!
//! # Hierarchy fallback
//!
//! Owners such as classes form a hierarchy that the store knows nothing
//! about. [`PrivateState::inherited`] walks a caller-supplied parent relation
//! and returns the first owner that already holds a slot, without creating a
//! slot on any descendant along the way.
//!
//! # Debug exposure
//!
//! When the configuration has `dev_mode` enabled at the moment an owner's slot
//! table is first created, the table is marked as exposed and its keys can be
//! listed through [`StateStore::exposed_keys`]. Tables created while
//! `dev_mode` was off stay hidden, even if `dev_mode` is enabled later.

use core::any::Any;
use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;
use parking_lot::RwLock;

use crate::config::ConfigContext;
use crate::owner::{OwnerId, StateOwner};

// ─────────────────────────────────────────────────────────────────────────────
// MissingStateError
// ─────────────────────────────────────────────────────────────────────────────

/// Returned when a slot is required but was never created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing private state `{key}` on {owner}")]
pub struct MissingStateError {
    /// Display name of the key.
    pub key: String,
    /// The owner that was queried.
    pub owner: OwnerId,
}

// ─────────────────────────────────────────────────────────────────────────────
// StateKey
// ─────────────────────────────────────────────────────────────────────────────

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Typed identity of a slot kind.
///
/// Two keys created with the same name are still distinct.
pub struct StateKey<T> {
    id: u64,
    name: Arc<str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    /// Creates a new, unique key.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: NEXT_KEY.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            _marker: PhantomData,
        }
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for StateKey<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for StateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateKey")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StateStore
// ─────────────────────────────────────────────────────────────────────────────

struct Slot {
    name: Arc<str>,
    value: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct SlotTable {
    slots: HashMap<u64, Slot>,
    exposed: bool,
}

static GLOBAL: LazyLock<Arc<StateStore>> = LazyLock::new(|| Arc::new(StateStore::new()));

/// Container of every owner's slot table.
///
/// The store never holds its lock while an initializer runs, so initializers
/// may freely read or create other slots.
pub struct StateStore {
    tables: RwLock<HashMap<OwnerId, SlotTable>>,
    config: Arc<ConfigContext>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("owners", &self.tables.read().len())
            .finish()
    }
}

impl StateStore {
    /// Creates an empty store reading the global configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ConfigContext::global())
    }

    /// Creates an empty store reading the given configuration.
    #[must_use]
    pub fn with_config(config: Arc<ConfigContext>) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Returns the process-wide store.
    #[must_use]
    pub fn global() -> Arc<StateStore> {
        Arc::clone(&*GLOBAL)
    }

    /// Returns the slot for `(owner, key)`, creating it with `init` if absent.
    pub fn get_or_init<T: Send + Sync + 'static>(
        &self,
        owner: OwnerId,
        key: &StateKey<T>,
        init: impl FnOnce(OwnerId) -> T,
    ) -> Arc<T> {
        if let Some(existing) = self.get(owner, key) {
            return existing;
        }

        let value = Arc::new(init(owner));

        let mut tables = self.tables.write();
        let table = tables.entry(owner).or_insert_with(|| {
            let exposed = self.config.is_dev_mode();
            if exposed {
                tracing::trace!(%owner, "exposing private state table");
            }
            SlotTable {
                slots: HashMap::new(),
                exposed,
            }
        });
        match table.slots.entry(key.id) {
            Entry::Occupied(entry) => downcast(entry.get()).unwrap_or(value),
            Entry::Vacant(entry) => {
                tracing::trace!(%owner, key = %key.name, "private state slot created");
                entry.insert(Slot {
                    name: Arc::clone(&key.name),
                    value: Arc::clone(&value) as Arc<dyn Any + Send + Sync>,
                });
                value
            }
        }
    }

    /// Returns the slot for `(owner, key)` if it exists.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(
        &self,
        owner: OwnerId,
        key: &StateKey<T>,
    ) -> Option<Arc<T>> {
        let tables = self.tables.read();
        let slot = tables.get(&owner)?.slots.get(&key.id)?;
        downcast(slot)
    }

    /// Returns `true` if `(owner, key)` has a slot. Never creates one.
    #[must_use]
    pub fn contains<T>(&self, owner: OwnerId, key: &StateKey<T>) -> bool {
        self.tables
            .read()
            .get(&owner)
            .is_some_and(|table| table.slots.contains_key(&key.id))
    }

    /// Returns the slot for `(owner, key)`.
    ///
    /// # Errors
    ///
    /// Returns [`MissingStateError`] if the slot was never created.
    pub fn get_unsafe<T: Send + Sync + 'static>(
        &self,
        owner: OwnerId,
        key: &StateKey<T>,
    ) -> Result<Arc<T>, MissingStateError> {
        self.get(owner, key).ok_or_else(|| MissingStateError {
            key: key.name().to_owned(),
            owner,
        })
    }

    /// Walks from `start` through `parent_of` and returns the first owner
    /// holding a slot for `key`, together with that slot. Never creates slots.
    pub fn inherited<T: Send + Sync + 'static>(
        &self,
        start: OwnerId,
        key: &StateKey<T>,
        parent_of: impl Fn(OwnerId) -> Option<OwnerId>,
    ) -> Option<(OwnerId, Arc<T>)> {
        let mut current = Some(start);
        while let Some(owner) = current {
            if let Some(slot) = self.get(owner, key) {
                return Some((owner, slot));
            }
            current = parent_of(owner);
        }
        None
    }

    /// Lists the slot keys of `owner` if its table was exposed for debugging.
    #[must_use]
    pub fn exposed_keys(&self, owner: OwnerId) -> Option<Vec<String>> {
        let tables = self.tables.read();
        let table = tables.get(&owner).filter(|table| table.exposed)?;
        let mut keys: Vec<String> = table
            .slots
            .values()
            .map(|slot| slot.name.to_string())
            .collect();
        keys.sort();
        Some(keys)
    }

    /// Drops every slot held by `owner`. Returns `true` if there were any.
    pub fn release(&self, owner: OwnerId) -> bool {
        self.tables.write().remove(&owner).is_some()
    }

    /// Returns the number of owners holding at least one slot.
    #[must_use]
    pub fn owner_count(&self) -> usize {
        self.tables.read().len()
    }
}

/// Recovers the typed value of `slot`.
///
/// Slots are only ever written through the typed key that reads them, so a
/// mismatch means the store itself is broken. It is reported and treated as
/// an absent slot.
fn downcast<T: Send + Sync + 'static>(slot: &Slot) -> Option<Arc<T>> {
    match Arc::clone(&slot.value).downcast::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::error!(key = %slot.name, "private state slot holds an unexpected type");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PrivateState
// ─────────────────────────────────────────────────────────────────────────────

/// A typed key bundled with its initializer and store.
///
/// This is the handle most code uses: declare it once, then call
/// [`get`](Self::get) with any owner.
///
/// # Example
///
/// ```
/// use entwine_state::owner::OwnerId;
/// use entwine_state::state::PrivateState;
///
/// let labels = PrivateState::new("labels", |owner| format!("label for {owner}"));
/// let owner = OwnerId::next();
///
/// assert!(labels.get_unsafe(&owner).is_err());
/// assert_eq!(*labels.get(&owner), format!("label for {owner}"));
/// assert!(labels.get_unsafe(&owner).is_ok());
/// ```
pub struct PrivateState<T> {
    key: StateKey<T>,
    init: Arc<dyn Fn(OwnerId) -> T + Send + Sync>,
    store: Arc<StateStore>,
}

impl<T> Clone for PrivateState<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            init: Arc::clone(&self.init),
            store: Arc::clone(&self.store),
        }
    }
}

impl<T> fmt::Debug for PrivateState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateState")
            .field("key", &self.key)
            .finish()
    }
}

impl<T: Send + Sync + 'static> PrivateState<T> {
    /// Declares a new key in the global store.
    #[must_use]
    pub fn new(
        name: impl Into<Arc<str>>,
        init: impl Fn(OwnerId) -> T + Send + Sync + 'static,
    ) -> Self {
        Self::in_store(StateStore::global(), name, init)
    }

    /// Declares a new key in the given store.
    #[must_use]
    pub fn in_store(
        store: Arc<StateStore>,
        name: impl Into<Arc<str>>,
        init: impl Fn(OwnerId) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: StateKey::new(name),
            init: Arc::new(init),
            store,
        }
    }

    /// Returns the key's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.key.name()
    }

    /// Returns the store this key lives in.
    #[must_use]
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Returns the owner's slot, creating it with the key's initializer.
    pub fn get(&self, owner: &impl StateOwner) -> Arc<T> {
        self.store
            .get_or_init(owner.owner_id(), &self.key, |id| (self.init)(id))
    }

    /// Returns the owner's slot, creating it with `init` instead of the key's
    /// own initializer.
    pub fn get_with(&self, owner: &impl StateOwner, init: impl FnOnce(OwnerId) -> T) -> Arc<T> {
        self.store.get_or_init(owner.owner_id(), &self.key, init)
    }

    /// Returns the owner's slot if it exists.
    #[must_use]
    pub fn try_get(&self, owner: &impl StateOwner) -> Option<Arc<T>> {
        self.store.get(owner.owner_id(), &self.key)
    }

    /// Returns `true` if the owner has a slot. Never creates one.
    #[must_use]
    pub fn has_state(&self, owner: &impl StateOwner) -> bool {
        self.store.contains(owner.owner_id(), &self.key)
    }

    /// Returns the owner's slot.
    ///
    /// # Errors
    ///
    /// Returns [`MissingStateError`] if the slot was never created.
    pub fn get_unsafe(&self, owner: &impl StateOwner) -> Result<Arc<T>, MissingStateError> {
        self.store.get_unsafe(owner.owner_id(), &self.key)
    }

    /// Walks from `start` through `parent_of` and returns the first owner
    /// holding a slot, together with that slot.
    pub fn inherited(
        &self,
        start: OwnerId,
        parent_of: impl Fn(OwnerId) -> Option<OwnerId>,
    ) -> Option<(OwnerId, Arc<T>)> {
        self.store.inherited(start, &self.key, parent_of)
    }

    /// Like [`inherited`](Self::inherited), but fails when no owner in the
    /// chain holds a slot.
    ///
    /// # Errors
    ///
    /// Returns [`MissingStateError`] naming `start`.
    pub fn inherited_unsafe(
        &self,
        start: OwnerId,
        parent_of: impl Fn(OwnerId) -> Option<OwnerId>,
    ) -> Result<(OwnerId, Arc<T>), MissingStateError> {
        self.inherited(start, parent_of).ok_or_else(|| MissingStateError {
            key: self.key.name().to_owned(),
            owner: start,
        })
    }
}

/// Declares a new key with an initializer in the global store.
///
/// Shorthand for [`PrivateState::new`].
#[must_use]
pub fn state<T: Send + Sync + 'static>(
    name: impl Into<Arc<str>>,
    init: impl Fn(OwnerId) -> T + Send + Sync + 'static,
) -> PrivateState<T> {
    PrivateState::new(name, init)
}
