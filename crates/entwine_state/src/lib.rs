//! Owner-keyed private state and configuration for entwine (Layer 0).
//!
//! `entwine_state` is the leaf of the entwine workspace. Everything above it
//! (hook chains, the class hook registry, the feature layer) keeps its
//! metadata in the primitives defined here:
//!
//! - [`owner`] - Identities for anything that can own private state
//! - [`state`] - Per-owner, per-key slots with hierarchy fallback lookup
//! - [`config`] - The copy-on-write configuration context that gates diagnostics
//!
//! # Architecture
//!
//! - **Layer 0** (`entwine_state`): state slots and configuration (this crate)
//! - **Layer 1** (`entwine_hooks`): hook chains and the class hook registry
//! - **Layer 2** (`entwine_feature`): feature wrapping and ordering
//!
//! # Example
//!
//! ```
//! use entwine_state::owner::OwnerId;
//! use entwine_state::state::PrivateState;
//! use parking_lot::Mutex;
//!
//! let counter = PrivateState::new("counter", |_owner| Mutex::new(0_u32));
//! let owner = OwnerId::next();
//!
//! assert!(!counter.has_state(&owner));
//! *counter.get(&owner).lock() += 1;
//! assert!(counter.has_state(&owner));
//! assert_eq!(*counter.get(&owner).lock(), 1);
//! ```

/// Identities for state owners.
pub mod owner;

/// Private per-owner state slots.
pub mod state;

/// Process-wide configuration context.
pub mod config;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::config::{
        Config, ConfigContext, ConfigError, ConfigGuard, get_config, override_config,
        run_with_config, set_config,
    };
    pub use crate::owner::{OwnerId, StateOwner};
    pub use crate::state::{MissingStateError, PrivateState, StateKey, StateStore, state};
}
