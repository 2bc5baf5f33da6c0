//! Copy-on-write configuration context.
//!
//! The configuration is only ever read by diagnostic paths (chain-break
//! warnings, forgotten-return warnings, debug exposure of state tables). It
//! never changes the control flow of a hook chain.
//!
//! Every write produces a brand new immutable snapshot, so a reader holding an
//! `Arc<Config>` never observes a partially applied update. Temporary
//! overrides go through [`ConfigGuard`], which restores the previous snapshot
//! when dropped, including while unwinding from a panic.
//!
//! # Example
//!
//! ```
//! use entwine_state::config::ConfigContext;
//! use serde_json::json;
//!
//! let ctx = ConfigContext::new();
//! assert!(!ctx.is_dev_mode());
//!
//! let inside = ctx
//!     .run_with(json!({ "dev_mode": true }), || ctx.is_dev_mode())
//!     .unwrap();
//!
//! assert!(inside);
//! assert!(!ctx.is_dev_mode());
//! ```

use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

/// An immutable configuration snapshot.
///
/// `dev_mode` enables the diagnostic bookkeeping of the hook chains. Any other
/// key is kept in [`extensions`](Self::extensions) for collaborators that
/// piggyback on the same configuration object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enables development diagnostics.
    pub dev_mode: bool,
    /// Keys owned by collaborators.
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl Config {
    /// Returns a configuration with `dev_mode` enabled.
    #[must_use]
    pub fn dev() -> Self {
        Self {
            dev_mode: true,
            ..Self::default()
        }
    }

    /// Returns a collaborator key.
    #[must_use]
    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }
}

/// Errors produced while applying a configuration patch.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The patch was not a JSON object.
    #[error("configuration patch must be a JSON object, got {0}")]
    NotAnObject(String),

    /// The merged configuration could not be (de)serialized.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// ConfigContext
// ─────────────────────────────────────────────────────────────────────────────

static GLOBAL: LazyLock<Arc<ConfigContext>> = LazyLock::new(|| Arc::new(ConfigContext::new()));

/// Holder of the current configuration snapshot.
///
/// Components that emit diagnostics take an `Arc<ConfigContext>` so tests (or
/// embedders) can inject an isolated context. [`ConfigContext::global`] is the
/// process-wide default.
#[derive(Debug, Default)]
pub struct ConfigContext {
    current: RwLock<Arc<Config>>,
}

impl ConfigContext {
    /// Creates a context holding the default (production) configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a context holding the given configuration.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Returns the process-wide context.
    #[must_use]
    pub fn global() -> Arc<ConfigContext> {
        Arc::clone(&*GLOBAL)
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn get(&self) -> Arc<Config> {
        self.current.read().clone()
    }

    /// Shorthand for `self.get().dev_mode`.
    #[must_use]
    pub fn is_dev_mode(&self) -> bool {
        self.current.read().dev_mode
    }

    /// Deep-merges `partial` into the current configuration.
    ///
    /// Nested objects are merged key by key; any other value replaces the
    /// previous one. Returns the new snapshot.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NotAnObject`] if `partial` is not a JSON object
    /// - [`ConfigError::Invalid`] if the merged value is not a valid [`Config`]
    pub fn set(&self, partial: Value) -> Result<Arc<Config>, ConfigError> {
        if !partial.is_object() {
            return Err(ConfigError::NotAnObject(partial.to_string()));
        }

        let mut current = self.current.write();
        let mut merged = serde_json::to_value(&**current)?;
        deep_merge(&mut merged, partial);
        let next = Arc::new(serde_json::from_value::<Config>(merged)?);
        *current = Arc::clone(&next);

        tracing::debug!(dev_mode = next.dev_mode, "configuration updated");
        Ok(next)
    }

    /// Replaces the whole configuration, returning the previous snapshot.
    pub fn override_with(&self, full: Config) -> Arc<Config> {
        let next = Arc::new(full);
        core::mem::replace(&mut *self.current.write(), next)
    }

    /// Applies `partial` until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set); on error the configuration is unchanged.
    pub fn scoped(&self, partial: Value) -> Result<ConfigGuard<'_>, ConfigError> {
        let previous = self.get();
        self.set(partial)?;
        Ok(ConfigGuard {
            ctx: self,
            previous: Some(previous),
        })
    }

    /// Runs `f` with `partial` applied, restoring the previous configuration
    /// afterwards on every exit path.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set); `f` is not run when the patch is rejected.
    pub fn run_with<R>(&self, partial: Value, f: impl FnOnce() -> R) -> Result<R, ConfigError> {
        let _guard = self.scoped(partial)?;
        Ok(f())
    }
}

/// Restores a previous configuration snapshot when dropped.
#[must_use = "the override is reverted as soon as the guard is dropped"]
pub struct ConfigGuard<'a> {
    ctx: &'a ConfigContext,
    previous: Option<Arc<Config>>,
}

impl Drop for ConfigGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.ctx.current.write() = previous;
        }
    }
}

fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Global shorthands
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current snapshot of the global context.
#[must_use]
pub fn get_config() -> Arc<Config> {
    GLOBAL.get()
}

/// Deep-merges `partial` into the global configuration.
///
/// # Errors
///
/// See [`ConfigContext::set`].
pub fn set_config(partial: Value) -> Result<Arc<Config>, ConfigError> {
    GLOBAL.set(partial)
}

/// Replaces the global configuration, returning the previous snapshot.
pub fn override_config(full: Config) -> Arc<Config> {
    GLOBAL.override_with(full)
}

/// Runs `f` with `partial` applied to the global configuration.
///
/// # Errors
///
/// See [`ConfigContext::run_with`].
pub fn run_with_config<R>(partial: Value, f: impl FnOnce() -> R) -> Result<R, ConfigError> {
    GLOBAL.run_with(partial, f)
}
