//! Hook chain composition.
//!
//! [`compose`] turns a base callable and a [`HookSet`] into one wrapped
//! callable. Invoking the result runs three stages:
//!
//! 1. every before hook, in order, each returning the next argument array
//! 2. the middleware onion (or the base directly when there is none)
//! 3. every after hook, in order, each returning the next result
//!
//! Any error aborts the remaining stages and is returned unchanged.
//!
//! # Diagnostics
//!
//! With `dev_mode` enabled, the chain additionally warns when a middleware
//! returned without calling [`Next::run`] and when an after hook turned a
//! defined result into `null`. Neither warning changes the result.
//!
//! # Re-wrapping
//!
//! [`wrap`] recognizes callables it produced: wrapping one again merges the
//! hook sets onto the original callable instead of nesting another layer.

use core::cell::Cell;
use std::sync::Arc;

use entwine_state::config::ConfigContext;

use crate::callable::{Callable, WrappedFrom};
use crate::class::Instance;
use crate::error::{HookError, HookResult};
use crate::hook::{HookSet, MiddlewareHook};
use crate::value::{Args, Value, describe};

// ─────────────────────────────────────────────────────────────────────────────
// Next
// ─────────────────────────────────────────────────────────────────────────────

/// Records the deepest stage that received control during one call.
#[derive(Debug, Default)]
struct ChainTracker {
    highest: Cell<Option<usize>>,
}

impl ChainTracker {
    fn reached(&self, index: usize) {
        if self.highest.get().is_none_or(|highest| index > highest) {
            self.highest.set(Some(index));
        }
    }

    /// Warns if the onion stopped before reaching the hooked callable.
    ///
    /// The hooked callable counts as stage `chain.len()`.
    fn report(&self, chain: &[MiddlewareHook], target: &str) {
        let Some(highest) = self.highest.get() else {
            return;
        };
        if let Some(stopper) = chain.get(highest) {
            tracing::warn!(
                middleware = stopper.name(),
                callable = target,
                reached = highest + 1,
                total = chain.len(),
                "middleware did not call next; the rest of the chain was skipped"
            );
        }
    }
}

/// Continuation handed to a middleware.
///
/// Calling [`run`](Self::run) invokes the next middleware, or the hooked
/// callable once every middleware has been entered. Not calling it
/// short-circuits the rest of the onion.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    this: Option<&'a Instance>,
    chain: &'a [MiddlewareHook],
    index: usize,
    base: &'a Callable,
    tracker: Option<&'a ChainTracker>,
}

impl<'a> Next<'a> {
    /// Runs the inner stages with `args`.
    ///
    /// # Errors
    ///
    /// Propagates the error of any inner middleware or of the hooked
    /// callable.
    pub fn run(self, args: Args) -> HookResult<Value> {
        if let Some(tracker) = self.tracker {
            tracker.reached(self.index);
        }
        let Some(middleware) = self.chain.get(self.index) else {
            return self.base.call(self.this, args);
        };
        let next = Next {
            index: self.index + 1,
            ..self
        };
        middleware.call(args, next)
    }

    /// Returns the receiver of the hooked call, if any.
    #[must_use]
    pub fn receiver(&self) -> Option<&'a Instance> {
        self.this
    }

    /// Returns the name of the hooked callable.
    #[must_use]
    pub fn target(&self) -> &'a str {
        self.base.name()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Composition
// ─────────────────────────────────────────────────────────────────────────────

/// Composes `hooks` around `base`, reading diagnostics settings from the
/// global configuration.
#[must_use]
pub fn compose(base: &Callable, hooks: HookSet) -> Callable {
    compose_with(ConfigContext::global(), base, hooks)
}

/// Composes `hooks` around `base`.
///
/// The result keeps the name and the properties of `base`, and remembers both
/// `base` and `hooks` for [`unwrap`] and [`hooks`].
///
/// `dev_mode` is read on every invocation, so toggling it affects callables
/// that were composed earlier.
#[must_use]
pub fn compose_with(config: Arc<ConfigContext>, base: &Callable, hooks: HookSet) -> Callable {
    let name = base.shared_name();
    let properties = base.shared_properties();
    let set = Arc::new(hooks.clone());
    let inner = base.clone();
    let target = Arc::clone(&name);

    let body = move |this: Option<&Instance>, args: Args| -> HookResult<Value> {
        run_chain(&config, &set, &inner, &target, this, args)
    };

    Callable::wrapping(
        name,
        Arc::new(body),
        properties,
        WrappedFrom {
            original: base.clone(),
            hooks,
        },
    )
}

fn run_chain(
    config: &ConfigContext,
    set: &HookSet,
    base: &Callable,
    target: &str,
    this: Option<&Instance>,
    mut args: Args,
) -> HookResult<Value> {
    let dev_mode = config.is_dev_mode();

    for hook in &set.before {
        args = match hook.call(this, args)? {
            Value::Array(next) => next,
            other => {
                return Err(HookError::InvalidBeforeResult {
                    hook: hook.name().to_owned(),
                    target: target.to_owned(),
                    value: describe(&other),
                });
            }
        };
    }

    let mut result = if set.middleware.is_empty() {
        base.call(this, args)?
    } else {
        let tracker = dev_mode.then(ChainTracker::default);
        let next = Next {
            this,
            chain: &set.middleware,
            index: 0,
            base,
            tracker: tracker.as_ref(),
        };
        let result = next.run(args)?;
        if let Some(tracker) = &tracker {
            tracker.report(&set.middleware, target);
        }
        result
    };

    for hook in &set.after {
        let was_defined = !result.is_null();
        result = hook.call(this, result)?;
        if dev_mode && was_defined && result.is_null() {
            tracing::warn!(
                hook = hook.name(),
                callable = target,
                "after hook returned null for a defined result; did it forget to return?"
            );
        }
    }

    Ok(result)
}

// ─────────────────────────────────────────────────────────────────────────────
// Function wrapping
// ─────────────────────────────────────────────────────────────────────────────

/// Wraps `base` with `hooks`, merging into an existing wrap instead of
/// nesting. Reads diagnostics settings from the global configuration.
///
/// # Example
///
/// ```
/// use entwine_hooks::callable::Callable;
/// use entwine_hooks::chain::{unwrap, wrap};
/// use entwine_hooks::hook::{AfterHook, BeforeHook, HookSet};
/// use entwine_hooks::value::{Value, json};
///
/// let base = Callable::from_fn("answer", |_| Ok(json!(42)));
/// let wrapped = wrap(
///     &base,
///     HookSet::new()
///         .before(BeforeHook::new(|args| Ok(Value::Array(args))))
///         .after(AfterHook::new(|r| Ok(json!(r.as_i64().unwrap_or(0) + 1)))),
/// );
///
/// assert_eq!(wrapped.invoke(vec![]).unwrap(), json!(43));
/// assert_eq!(unwrap(&wrapped), Some(base));
/// ```
#[must_use]
pub fn wrap(base: &Callable, hooks: HookSet) -> Callable {
    wrap_with(ConfigContext::global(), base, hooks)
}

/// Like [`wrap`], with an explicit configuration context.
#[must_use]
pub fn wrap_with(config: Arc<ConfigContext>, base: &Callable, hooks: HookSet) -> Callable {
    match base.wrapped_from() {
        Some(from) => {
            let merged = from.hooks.merge(&hooks);
            tracing::debug!(
                callable = base.name(),
                hooks = merged.len(),
                "merging hooks into existing wrap"
            );
            compose_with(config, &from.original, merged)
        }
        None => compose_with(config, base, hooks),
    }
}

/// Returns the callable `f` was composed from, or `None` if `f` is not
/// wrapped.
#[must_use]
pub fn unwrap(f: &Callable) -> Option<Callable> {
    f.wrapped_from().map(|from| from.original.clone())
}

/// Returns the hook set `f` was composed with, or `None` if `f` is not
/// wrapped.
#[must_use]
pub fn hooks(f: &Callable) -> Option<HookSet> {
    f.wrapped_from().map(|from| from.hooks.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::{AfterHook, BeforeHook};
    use crate::value::json;
    use entwine_state::config::Config;
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    fn production() -> Arc<ConfigContext> {
        Arc::new(ConfigContext::new())
    }

    fn dev() -> Arc<ConfigContext> {
        Arc::new(ConfigContext::with_config(Config::dev()))
    }

    fn recording(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> (BeforeHook, AfterHook) {
        let before_log = Arc::clone(log);
        let after_log = Arc::clone(log);
        (
            BeforeHook::new(move |args| {
                before_log.lock().push(format!("b{label}"));
                Ok(Value::Array(args))
            }),
            AfterHook::new(move |r| {
                after_log.lock().push(format!("a{label}"));
                Ok(r)
            }),
        )
    }

    #[test]
    fn stages_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let base_log = Arc::clone(&log);
        let base = Callable::from_fn("base", move |_| {
            base_log.lock().push("base".to_owned());
            Ok(Value::Null)
        });
        let (b1, a1) = recording(&log, "1");
        let (b2, a2) = recording(&log, "2");

        let wrapped = compose_with(
            production(),
            &base,
            HookSet::new().before(b1).before(b2).after(a1).after(a2),
        );
        wrapped.invoke(Vec::new()).unwrap();

        assert_eq!(*log.lock(), vec!["b1", "b2", "base", "a1", "a2"]);
    }

    #[test]
    fn middleware_wraps_like_an_onion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outer_log = Arc::clone(&log);
        let inner_log = Arc::clone(&log);
        let outer = MiddlewareHook::new(move |args, next| {
            outer_log.lock().push("outer>");
            let r = next.run(args);
            outer_log.lock().push("<outer");
            r
        });
        let inner = MiddlewareHook::new(move |args, next| {
            inner_log.lock().push("inner>");
            let r = next.run(args);
            inner_log.lock().push("<inner");
            r
        });
        let base = Callable::from_fn("base", |args| Ok(json!(args.len())));

        let wrapped = compose_with(
            production(),
            &base,
            HookSet::new().middleware(outer).middleware(inner),
        );

        assert_eq!(wrapped.invoke(vec![json!(1), json!(2)]).unwrap(), json!(2));
        assert_eq!(*log.lock(), vec!["outer>", "inner>", "<inner", "<outer"]);
    }

    #[test]
    fn middleware_can_rewrite_arguments() {
        let base = Callable::from_fn("sum", |args| {
            Ok(json!(args.iter().filter_map(Value::as_i64).sum::<i64>()))
        });
        let doubler = MiddlewareHook::new(|args, next| {
            let doubled: Args = args
                .into_iter()
                .map(|v| json!(v.as_i64().unwrap_or(0) * 2))
                .collect();
            next.run(doubled)
        });

        let wrapped = compose_with(production(), &base, HookSet::new().middleware(doubler));
        assert_eq!(wrapped.invoke(vec![json!(1), json!(2)]).unwrap(), json!(6));
    }

    #[test]
    fn non_array_before_result_fails_before_base() {
        let called = Arc::new(Mutex::new(false));
        let called_clone = Arc::clone(&called);
        let base = Callable::from_fn("render", move |_| {
            *called_clone.lock() = true;
            Ok(Value::Null)
        });
        let bad = BeforeHook::new(|_| Ok(json!("not an array"))).named("bad");

        let wrapped = compose_with(production(), &base, HookSet::new().before(bad));
        let err = wrapped.invoke(Vec::new()).unwrap_err();

        match err {
            HookError::InvalidBeforeResult { hook, target, value } => {
                assert_eq!(hook, "bad");
                assert_eq!(target, "render");
                assert_eq!(value, "\"not an array\"");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!*called.lock());
    }

    #[test]
    fn errors_abort_pending_after_hooks() {
        let ran = Arc::new(Mutex::new(false));
        let ran_clone = Arc::clone(&ran);
        let base = Callable::from_fn("boom", |_| Err(HookError::msg("kaput")));
        let after = AfterHook::new(move |r| {
            *ran_clone.lock() = true;
            Ok(r)
        });

        let wrapped = compose_with(production(), &base, HookSet::new().after(after));
        let err = wrapped.invoke(Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "kaput");
        assert!(!*ran.lock());
    }

    #[test]
    fn wrapped_keeps_name_and_properties() {
        let base = Callable::noop("styled")
            .with_property("display_name", json!("Styled"));
        let wrapped = compose_with(production(), &base, HookSet::new());

        assert_eq!(wrapped.name(), "styled");
        assert_eq!(wrapped.property("display_name"), Some(&json!("Styled")));
        assert_ne!(wrapped, base);
    }

    #[test]
    fn rewrap_merges_instead_of_nesting() {
        let base = Callable::from_fn("n", |args| Ok(args[0].clone()));
        let inc = AfterHook::new(|r| Ok(json!(r.as_i64().unwrap_or(0) + 1)));
        let dbl = AfterHook::new(|r| Ok(json!(r.as_i64().unwrap_or(0) * 2)));

        let once = wrap_with(production(), &base, HookSet::new().after(inc.clone()));
        let twice = wrap_with(production(), &once, HookSet::new().after(dbl.clone()));

        assert_eq!(unwrap(&twice), Some(base));
        assert_eq!(hooks(&twice).unwrap().after, vec![inc, dbl]);
        assert_eq!(twice.invoke(vec![json!(3)]).unwrap(), json!(8));
    }

    #[test]
    fn unwrap_and_hooks_on_plain_callable() {
        let plain = Callable::noop("plain");
        assert!(unwrap(&plain).is_none());
        assert!(hooks(&plain).is_none());
    }

    #[traced_test]
    #[test]
    fn dev_mode_warns_on_chain_break() {
        let stopper = MiddlewareHook::new(|_args, _next| Ok(json!("cached")))
            .named("cache");
        let skipped = MiddlewareHook::new(|args, next| next.run(args))
            .named("skipped");
        let base = Callable::from_fn("load", |_| Ok(json!("fresh")));

        let wrapped = compose_with(
            dev(),
            &base,
            HookSet::new().middleware(stopper).middleware(skipped),
        );

        assert_eq!(wrapped.invoke(Vec::new()).unwrap(), json!("cached"));
        assert!(logs_contain("middleware did not call next"));
        assert!(logs_contain("cache"));
        assert!(logs_contain("load"));
    }

    #[traced_test]
    #[test]
    fn dev_mode_warns_when_last_middleware_skips_base() {
        let passthrough = MiddlewareHook::new(|args, next| next.run(args));
        let last = MiddlewareHook::new(|_args, _next| Ok(Value::Null))
            .named("terminal");
        let base = Callable::noop("never_called");

        let wrapped = compose_with(
            dev(),
            &base,
            HookSet::new().middleware(passthrough).middleware(last),
        );

        wrapped.invoke(Vec::new()).unwrap();
        assert!(logs_contain("terminal"));
    }

    #[traced_test]
    #[test]
    fn dev_mode_is_silent_for_complete_chain() {
        let base = Callable::noop("complete");
        let wrapped = compose_with(
            dev(),
            &base,
            HookSet::new()
                .middleware(MiddlewareHook::new(|args, next| next.run(args))),
        );

        wrapped.invoke(Vec::new()).unwrap();
        assert!(!logs_contain("middleware did not call next"));
    }

    #[traced_test]
    #[test]
    fn production_mode_does_not_track_chain() {
        let stopper = MiddlewareHook::new(|_args, _next| Ok(json!(1)));
        let base = Callable::noop("quiet");
        let wrapped = compose_with(
            production(),
            &base,
            HookSet::new()
                .middleware(stopper)
                .middleware(MiddlewareHook::new(|args, next| next.run(args))),
        );

        wrapped.invoke(Vec::new()).unwrap();
        assert!(!logs_contain("middleware did not call next"));
    }

    #[traced_test]
    #[test]
    fn dev_mode_warns_when_after_hook_drops_result() {
        let base = Callable::from_fn("compute", |_| Ok(json!(5)));
        let forgetful = AfterHook::new(|_r| Ok(Value::Null)).named("forgetful");

        let wrapped = compose_with(dev(), &base, HookSet::new().after(forgetful));

        assert_eq!(wrapped.invoke(Vec::new()).unwrap(), Value::Null);
        assert!(logs_contain("did it forget to return"));
        assert!(logs_contain("forgetful"));
    }
}
