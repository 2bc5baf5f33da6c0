//! Example scenarios built with entwine.
//!
//! Three small pieces of behavior composed the way an application would:
//!
//! - [`increment_answer`]: a free function wrapped with one before hook and one
//!   after hook
//! - [`Demo::styled_button`]: a class decorated by two independently authored
//!   features, ordered with a constraint
//! - [`Demo::cached_greeting`]: a middleware that answers from a cache and
//!   never calls `next`, which dev mode reports
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │  decorate(Button, [theme, a11y])                      │
//! │                                                       │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────┐   │
//! │  │ a11y (outer) │──▶│ theme        │──▶│ Button   │   │
//! │  │ after: aria  │   │ before: class│   │ render() │   │
//! │  └──────────────┘   └──────────────┘   └──────────┘   │
//! └───────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use entwine_feature::prelude::*;
use entwine_hooks::prelude::*;
use entwine_state::config::ConfigContext;
use parking_lot::Mutex;

/// Runs the end-to-end scenario: `f(1)` where `f` returns 42 and is wrapped
/// with `args => [args[0] + 1]` and `r => r + 1`.
///
/// Returns the arguments the base implementation saw and the final result.
///
/// # Errors
///
/// Propagates any hook error.
pub fn increment_answer(config: Arc<ConfigContext>) -> HookResult<(Args, Value)> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_base = Arc::clone(&seen);
    let base = Callable::from_fn("answer", move |args| {
        *seen_by_base.lock() = args;
        Ok(json!(42))
    });

    let increment_arg = BeforeHook::new(|args| {
        let n = args[0].as_i64().unwrap_or(0);
        Ok(json!([n + 1]))
    })
    .named("increment_arg");
    let increment_result = AfterHook::new(|r| Ok(json!(r.as_i64().unwrap_or(0) + 1)))
        .named("increment_result");
    let hooks = HookSet::new().before(increment_arg).after(increment_result);
    let wrapped = wrap_with(config, &base, hooks);

    let result = wrapped.invoke(vec![json!(1)])?;
    let seen = seen.lock().clone();
    Ok((seen, result))
}

/// Registries and features shared by the class and cache scenarios.
#[derive(Debug)]
pub struct Demo {
    features: FeatureRegistry,
    classes: ClassRegistry,
    button: ClassId,
}

impl Demo {
    /// Defines the `Button` class in fresh registries reading `config`.
    ///
    /// # Errors
    ///
    /// Propagates class registration errors.
    pub fn new(config: Arc<ConfigContext>) -> HookResult<Self> {
        let classes = ClassRegistry::with_config(Arc::clone(&config));
        let button = classes.define(
            ClassDef::new("Button")
                .constructor(|this, args| {
                    let label = args.first().cloned().unwrap_or_else(|| json!("button"));
                    this.set_field("label", label);
                    Ok(())
                })
                .method("render", |this, args| {
                    let class = args.first().and_then(Value::as_str).unwrap_or("plain");
                    let label = this.get_field("label").unwrap_or(Value::Null);
                    Ok(json!(format!(
                        "<button class=\"{class}\">{}</button>",
                        label.as_str().unwrap_or_default()
                    )))
                }),
        )?;

        Ok(Self {
            features: FeatureRegistry::with_config(config),
            classes,
            button,
        })
    }

    /// Returns the feature registry.
    #[must_use]
    pub fn features(&self) -> &FeatureRegistry {
        &self.features
    }

    /// Returns the class registry.
    #[must_use]
    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// Returns the undecorated `Button` class.
    #[must_use]
    pub fn button(&self) -> ClassId {
        self.button
    }

    /// Decorates `Button` with a theme feature and an accessibility feature
    /// that must wrap it, then renders an instance labelled `label`.
    ///
    /// # Errors
    ///
    /// Propagates wrapping and hook errors.
    pub fn styled_button(&self, label: &str) -> FeatureResult<(Target, Value)> {
        let theme_class = BeforeHook::new(|_args| Ok(json!(["primary"])))
            .named("theme_class");
        let theme = make_feature(
            &ClassDecor::decor(&self.features, &self.classes),
            ClassHooks::new().method("render", theme_class),
        );
        let a11y = make_feature(
            &ClassDecor::decor(&self.features, &self.classes),
            ClassHooks::new()
                .constructor(
                    ConstructorHook::new(|this, _args| {
                        this.set_field("role", json!("button"));
                        Ok(())
                    })
                    .named("aria_role"),
                )
                .method(
                    "render",
                    AfterHook::with_receiver(|this, r| {
                        let role = this
                            .and_then(|this| this.get_field("role"))
                            .and_then(|role| role.as_str().map(str::to_owned))
                            .unwrap_or_default();
                        let html = r.as_str().unwrap_or_default();
                        let attribute = format!("<button role=\"{role}\"");
                        Ok(json!(html.replacen("<button", &attribute, 1)))
                    })
                    .named("aria_attributes"),
                ),
        );
        force_feature_order(&a11y, theme.symbol());

        let styled = decorate(&Target::from(self.button), &[a11y, theme])?;
        let class = styled.as_class().ok_or_else(|| {
            FeatureError::UnexpectedWrapState("class decor returned a function".into())
        })?;
        let instance = self.classes.instantiate(class, vec![json!(label)])?;
        let html = instance.call("render", vec![])?;
        Ok((styled, html))
    }

    /// Wraps a greeting function with a cache middleware that answers known
    /// names without calling `next`, and greets `name`.
    ///
    /// # Errors
    ///
    /// Propagates wrapping and hook errors.
    pub fn cached_greeting(&self, name: &str) -> FeatureResult<Value> {
        let greet = Callable::from_fn("greet", |args| {
            Ok(json!(format!(
                "hello, {}",
                args.first().and_then(Value::as_str).unwrap_or("stranger")
            )))
        });
        let cache = MiddlewareHook::new(|args, next: Next<'_>| {
            if args.first().and_then(Value::as_str) == Some("admin") {
                return Ok(json!("welcome back"));
            }
            next.run(args)
        })
        .named("greeting_cache");

        let decor = FunctionDecor::decor(&self.features);
        let hooks = HookSet::new().middleware(cache);
        let wrapped = decor.wrap(&Target::from(greet), hooks, &[])?;
        let callable = wrapped.as_function().ok_or_else(|| {
            FeatureError::UnexpectedWrapState("function decor returned a class".into())
        })?;
        Ok(callable.invoke(vec![json!(name)])?)
    }
}
