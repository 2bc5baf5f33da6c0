//! Integration tests for composing features on functions and classes.

use std::sync::Arc;

use entwine_feature::prelude::*;
use entwine_hooks::prelude::*;
use entwine_state::config::ConfigContext;
use parking_lot::Mutex;

fn registry() -> FeatureRegistry {
    FeatureRegistry::with_config(Arc::new(ConfigContext::new()))
}

type Log = Arc<Mutex<Vec<String>>>;

fn tag_after(log: &Log, tag: &'static str) -> AfterHook {
    let log = Arc::clone(log);
    AfterHook::new(move |r| {
        log.lock().push(tag.to_owned());
        Ok(r)
    })
    .named(tag)
}

/// A function decor with its own identity, so its wraps nest rather than merge.
fn fresh_decor(registry: &FeatureRegistry) -> Decor<FunctionDecor> {
    FunctionDecor::decor(registry)
}

fn answer() -> Target {
    Target::from(Callable::from_fn("answer", |_| Ok(json!(42))))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Idempotent re-wrap
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn applying_a_feature_twice_does_not_nest() {
    let registry = registry();
    let decor = FunctionDecor::decor(&registry);
    let log = Log::default();
    let config = HookSet::new().after(tag_after(&log, "audit"));
    let feature = make_feature(&decor, config.clone());
    let base = answer();

    let once = feature.apply(&base).unwrap();
    let twice = feature.apply(&once).unwrap();

    assert_eq!(registry.get_original(&twice), Some(base.clone()));
    assert_eq!(
        decor.config_of(&twice).unwrap(),
        Some(decor.wrapper().merge(&config, &config))
    );
    let f = twice.as_function().unwrap();
    assert_eq!(f.invoke(vec![]).unwrap(), json!(42));
    assert_eq!(*log.lock(), vec!["audit"]);
}

#[test]
fn get_decorated_follows_latest_wrap() {
    let registry = registry();
    let feature = make_feature(&FunctionDecor::decor(&registry), HookSet::new());
    let base = answer();

    let once = feature.apply(&base).unwrap();
    assert_eq!(registry.get_decorated(&base), Some(once.clone()));

    let twice = feature.apply(&once).unwrap();
    assert_eq!(registry.get_decorated(&base), Some(twice));
    assert_eq!(registry.get_decorated(&answer()), None);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Identity
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn is_decorated_checks_any_or_specific_symbol() {
    let registry = registry();
    let decor = FunctionDecor::decor(&registry);
    let styled = make_feature(&decor, HookSet::new());
    let unrelated = make_feature(&decor, HookSet::new());
    let base = answer();

    let wrapped = styled.apply(&base).unwrap();

    assert!(registry.is_decorated(&wrapped, None));
    assert!(registry.is_decorated(&wrapped, Some(styled.symbol())));
    assert!(!registry.is_decorated(&wrapped, Some(unrelated.symbol())));
    assert!(!registry.is_decorated(&base, None));
}

#[test]
fn marked_symbols_are_recorded_on_the_result() {
    let registry = registry();
    let group = FeatureSymbol::new("styling");
    let feature = make_feature(&FunctionDecor::decor(&registry), HookSet::new());
    mark_feature_with(&feature, &group);

    let wrapped = feature.apply(&answer()).unwrap();

    assert!(registry.is_decorated(&wrapped, Some(&group)));
    assert_eq!(
        registry.symbols_of(&wrapped),
        vec![feature.symbol().clone(), group]
    );
}

#[test]
fn registries_do_not_share_metadata() {
    let first = registry();
    let second = registry();
    let feature = make_feature(&FunctionDecor::decor(&first), HookSet::new());

    let wrapped = feature.apply(&answer()).unwrap();

    assert!(first.is_decorated(&wrapped, None));
    assert!(!second.is_decorated(&wrapped, None));
}

// ═══════════════════════════════════════════════════════════════════════════════
// Ordering
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn forced_feature_runs_outside() {
    let registry = registry();
    let log = Log::default();
    let metrics = make_feature(
        &fresh_decor(&registry),
        HookSet::new().after(tag_after(&log, "metrics")),
    );
    let cache = make_feature(
        &fresh_decor(&registry),
        HookSet::new().after(tag_after(&log, "cache")),
    );
    force_feature_order(&metrics, cache.symbol());

    // Apply order would put metrics innermost; the constraint moves it out.
    let features = [metrics.clone(), cache.clone()];
    let decorated = decorate(&answer(), &features).unwrap();
    decorated.as_function().unwrap().invoke(vec![]).unwrap();

    assert_eq!(*log.lock(), vec!["cache", "metrics"]);
    assert!(registry.is_decorated(&decorated, Some(metrics.symbol())));
    let inner = registry.get_original(&decorated).unwrap();
    assert!(registry.is_decorated(&inner, Some(cache.symbol())));
}

#[test]
fn constraint_on_a_group_symbol_orders_every_member() {
    let registry = registry();
    let group = FeatureSymbol::new("styling");
    let outer = make_feature(&fresh_decor(&registry), HookSet::new());
    let a = make_feature(&fresh_decor(&registry), HookSet::new());
    let b = make_feature(&fresh_decor(&registry), HookSet::new());
    mark_feature_with(&a, &group);
    mark_feature_with(&b, &group);
    force_feature_order(&outer, &group);

    let ordered = order_features(&[outer.clone(), a.clone(), b.clone()]);

    assert_eq!(ordered.first(), Some(&outer));
    assert_eq!(ordered.len(), 3);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Classes
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn class_feature_hooks_subclass_and_keeps_original() {
    let registry = registry();
    let classes = ClassRegistry::with_config(Arc::clone(registry.config()));
    let def = ClassDef::new("Widget").method("render", |_this, args| {
        Ok(json!(format!("<{}>", args[0].as_str().unwrap_or_default())))
    });
    let widget = classes.define(def).unwrap();

    let feature = make_feature(
        &ClassDecor::decor(&registry, &classes),
        ClassHooks::new()
            .method(
                "render",
                BeforeHook::new(|_args| Ok(json!(["button"])))
                    .named("force_button"),
            )
            .constructor(ConstructorHook::new(|instance, _args| {
                instance.set_field("styled", json!(true));
                Ok(())
            })),
    );

    let styled = feature.apply(&Target::from(widget)).unwrap();
    let class = styled.as_class().unwrap();

    assert!(registry.is_decorated(&styled, Some(feature.symbol())));
    assert_eq!(registry.get_original(&styled), Some(Target::from(widget)));

    let instance = classes.instantiate(class, vec![]).unwrap();
    let html = instance.call("render", vec![json!("div")]).unwrap();
    assert_eq!(html, json!("<button>"));
    assert_eq!(instance.get_field("styled"), Some(json!(true)));
    assert!(instance.is_instance_of(widget));

    let plain = classes.instantiate(widget, vec![]).unwrap();
    let html = plain.call("render", vec![json!("div")]).unwrap();
    assert_eq!(html, json!("<div>"));
    assert_eq!(plain.get_field("styled"), None);
}

#[test]
fn class_feature_applied_twice_installs_hooks_once() {
    let registry = registry();
    let classes = ClassRegistry::with_config(Arc::clone(registry.config()));
    let def = ClassDef::new("Counter")
        .method("get", |_this, _args| Ok(json!(0)));
    let counter = classes.define(def).unwrap();
    let feature = make_feature(
        &ClassDecor::decor(&registry, &classes),
        ClassHooks::new().method(
            "get",
            AfterHook::new(|r| Ok(json!(r.as_i64().unwrap_or(0) + 1))),
        ),
    );

    let once = feature.apply(&Target::from(counter)).unwrap();
    let twice = feature.apply(&once).unwrap();

    assert_eq!(registry.get_original(&twice), Some(Target::from(counter)));
    let instance = classes
        .instantiate(twice.as_class().unwrap(), vec![])
        .unwrap();
    assert_eq!(instance.call("get", vec![]).unwrap(), json!(1));
}

#[test]
fn merged_class_features_run_after_hooks_in_registration_order() {
    let registry = registry();
    let classes = ClassRegistry::with_config(Arc::clone(registry.config()));
    let def = ClassDef::new("Widget")
        .method("render", |_this, _args| Ok(json!("<div>")));
    let widget = classes.define(def).unwrap();
    let decor = ClassDecor::decor(&registry, &classes);
    let log = Log::default();
    let hooks = ClassHooks::new().method("render", tag_after(&log, "early"));
    let first = make_feature(&decor, hooks);
    let hooks = ClassHooks::new().method("render", tag_after(&log, "late"));
    let second = make_feature(&decor, hooks);

    let once = first.apply(&Target::from(widget)).unwrap();
    let merged = second.apply(&once).unwrap();
    let class = merged.as_class().unwrap();

    assert_eq!(classes.parent_of(class), Some(widget));
    let instance = classes.instantiate(class, vec![]).unwrap();
    instance.call("render", vec![]).unwrap();
    assert_eq!(*log.lock(), vec!["early", "late"]);
}

#[test]
fn forcing_before_a_feature_orders_against_it() {
    let registry = registry();
    let outer = make_feature(&fresh_decor(&registry), HookSet::new());
    let inner = make_feature(&fresh_decor(&registry), HookSet::new());
    force_feature_before(&outer, &inner);

    let ordered = order_features(&[inner.clone(), outer.clone()]);

    assert_eq!(ordered, vec![outer, inner]);
}
