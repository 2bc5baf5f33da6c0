//! Feature ordering and application.
//!
//! Features are supplied in apply order, innermost first. [`order_features`]
//! walks them from the outermost backward and inserts each one ahead of the
//! first already-placed feature it must precede, appending otherwise. The
//! result is outermost first.
//!
//! This is a best-effort insertion and not a topological sort. Pairwise
//! constraints are always honored; transitive or conflicting chains may not
//! be, and any constraint the final order leaves unsatisfied is reported at
//! debug level.

use crate::error::FeatureResult;
use crate::feature::Feature;
use crate::target::{FeatureSymbol, Target};

struct Placed {
    feature: Feature,
    symbols: Vec<FeatureSymbol>,
    force_before: Vec<FeatureSymbol>,
}

impl Placed {
    fn new(feature: &Feature) -> Self {
        let metadata = feature.metadata();
        Self {
            feature: feature.clone(),
            symbols: metadata.symbols,
            force_before: metadata.force_before,
        }
    }

    fn must_precede(&self, other: &Placed) -> bool {
        self.force_before
            .iter()
            .any(|symbol| other.symbols.contains(symbol))
    }
}

/// Orders `features` (innermost first) into outermost-first order.
#[must_use]
pub fn order_features(features: &[Feature]) -> Vec<Feature> {
    let mut ordered: Vec<Placed> = Vec::with_capacity(features.len());

    for feature in features.iter().rev() {
        let placed = Placed::new(feature);
        let position = ordered.iter().position(|p| placed.must_precede(p));
        match position {
            Some(position) => ordered.insert(position, placed),
            None => ordered.push(placed),
        }
    }

    report_unsatisfied(&ordered);
    ordered.into_iter().map(|p| p.feature).collect()
}

fn report_unsatisfied(ordered: &[Placed]) {
    for (later, placed) in ordered.iter().enumerate() {
        for earlier in &ordered[..later] {
            if placed.must_precede(earlier) {
                tracing::debug!(
                    feature = placed.feature.name(),
                    after = earlier.feature.name(),
                    "feature order constraint left unsatisfied"
                );
            }
        }
    }
}

/// Orders `features` and applies them to `target`, innermost first.
///
/// # Errors
///
/// Stops at the first feature whose wrapper fails; see [`Feature::apply`].
pub fn decorate(target: &Target, features: &[Feature]) -> FeatureResult<Target> {
    let ordered = order_features(features);
    tracing::debug!(
        %target,
        order = ?ordered.iter().map(Feature::name).collect::<Vec<_>>(),
        "decorating target"
    );

    let mut current = target.clone();
    for feature in ordered.iter().rev() {
        current = feature.apply(&current)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::error::FeatureError;
    use crate::feature::{force_feature_order, make_feature, mark_feature_with};
    use crate::registry::FeatureRegistry;
    use crate::wrapper::{Decor, Wrapper};
    use entwine_hooks::callable::Callable;
    use entwine_state::config::ConfigContext;
    use tracing_test::traced_test;

    /// Produces a fresh callable whose name records the wrap.
    struct Label(&'static str);

    impl Wrapper for Label {
        type Config = ();

        fn name(&self) -> &str {
            self.0
        }

        fn wrap_target(&self, original: &Target, _config: &()) -> FeatureResult<Target> {
            match original {
                Target::Function(f) => Ok(Target::from(Callable::noop(format!(
                    "{}({})",
                    self.0,
                    f.name()
                )))),
                Target::Class(_) => Err(FeatureError::UnsupportedTarget {
                    wrapper: self.0.into(),
                    target: original.to_string(),
                }),
            }
        }

        fn merge(&self, _old: &(), _new: &()) {}
    }

    fn registry() -> FeatureRegistry {
        FeatureRegistry::with_config(Arc::new(ConfigContext::new()))
    }

    fn feature(registry: &FeatureRegistry, name: &'static str) -> Feature {
        make_feature(&Decor::new(registry, Label(name)), ())
    }

    fn names(features: &[Feature]) -> Vec<&str> {
        features.iter().map(Feature::name).collect()
    }

    #[test]
    fn unconstrained_order_is_outermost_first() {
        let registry = registry();
        let a = feature(&registry, "a");
        let b = feature(&registry, "b");
        let c = feature(&registry, "c");

        let ordered = order_features(&[a, b, c]);
        assert_eq!(names(&ordered), vec!["c", "b", "a"]);
    }

    #[test]
    fn constraint_moves_feature_outward() {
        let registry = registry();
        let a = feature(&registry, "a");
        let b = feature(&registry, "b");
        let c = feature(&registry, "c");
        force_feature_order(&a, c.symbol());

        let ordered = order_features(&[a, b, c]);
        assert_eq!(names(&ordered), vec!["a", "c", "b"]);
    }

    #[test]
    fn constraint_matches_marked_symbols() {
        let registry = registry();
        let group = FeatureSymbol::new("styling");
        let first = feature(&registry, "first");
        let styled = feature(&registry, "styled");
        mark_feature_with(&styled, &group);
        force_feature_order(&first, &group);

        let ordered = order_features(&[first, styled]);
        assert_eq!(names(&ordered), vec!["first", "styled"]);
    }

    #[test]
    fn decorate_applies_innermost_first() {
        let registry = registry();
        let inner = feature(&registry, "inner");
        let outer = feature(&registry, "outer");

        let base = Target::from(Callable::noop("f"));
        let result = decorate(&base, &[inner.clone(), outer.clone()]).unwrap();

        assert_eq!(result.as_function().unwrap().name(), "outer(inner(f))");
        assert!(registry.is_decorated(&result, Some(outer.symbol())));
        let middle = registry.get_original(&result).unwrap();
        assert!(registry.is_decorated(&middle, Some(inner.symbol())));
        assert_eq!(registry.get_original(&middle), Some(base));
    }

    #[test]
    fn decorate_stops_at_first_failure() {
        let registry = registry();
        let only = feature(&registry, "only");
        let classes = entwine_hooks::class::ClassRegistry::new();
        let class = classes
            .define(entwine_hooks::class::ClassDef::new("C"))
            .unwrap();

        let err = decorate(&Target::from(class), &[only]).unwrap_err();
        assert!(matches!(err, FeatureError::UnsupportedTarget { .. }));
    }

    #[traced_test]
    #[test]
    fn conflicting_constraints_are_reported() {
        let registry = registry();
        let a = feature(&registry, "a");
        let b = feature(&registry, "b");
        force_feature_order(&a, b.symbol());
        force_feature_order(&b, a.symbol());

        let ordered = order_features(&[a, b]);
        assert_eq!(ordered.len(), 2);
        assert!(logs_contain("feature order constraint left unsatisfied"));
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_single_constraint_is_honored(
                (len, first, then) in (2usize..8).prop_flat_map(|len| {
                    (Just(len), 0..len, 0..len)
                }).prop_filter("distinct", |(_, first, then)| first != then)
            ) {
                let registry = registry();
                let names = ["f0", "f1", "f2", "f3", "f4", "f5", "f6", "f7"];
                let features: Vec<Feature> = names[..len]
                    .iter()
                    .map(|name| feature(&registry, *name))
                    .collect();
                force_feature_order(&features[first], features[then].symbol());

                let ordered = order_features(&features);

                prop_assert_eq!(ordered.len(), len);
                for f in &features {
                    prop_assert!(ordered.contains(f));
                }
                let pos = |f: &Feature| ordered.iter().position(|o| o == f);
                prop_assert!(pos(&features[first]) < pos(&features[then]));
            }
        }
    }
}
