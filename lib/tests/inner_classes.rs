mod common;

use common::*;
use hotswap::redefinition::{
    ClassRef, RedefineRequest, RedefinitionEngine, RedefinitionError, RedefinitionSettings,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

const NOP: u8 = 0x00;

fn engine(registry: &Arc<MockRegistry>, settings: RedefinitionSettings) -> RedefinitionEngine {
    init_logging();
    RedefinitionEngine::new(settings, registry.clone())
}

fn names(classes: &[ClassRef]) -> Vec<String> {
    classes.iter().map(|class| class.name().as_str().to_owned()).collect()
}

fn by_name(class_name: &str, bytes: Vec<u8>) -> RedefineRequest {
    RedefineRequest::by_name(LOADER, name(class_name), bytes)
}

fn cached_inner_names(engine: &RedefinitionEngine, outer: &str) -> Vec<String> {
    let cached = engine.cache().lookup(LOADER, &name(outer)).unwrap();
    cached
        .inner
        .iter()
        .map(|inner| inner.name.as_str().to_owned())
        .collect()
}

/// `Outer` creating one anonymous class in `first`
fn load_outer(registry: &MockRegistry) -> (Arc<MockClass>, Arc<MockClass>) {
    let outer = registry.load_spec(
        ClassSpec::new("a/Outer")
            .method_creating("first", "a/Outer$1")
            .method("second", vec![RETURN]),
    );
    let inner = registry.load_spec(
        ClassSpec::new("a/Outer$1")
            .enclosed_in("a/Outer", "first")
            .method("run", vec![RETURN]),
    );
    (outer, inner)
}

/// An anonymous class inserted before the existing one: javac now calls the existing one
/// `Outer$2` and the new one `Outer$1`
fn shifted_batch(outer: &Arc<MockClass>) -> Vec<RedefineRequest> {
    let new_outer = ClassSpec::new("a/Outer")
        .method_creating("first", "a/Outer$2")
        .method_creating("second", "a/Outer$1")
        .bytes();
    let inserted = ClassSpec::new("a/Outer$1")
        .enclosed_in("a/Outer", "second")
        .method("other", vec![RETURN])
        .bytes();
    let shifted = ClassSpec::new("a/Outer$2")
        .enclosed_in("a/Outer", "first")
        .method("run", vec![RETURN])
        .bytes();
    vec![
        request(outer, new_outer),
        by_name("a/Outer$1", inserted),
        by_name("a/Outer$2", shifted),
    ]
}

#[test]
fn shifted_anonymous_classes_keep_their_identity() {
    let registry = MockRegistry::new();
    let (outer, inner) = load_outer(&registry);
    let engine = engine(&registry, RedefinitionSettings::default());

    let changed = engine.redefine(shifted_batch(&outer)).unwrap();

    // The shifted class is matched to the loaded `Outer$1` and nothing changed in it
    assert_eq!(names(&changed), vec!["a/Outer", "a/Outer$hotswap1"]);
    assert_eq!(inner.swaps.load(Ordering::SeqCst), 0);
    assert!(inner.mentions("run"));

    // The inserted class had no previous version and got a fresh name
    assert_eq!(*registry.defined.lock(), vec![name("a/Outer$hotswap1")]);
    let inserted = registry.find(&name("a/Outer$hotswap1")).unwrap();
    assert!(inserted.mentions("other"));
    assert!(!inserted.mentions("a/Outer$1"));

    // References in the outer class follow the renames
    assert!(outer.mentions("a/Outer$1"));
    assert!(outer.mentions("a/Outer$hotswap1"));
    assert!(!outer.mentions("a/Outer$2"));

    assert_eq!(
        cached_inner_names(&engine, "a/Outer"),
        vec!["a/Outer$hotswap1", "a/Outer$1"]
    );
}

#[test]
fn resubmitting_a_batch_changes_nothing() {
    let registry = MockRegistry::new();
    let (outer, inner) = load_outer(&registry);
    let engine = engine(&registry, RedefinitionSettings::default());

    engine.redefine(shifted_batch(&outer)).unwrap();
    let changed = engine.redefine(shifted_batch(&outer)).unwrap();

    assert!(changed.is_empty());
    assert_eq!(outer.swaps.load(Ordering::SeqCst), 1);
    assert_eq!(inner.swaps.load(Ordering::SeqCst), 0);
    assert_eq!(registry.defined.lock().len(), 1);
}

#[test]
fn dropped_anonymous_classes_are_removed() {
    let registry = MockRegistry::new();
    let (outer, inner) = load_outer(&registry);
    let engine = engine(&registry, RedefinitionSettings::default());
    engine.redefine(shifted_batch(&outer)).unwrap();
    let inserted = registry.find(&name("a/Outer$hotswap1")).unwrap();

    let plain = ClassSpec::new("a/Outer")
        .method("first", vec![RETURN])
        .method("second", vec![RETURN])
        .bytes();
    let changed = engine.redefine(vec![request(&outer, plain)]).unwrap();

    assert_eq!(names(&changed), vec!["a/Outer"]);
    assert!(inner.removed.load(Ordering::SeqCst));
    assert!(inserted.removed.load(Ordering::SeqCst));
    assert!(registry.find(&name("a/Outer$1")).is_none());
    assert!(cached_inner_names(&engine, "a/Outer").is_empty());
}

#[test]
fn missing_inner_classes_are_fetched() {
    let registry = MockRegistry::new();
    let (outer, inner) = load_outer(&registry);
    registry.add_resource(
        ClassSpec::new("a/Outer$1")
            .enclosed_in("a/Outer", "first")
            .method("run", vec![NOP, RETURN])
            .bytes(),
    );
    let outer_bytes = outer.definition_bytes();

    let settings = RedefinitionSettings {
        fetch_missing_inner_classes: false,
        ..RedefinitionSettings::default()
    };
    let without_fetching = engine(&registry, settings);
    let changed = without_fetching
        .redefine(vec![request(&outer, outer_bytes.clone())])
        .unwrap();
    assert!(changed.is_empty());
    assert!(!inner.removed.load(Ordering::SeqCst));
    assert_eq!(cached_inner_names(&without_fetching, "a/Outer"), vec!["a/Outer$1"]);

    let engine = engine(&registry, RedefinitionSettings::default());
    let changed = engine.redefine(vec![request(&outer, outer_bytes)]).unwrap();
    assert_eq!(names(&changed), vec!["a/Outer$1"]);
    assert_eq!(inner.swaps.load(Ordering::SeqCst), 1);
    assert_eq!(outer.swaps.load(Ordering::SeqCst), 0);
}

#[test]
fn loaded_outer_class_outside_the_batch() {
    let registry = MockRegistry::new();
    let (outer, inner) = load_outer(&registry);
    let engine = engine(&registry, RedefinitionSettings::default());

    let new_inner = ClassSpec::new("a/Outer$1")
        .enclosed_in("a/Outer", "first")
        .method("run", vec![NOP, RETURN])
        .bytes();
    let changed = engine.redefine(vec![request(&inner, new_inner)]).unwrap();

    assert_eq!(names(&changed), vec!["a/Outer$1"]);
    assert_eq!(outer.swaps.load(Ordering::SeqCst), 0);
    assert!(registry.defined.lock().is_empty());
    assert_eq!(cached_inner_names(&engine, "a/Outer"), vec!["a/Outer$1"]);
}

#[test]
fn unloaded_classes_leave_the_cache() {
    let registry = MockRegistry::new();
    let (outer, _) = load_outer(&registry);
    let engine = engine(&registry, RedefinitionSettings::default());
    engine.redefine(shifted_batch(&outer)).unwrap();
    assert!(!engine.cache().is_empty());

    engine.on_class_unloaded(LOADER, &name("a/Outer"));
    assert!(engine.cache().lookup(LOADER, &name("a/Outer")).is_none());

    engine.redefine(shifted_batch(&outer)).unwrap();
    engine.on_loader_unloaded(LOADER);
    assert!(engine.cache().is_empty());
}

#[test]
fn failed_definitions_are_rolled_back() {
    let registry = MockRegistry::new();
    let outer = registry.load_spec(
        ClassSpec::new("a/Outer")
            .method("first", vec![RETURN])
            .method("second", vec![RETURN]),
    );
    let engine = engine(&registry, RedefinitionSettings::advanced());

    let batch = || {
        let new_outer = ClassSpec::new("a/Outer")
            .method_creating("first", "a/Outer$1")
            .method_creating("second", "a/Outer$2")
            .bytes();
        let first = ClassSpec::new("a/Outer$1")
            .enclosed_in("a/Outer", "first")
            .method("run", vec![RETURN])
            .bytes();
        let second = ClassSpec::new("a/Outer$2")
            .enclosed_in("a/Outer", "second")
            .method("other", vec![RETURN])
            .bytes();
        vec![
            request(&outer, new_outer),
            by_name("a/Outer$1", first),
            by_name("a/Outer$2", second),
        ]
    };

    *registry.define_limit.lock() = Some(1);
    let rejected = engine.redefine(batch()).unwrap_err();
    assert_eq!(rejected.error, RedefinitionError::FailsVerification);

    // The class defined before the failure is gone again, and nothing else was touched
    assert_eq!(*registry.defined.lock(), vec![name("a/Outer$hotswap1")]);
    assert!(registry.find(&name("a/Outer$hotswap1")).is_none());
    assert!(registry.find(&name("a/Outer$hotswap2")).is_none());
    assert_eq!(outer.swaps.load(Ordering::SeqCst), 0);
    assert!(engine.cache().lookup(LOADER, &name("a/Outer")).is_none());

    *registry.define_limit.lock() = None;
    let changed = engine.redefine(batch()).unwrap();
    assert_eq!(changed.len(), 3);
    assert!(registry.find(&name("a/Outer$hotswap1")).is_some());
    assert!(registry.find(&name("a/Outer$hotswap2")).is_some());
    assert_eq!(outer.swaps.load(Ordering::SeqCst), 1);
}

#[test]
fn inner_classes_of_a_loaded_outer_class_are_kept() {
    let registry = MockRegistry::new();
    let outer_spec = || {
        ClassSpec::new("a/Outer")
            .method_creating("first", "a/Outer$1")
            .method_creating("second", "a/Outer$2")
    };
    let first_spec = |body: Vec<u8>| {
        ClassSpec::new("a/Outer$1")
            .enclosed_in("a/Outer", "first")
            .method("run", body)
    };
    let outer = registry.load_spec(outer_spec());
    let first = registry.load_spec(first_spec(vec![RETURN]));
    let second = registry.load_spec(
        ClassSpec::new("a/Outer$2")
            .enclosed_in("a/Outer", "second")
            .method("other", vec![RETURN]),
    );
    let engine = engine(&registry, RedefinitionSettings::default());

    // Records both inner classes in the cache
    let unchanged = vec![
        request(&outer, outer.definition_bytes()),
        request(&first, first.definition_bytes()),
        request(&second, second.definition_bytes()),
    ];
    assert!(engine.redefine(unchanged).unwrap().is_empty());

    let changed = engine
        .redefine(vec![request(&first, first_spec(vec![NOP, RETURN]).bytes())])
        .unwrap();

    assert_eq!(names(&changed), vec!["a/Outer$1"]);
    assert!(!second.removed.load(Ordering::SeqCst));
    assert_eq!(outer.swaps.load(Ordering::SeqCst), 0);
    assert_eq!(
        cached_inner_names(&engine, "a/Outer"),
        vec!["a/Outer$1", "a/Outer$2"]
    );
}
