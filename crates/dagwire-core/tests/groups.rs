//! Value groups: aggregation across scopes and randomized order

use dagwire_core::prelude::*;
use dagwire_test_utils::{seeded_scope, CallCounter};
use pretty_assertions::assert_eq;
use std::collections::HashSet;

binding_name!(Ports = "ports");
binding_name!(Handlers = "handlers");

fn provide_ports(scope: &Scope, ports: &[u16]) {
    for &port in ports {
        scope
            .provide_with(move || anyhow::Ok(port), BindingOptions::new().group("ports"))
            .unwrap();
    }
}

fn ports(scope: &Scope) -> Vec<u16> {
    let mut out = Vec::new();
    scope.invoke(|g: Group<u16, Ports>| out = g.into_inner()).unwrap();
    out
}

fn sorted(mut values: Vec<u16>) -> Vec<u16> {
    values.sort_unstable();
    values
}

#[test]
fn group_order_varies_between_invocations() {
    let scope = seeded_scope(42);
    provide_ports(&scope, &[1, 2, 3, 4, 5]);

    let mut orders = HashSet::new();
    for _ in 0..20 {
        let seen = ports(&scope);
        assert_eq!(sorted(seen.clone()), vec![1, 2, 3, 4, 5]);
        orders.insert(seen);
    }
    assert!(orders.len() > 1, "group order never changed");
}

#[test]
fn same_seed_gives_same_order() {
    let first = seeded_scope(7);
    let second = seeded_scope(7);
    provide_ports(&first, &[10, 20, 30, 40]);
    provide_ports(&second, &[10, 20, 30, 40]);

    for _ in 0..5 {
        assert_eq!(ports(&first), ports(&second));
    }
}

#[test]
fn child_contributions_are_gathered() {
    let root = seeded_scope(1);
    let left = root.child("left");
    let right = left.child("right");
    provide_ports(&root, &[1]);
    provide_ports(&left, &[2]);
    provide_ports(&right, &[3]);

    assert_eq!(sorted(ports(&root)), vec![1, 2, 3]);
    assert_eq!(sorted(ports(&right)), vec![1, 2, 3]);
}

#[test]
fn flattened_contributions_are_spliced() {
    let scope = seeded_scope(1);
    provide_ports(&scope, &[1]);
    scope
        .provide_with(
            Multi(|| anyhow::Ok(Flatten(vec![2u16, 3]))),
            BindingOptions::new().group("ports"),
        )
        .unwrap();
    scope
        .provide_with(
            Multi(|| anyhow::Ok(Flatten(Vec::<u16>::new()))),
            BindingOptions::new().group("ports"),
        )
        .unwrap();

    assert_eq!(sorted(ports(&scope)), vec![1, 2, 3]);
}

#[test]
fn group_without_contributors_is_empty() {
    let scope = seeded_scope(1);
    let mut seen = None;
    scope
        .invoke(|g: Group<String, Handlers>| seen = Some(g.into_inner()))
        .unwrap();
    assert_eq!(seen, Some(Vec::new()));
}

#[test]
fn group_providers_run_once() {
    let scope = seeded_scope(1);
    let calls = CallCounter::new();
    for name in ["a", "b", "c"] {
        let calls = calls.clone();
        scope
            .provide_with(
                move || {
                    calls.hit();
                    anyhow::Ok(name.to_string())
                },
                BindingOptions::new().group("handlers"),
            )
            .unwrap();
    }

    for _ in 0..3 {
        let mut names = Vec::new();
        scope
            .invoke(|g: Group<String, Handlers>| names = g.into_inner())
            .unwrap();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
    assert_eq!(calls.count(), 3);
}

#[test]
fn group_member_depending_on_plain_value() {
    let scope = seeded_scope(1);
    scope.provide(|| anyhow::Ok(8000u32)).unwrap();
    scope
        .provide_with(
            |base: Dep<u32>| -> anyhow::Result<u16> { Ok(u16::try_from(base.0 + 80)?) },
            BindingOptions::new().group("ports"),
        )
        .unwrap();

    assert_eq!(ports(&scope), vec![8080]);
}
