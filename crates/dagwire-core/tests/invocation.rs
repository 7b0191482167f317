//! Lazy construction, memoization and invocation errors

use dagwire_core::prelude::*;
use dagwire_test_utils::{scope_with_config, seeded_scope, CallCounter, TestConfig, TestDb, TestLogger};
use pretty_assertions::assert_eq;
use std::fmt;
use std::sync::Arc;

binding_name!(ReadOnly = "ro");

struct Repo(Arc<TestDb>);
struct Cache(Arc<TestDb>);

struct Service {
    has_logger: bool,
}

#[derive(Debug)]
struct QuotaExceeded;

impl fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("quota exceeded")
    }
}

impl std::error::Error for QuotaExceeded {}

fn provide_db(scope: &Scope, calls: &CallCounter) {
    let calls = calls.clone();
    scope
        .provide(move |cfg: Dep<Arc<TestConfig>>| {
            calls.hit();
            anyhow::Ok(Arc::new(TestDb { url: cfg.0.url.clone() }))
        })
        .unwrap();
}

#[test]
fn nothing_runs_at_registration() {
    let scope = scope_with_config("mem://").unwrap();
    let calls = CallCounter::new();
    provide_db(&scope, &calls);
    assert_eq!(calls.count(), 0);
    assert!(!scope.is_resolved(&Key::of::<Arc<TestDb>>()));
}

#[test]
fn shared_dependency_constructed_once() {
    let scope = scope_with_config("mem://").unwrap();
    let calls = CallCounter::new();
    provide_db(&scope, &calls);
    scope.provide(|db: Dep<Arc<TestDb>>| anyhow::Ok(Arc::new(Repo(db.0)))).unwrap();
    scope.provide(|db: Dep<Arc<TestDb>>| anyhow::Ok(Arc::new(Cache(db.0)))).unwrap();

    scope
        .invoke(|repo: Dep<Arc<Repo>>, cache: Dep<Arc<Cache>>| {
            let (repo, cache) = (repo.into_inner(), cache.into_inner());
            assert!(Arc::ptr_eq(&repo.0, &cache.0));
        })
        .unwrap();
    assert_eq!(calls.count(), 1);

    let mut first = None;
    scope.invoke(|db: Dep<Arc<TestDb>>| first = Some(db.0)).unwrap();
    let mut second = None;
    scope.invoke(|db: Dep<Arc<TestDb>>| second = Some(db.0)).unwrap();
    assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
    assert_eq!(calls.count(), 1);
    assert!(scope.is_resolved(&Key::of::<Arc<TestDb>>()));
}

#[test]
fn optional_missing_resolves_to_none() {
    let scope = seeded_scope(1);
    scope
        .provide(|logger: Optional<Dep<Arc<TestLogger>>>| {
            anyhow::Ok(Arc::new(Service {
                has_logger: logger.0.is_some(),
            }))
        })
        .unwrap();

    let mut has_logger = None;
    scope
        .invoke(|svc: Dep<Arc<Service>>| has_logger = Some(svc.0.has_logger))
        .unwrap();
    assert_eq!(has_logger, Some(false));
}

#[test]
fn optional_present_resolves_to_value() {
    let scope = seeded_scope(1);
    scope.provide(|| anyhow::Ok(Arc::new(TestLogger::new("app")))).unwrap();

    let mut prefix = None;
    scope
        .invoke(|logger: Optional<Dep<Arc<TestLogger>>>| {
            prefix = logger.into_inner().map(|l| l.0.prefix.clone());
        })
        .unwrap();
    assert_eq!(prefix.as_deref(), Some("app"));
}

#[test]
fn missing_dependencies_enumerated_together() {
    let scope = seeded_scope(1);
    scope.provide(|| anyhow::Ok(7u16)).unwrap();

    let err = scope
        .invoke(|_a: Dep<u8>, _b: Named<u16, ReadOnly>, _c: Optional<Dep<u32>>| {})
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingDependency);

    let DigError::MissingDependency { missing, .. } = &err else {
        panic!("unexpected error {err}");
    };
    let keys: Vec<_> = missing.iter().map(|m| m.key.clone()).collect();
    assert_eq!(keys, vec![Key::of::<u8>(), Key::named::<u16>("ro")]);
    assert_eq!(missing[1].suggestions, vec![Key::of::<u16>()]);
    assert!(err.to_string().contains("did you mean u16?"));
}

#[test]
fn missing_dependency_of_nested_constructor() {
    let scope = seeded_scope(1);
    scope.provide(|db: Dep<Arc<TestDb>>| anyhow::Ok(Arc::new(Repo(db.0)))).unwrap();

    let err = scope.invoke(|_repo: Dep<Arc<Repo>>| {}).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvocationFailed);
    let DigError::InvocationFailed { source, .. } = &err else {
        panic!("unexpected error {err}");
    };
    assert_eq!(source.kind(), ErrorKind::MissingDependency);
}

#[test]
fn entry_error_is_returned_verbatim() {
    let scope = seeded_scope(1);
    let err = scope
        .invoke(|| -> anyhow::Result<()> { Err(QuotaExceeded.into()) })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::EntryFailed);
    assert_eq!(err.to_string(), "quota exceeded");
    let DigError::EntryFailed(inner) = &err else {
        panic!("unexpected error {err}");
    };
    assert!(inner.downcast_ref::<QuotaExceeded>().is_some());
}

#[test]
fn construction_failure_is_wrapped_with_location() {
    let scope = seeded_scope(1);
    scope
        .provide(|| -> anyhow::Result<Arc<TestDb>> { Err(QuotaExceeded.into()) })
        .unwrap();
    let repo_line = line!() + 1;
    scope.provide(|db: Dep<Arc<TestDb>>| anyhow::Ok(Arc::new(Repo(db.0)))).unwrap();

    let err = scope.invoke(|_repo: Dep<Arc<Repo>>| {}).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvocationFailed);
    assert!(err.to_string().contains("invocation.rs"));
    assert_eq!(err.root_cause().to_string(), "quota exceeded");

    let DigError::InvocationFailed { source, .. } = &err else {
        panic!("unexpected error {err}");
    };
    let DigError::InvocationFailed { location, source } = source.as_ref() else {
        panic!("unexpected error {source}");
    };
    assert_eq!(location.line, repo_line);
    assert_eq!(source.kind(), ErrorKind::ConstructionFailed);
}

#[test]
fn every_constructor_on_the_failing_path_is_named() {
    let scope = seeded_scope(1);
    scope
        .provide(|| -> anyhow::Result<Arc<TestDb>> { Err(QuotaExceeded.into()) })
        .unwrap();
    let repo_line = line!() + 1;
    scope.provide(|db: Dep<Arc<TestDb>>| anyhow::Ok(Arc::new(Repo(db.0)))).unwrap();
    let service_line = line!() + 1;
    scope.provide(|_repo: Dep<Arc<Repo>>| anyhow::Ok(Arc::new(Service { has_logger: false }))).unwrap();

    let err = scope.invoke(|_service: Dep<Arc<Service>>| {}).unwrap_err();
    assert_eq!(err.root_cause().to_string(), "quota exceeded");

    let mut lines = Vec::new();
    let mut current = &err;
    while let DigError::InvocationFailed { location, source } = current {
        lines.push(location.line);
        current = source.as_ref();
    }
    assert_eq!(current.kind(), ErrorKind::ConstructionFailed);
    assert_eq!(lines.len(), 3);
    assert_eq!(&lines[1..], &[service_line, repo_line]);

    let message = err.to_string();
    assert!(message.contains(&format!("invocation.rs:{service_line}")), "{message}");
    assert!(message.contains(&format!("invocation.rs:{repo_line}")), "{message}");
}

#[test]
fn failed_multi_output_constructor_commits_nothing() {
    let scope = seeded_scope(1);
    let calls = CallCounter::new();
    let counted = calls.clone();
    scope
        .provide(Multi(move || -> anyhow::Result<(u8, u16, u32)> {
            counted.hit();
            let _computed = (1u8, 2u16, 3u32);
            anyhow::bail!("failed after computing")
        }))
        .unwrap();

    for _ in 0..2 {
        let err = scope.invoke(|_a: Dep<u8>| {}).unwrap_err();
        assert_eq!(err.root_cause().to_string(), "failed after computing");
    }
    for key in [Key::of::<u8>(), Key::of::<u16>(), Key::of::<u32>()] {
        assert!(!scope.is_resolved(&key), "{key} should not be cached");
    }
    assert_eq!(calls.count(), 2);
}

#[test]
fn multi_output_constructor_commits_every_value() {
    let scope = seeded_scope(1);
    let calls = CallCounter::new();
    let counted = calls.clone();
    scope
        .provide(Multi(move || {
            counted.hit();
            anyhow::Ok((1u8, 2u16, 3u32))
        }))
        .unwrap();

    let mut seen = None;
    scope
        .invoke(|a: Dep<u8>, b: Dep<u16>, c: Dep<u32>| seen = Some((a.0, b.0, c.0)))
        .unwrap();
    assert_eq!(seen, Some((1, 2, 3)));
    assert_eq!(calls.count(), 1);
    assert!(scope.is_resolved(&Key::of::<u32>()));
}

#[test]
fn invoke_from_child_is_answered_from_root() {
    let root = seeded_scope(1);
    let child = root.child("handlers");
    root.provide(|| anyhow::Ok(5u32)).unwrap();

    let mut seen = None;
    child.invoke(|v: Dep<u32>| seen = Some(v.0)).unwrap();
    assert_eq!(seen, Some(5));
}

#[test]
fn raw_constructor_without_results_is_invalid() {
    let scope = seeded_scope(1);
    let ctor = dagwire_core::Constructor::new(
        dagwire_core::ParamPlan::default(),
        Vec::new(),
        dagwire_core::Location::caller("tests::empty"),
        |_| Ok(Vec::new()),
    );
    let err = scope.provide(ctor).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConstructor);
    assert!(err.is_registration_error());
}
