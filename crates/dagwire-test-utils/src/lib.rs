//! Testing utilities for dagwire workspace
//!
//! Shared fixtures, call counters and scope builders.

#![allow(missing_docs)]

use dagwire_core::{Scope, ScopeConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a `RUST_LOG`-filtered subscriber writing to the test output.
/// Safe to call from every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Counts how often a constructor ran
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConfig {
    pub url: String,
}

impl TestConfig {
    pub fn new(url: &str) -> Self {
        Self { url: url.to_string() }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct TestDb {
    pub url: String,
}

#[derive(Debug, PartialEq, Eq)]
pub struct TestLogger {
    pub prefix: String,
}

impl TestLogger {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }
}

/// Root scope with a fixed group shuffle seed
pub fn seeded_scope(seed: u64) -> Scope {
    init_tracing();
    Scope::with_config(ScopeConfig::new().with_seed(seed))
}

/// Root scope that defers cycle verification to the first invocation
pub fn deferred_scope() -> Scope {
    init_tracing();
    Scope::with_config(ScopeConfig::new().with_deferred_verification())
}

/// Root scope holding a `TestConfig` for `url`
pub fn scope_with_config(url: &str) -> anyhow::Result<Scope> {
    let scope = seeded_scope(1);
    let config = Arc::new(TestConfig::new(url));
    scope.provide(move || anyhow::Ok(Arc::clone(&config)))?;
    Ok(scope)
}
