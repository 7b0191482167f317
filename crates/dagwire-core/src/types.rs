//! Shared primitive types: node identity, source locations, erased values.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A type-erased value held by the graph.
///
/// Values are shared, never mutated after commit, and handed out by cloning
/// the `Arc`.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Process-unique identity of a registered constructor or decorator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a constructor was handed to the graph.
///
/// `function` is the Rust type name of the callable; `file`/`line`/`column`
/// come from the registering call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    /// Type name of the callable
    pub function: &'static str,
    /// Source file of the call site
    pub file: &'static str,
    /// Line of the call site
    pub line: u32,
    /// Column of the call site
    pub column: u32,
}

impl Location {
    /// Capture the caller of the enclosing `#[track_caller]` function.
    #[track_caller]
    #[must_use]
    pub fn caller(function: &'static str) -> Self {
        let site = std::panic::Location::caller();
        Self {
            function,
            file: site.file(),
            line: site.line(),
            column: site.column(),
        }
    }

    /// Short function name without its module path.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.function.split('<').next().unwrap_or(self.function);
        match base.rfind("::") {
            Some(idx) => &self.function[idx + 2..],
            None => self.function,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.function, self.file, self.line)
    }
}
