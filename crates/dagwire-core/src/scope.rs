//! Scope tree
//!
//! A [`Scope`] is one registry in a tree of registries. Provider discovery is
//! anchored at the root and covers every descendant; decorator discovery
//! starts at the scope owning a key's providers and walks up to the root.

use crate::config::ScopeConfig;
use crate::constructor::{Constructor, Inspect};
use crate::cycle::DependencyGraph;
use crate::decorate::Decorator;
use crate::error::{DigError, MissingKey};
use crate::inspect::{IntoConstructor, IntoEntry};
use crate::key::{Key, TypeTag};
use crate::node::Node;
use crate::options::BindingOptions;
use crate::resolve;
use crate::staging::ContainerWriter;
use crate::types::{Location, NodeId, Value};
use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use rand::seq::SliceRandom;
use rand::RngCore;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// State shared by every scope of one tree
pub(crate) struct TreeState {
    config: ScopeConfig,
    rng: Mutex<Box<dyn RngCore + Send>>,
    verified_acyclic: AtomicBool,
    /// Serializes registration and decoration across the tree
    registry: Mutex<()>,
}

impl TreeState {
    fn new(config: ScopeConfig, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            config,
            rng: Mutex::new(rng),
            verified_acyclic: AtomicBool::new(true),
            registry: Mutex::new(()),
        }
    }
}

/// A participant being registered, checked before it is inserted
#[derive(Clone, Copy)]
pub(crate) enum Pending<'a> {
    Provider(&'a ScopeInner, &'a Node),
    Decorator(&'a ScopeInner, &'a Decorator),
}

pub(crate) struct ScopeInner {
    label: String,
    parent: Option<Weak<ScopeInner>>,
    children: RwLock<Vec<Arc<ScopeInner>>>,
    providers: RwLock<IndexMap<Key, Vec<Arc<Node>>>>,
    values: RwLock<HashMap<Key, Value>>,
    groups: RwLock<HashMap<Key, Vec<Value>>>,
    decorators: RwLock<HashMap<Key, Vec<Arc<Decorator>>>>,
    commit: Mutex<()>,
    shared: Arc<TreeState>,
}

impl ScopeInner {
    fn new(label: String, parent: Option<Weak<ScopeInner>>, shared: Arc<TreeState>) -> Self {
        Self {
            label,
            parent,
            children: RwLock::new(Vec::new()),
            providers: RwLock::new(IndexMap::new()),
            values: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            decorators: RwLock::new(HashMap::new()),
            commit: Mutex::new(()),
            shared,
        }
    }

    #[inline]
    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub(crate) fn config(&self) -> &ScopeConfig {
        &self.shared.config
    }

    pub(crate) fn parent(&self) -> Option<Arc<ScopeInner>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn root(self: &Arc<Self>) -> Arc<ScopeInner> {
        let mut current = Arc::clone(self);
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    fn children(&self) -> Vec<Arc<ScopeInner>> {
        self.children.read().clone()
    }

    /// Pre-order walk over this scope and its descendants
    fn walk(self: &Arc<Self>, visit: &mut impl FnMut(&Arc<ScopeInner>)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Every `(owner, node)` able to produce `key`, this scope and below
    pub(crate) fn value_providers(self: &Arc<Self>, key: &Key) -> Vec<(Arc<ScopeInner>, Arc<Node>)> {
        let mut found = Vec::new();
        self.walk(&mut |scope| {
            if let Some(nodes) = scope.providers.read().get(key) {
                found.extend(nodes.iter().map(|node| (Arc::clone(scope), Arc::clone(node))));
            }
        });
        found
    }

    pub(crate) fn has_provider(self: &Arc<Self>, key: &Key) -> bool {
        if self.providers.read().contains_key(key) {
            return true;
        }
        self.children().iter().any(|child| child.has_provider(key))
    }

    /// The scope owning `key`'s providers: this one, else the nearest
    /// descendant in breadth-first order.
    pub(crate) fn provider_owner(self: &Arc<Self>, key: &Key) -> Option<Arc<ScopeInner>> {
        self.owner_with(key, None)
    }

    fn owner_with(self: &Arc<Self>, key: &Key, pending: Option<Pending<'_>>) -> Option<Arc<ScopeInner>> {
        let mut queue = VecDeque::from([Arc::clone(self)]);
        while let Some(scope) = queue.pop_front() {
            let pending_here = matches!(
                pending,
                Some(Pending::Provider(at, node)) if std::ptr::eq(Arc::as_ptr(&scope), at) && node.produces().contains(key)
            );
            if pending_here || scope.providers.read().contains_key(key) {
                return Some(scope);
            }
            queue.extend(scope.children());
        }
        None
    }

    /// Whether `self` is `other` or one of its ancestors
    pub(crate) fn encloses(&self, other: &Arc<ScopeInner>) -> bool {
        let mut current = Some(Arc::clone(other));
        while let Some(scope) = current {
            if std::ptr::eq(Arc::as_ptr(&scope), self) {
                return true;
            }
            current = scope.parent();
        }
        false
    }

    /// Decorators applying to `key`, nearest to the owning scope first
    pub(crate) fn decorators_for(self: &Arc<Self>, key: &Key) -> Vec<Arc<Decorator>> {
        let mut chain = Vec::new();
        let mut current = self.provider_owner(key);
        while let Some(scope) = current {
            if let Some(decorators) = scope.decorators.read().get(key) {
                chain.extend(decorators.iter().cloned());
            }
            current = scope.parent();
        }
        chain
    }

    /// Ids of the decorators applied to `key`, as [`Self::decorators_for`]
    /// would return them once `pending` is inserted.
    fn decorator_chain(self: &Arc<Self>, key: &Key, pending: Option<Pending<'_>>) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.owner_with(key, pending);
        while let Some(scope) = current {
            if let Some(decorators) = scope.decorators.read().get(key) {
                chain.extend(decorators.iter().map(|decorator| decorator.id()));
            }
            if let Some(Pending::Decorator(at, decorator)) = pending {
                if std::ptr::eq(Arc::as_ptr(&scope), at) && decorator.wraps().contains(key) {
                    chain.push(decorator.id());
                }
            }
            current = scope.parent();
        }
        chain
    }

    pub(crate) fn value(&self, key: &Key) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    /// Every committed contribution to `key`, this scope and below
    pub(crate) fn group_values(self: &Arc<Self>, key: &Key) -> Vec<Value> {
        let mut values = Vec::new();
        self.walk(&mut |scope| {
            if let Some(contributed) = scope.groups.read().get(key) {
                values.extend(contributed.iter().cloned());
            }
        });
        values
    }

    pub(crate) fn shuffle(&self, values: &mut [Value]) {
        let mut rng = self.shared.rng.lock();
        values.shuffle(&mut *rng);
    }

    pub(crate) fn commit_lock(&self) -> MutexGuard<'_, ()> {
        self.commit.lock()
    }

    pub(crate) fn is_verified_acyclic(&self) -> bool {
        self.shared.verified_acyclic.load(Ordering::Acquire)
    }

    pub(crate) fn mark_verified(&self, verified: bool) {
        self.shared.verified_acyclic.store(verified, Ordering::Release);
    }

    /// Keys of the same type bound under another name or group
    pub(crate) fn suggestions(self: &Arc<Self>, key: &Key) -> Vec<Key> {
        let mut keys = Vec::new();
        self.walk(&mut |scope| {
            keys.extend(
                scope
                    .providers
                    .read()
                    .keys()
                    .filter(|candidate| candidate.type_tag() == key.type_tag() && *candidate != key)
                    .cloned(),
            );
        });
        keys.sort();
        keys.dedup();
        keys
    }

    pub(crate) fn missing(self: &Arc<Self>, key: &Key) -> MissingKey {
        MissingKey {
            key: key.clone(),
            suggestions: self.suggestions(key),
        }
    }

    /// Snapshot of every provider and decorator in this subtree, plus
    /// `pending` when given. Called on the root.
    pub(crate) fn dependency_graph(self: &Arc<Self>, pending: Option<Pending<'_>>) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        self.walk(&mut |scope| {
            for nodes in scope.providers.read().values() {
                for node in nodes {
                    graph.add_provider(node.id(), node.location(), node.requires(), node.produces());
                }
            }
            for decorators in scope.decorators.read().values() {
                for decorator in decorators {
                    graph.add_decorator(
                        decorator.id(),
                        decorator.location(),
                        decorator.requires(),
                        decorator.wraps().to_vec(),
                    );
                }
            }
        });

        match pending {
            Some(Pending::Provider(_, node)) => {
                graph.add_provider(node.id(), node.location(), node.requires(), node.produces());
            }
            Some(Pending::Decorator(_, decorator)) => {
                graph.add_decorator(
                    decorator.id(),
                    decorator.location(),
                    decorator.requires(),
                    decorator.wraps().to_vec(),
                );
            }
            None => {}
        }
        for key in graph.decorated_keys() {
            let chain = self.decorator_chain(&key, pending);
            graph.set_chain(key, chain);
        }
        graph
    }

    fn insert_node(&self, node: &Arc<Node>) {
        let mut providers = self.providers.write();
        for key in node.produces() {
            providers.entry(key).or_default().push(Arc::clone(node));
        }
    }

    pub(crate) fn insert_decorator(&self, decorator: &Arc<Decorator>) {
        let mut decorators = self.decorators.write();
        for key in decorator.wraps() {
            decorators.entry(key.clone()).or_default().push(Arc::clone(decorator));
        }
    }

    pub(crate) fn registry_lock(&self) -> MutexGuard<'_, ()> {
        self.shared.registry.lock()
    }

    /// Reject keys produced twice by one constructor, and plain or named
    /// keys already provided anywhere in the tree.
    fn check_keys(self: &Arc<Self>, keys: &[Key], location: &Location) -> Result<(), DigError> {
        let root = self.root();
        for (index, key) in keys.iter().enumerate() {
            if let Some(first) = keys[..index].iter().position(|earlier| earlier == key) {
                return Err(DigError::DuplicateBinding {
                    key: key.clone(),
                    location: location.clone(),
                    conflicts: vec![format!("result {first} of the same constructor")],
                });
            }
            if key.is_group() {
                continue;
            }
            let existing = root.value_providers(key);
            if !existing.is_empty() {
                return Err(DigError::DuplicateBinding {
                    key: key.clone(),
                    location: location.clone(),
                    conflicts: existing
                        .iter()
                        .map(|(_, node)| node.location().to_string())
                        .collect(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn register(self: &Arc<Self>, ctor: Constructor, options: &BindingOptions) -> Result<(), DigError> {
        let location = ctor.location().clone();
        options.validate(&location)?;
        let params = ctor.parameters()?;
        let results = ctor.results(options)?;
        if results.is_empty() {
            return Err(DigError::invalid(&location, "must provide at least one value"));
        }

        let _registry = self.registry_lock();
        let keys = results.keys();
        self.check_keys(&keys, &location)?;

        let node = Arc::new(Node::new(location, params, results, ctor.func()));
        if self.config().defer_acyclic_verification {
            self.mark_verified(false);
        } else {
            let graph = self.root().dependency_graph(Some(Pending::Provider(self, &node)));
            trace!("Checking {} participants for cycles", graph.len());
            if let Some(path) = graph.find_cycle() {
                debug!("Rejected {}: cycle {}", node.location(), path);
                return Err(DigError::CycleDetected { path });
            }
            self.mark_verified(true);
        }

        self.insert_node(&node);
        debug!(
            "Registered {} in scope '{}' providing {}",
            node.location(),
            self.label,
            keys.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        );
        Ok(())
    }
}

impl ContainerWriter for ScopeInner {
    fn set_value(&self, key: Key, value: Value) {
        self.values.write().insert(key, value);
    }

    fn submit_group_values(&self, key: Key, values: Vec<Value>) {
        self.groups.write().entry(key).or_default().extend(values);
    }
}

/// Handle to one registry in a scope tree.
///
/// Cloning the handle is cheap and refers to the same scope. Child scopes
/// are kept alive by their parent; the parent link is only used for upward
/// traversal.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// New root scope with the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ScopeConfig::default())
    }

    /// New root scope; groups are shuffled with an RNG built from `config`
    #[must_use]
    pub fn with_config(config: ScopeConfig) -> Self {
        let rng = config.make_rng();
        Self::from_parts(config, rng)
    }

    /// New root scope shuffling groups with `rng`
    #[must_use]
    pub fn with_rng(config: ScopeConfig, rng: impl RngCore + Send + 'static) -> Self {
        Self::from_parts(config, Box::new(rng))
    }

    fn from_parts(config: ScopeConfig, rng: Box<dyn RngCore + Send>) -> Self {
        let shared = Arc::new(TreeState::new(config, rng));
        Self {
            inner: Arc::new(ScopeInner::new(String::new(), None, shared)),
        }
    }

    fn from_inner(inner: Arc<ScopeInner>) -> Self {
        Self { inner }
    }

    /// Create a child scope. The label is only used in diagnostics.
    #[must_use]
    pub fn child(&self, label: impl Into<String>) -> Scope {
        let child = Arc::new(ScopeInner::new(
            label.into(),
            Some(Arc::downgrade(&self.inner)),
            Arc::clone(&self.inner.shared),
        ));
        self.inner.children.write().push(Arc::clone(&child));
        debug!("Created scope '{}' under '{}'", child.label(), self.inner.label());
        Self::from_inner(child)
    }

    /// Diagnostic label, empty for the root
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        self.inner.label()
    }

    /// Configuration shared by the whole tree
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ScopeConfig {
        self.inner.config()
    }

    /// Enclosing scope, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Scope> {
        self.inner.parent().map(Self::from_inner)
    }

    /// Root of the tree
    #[must_use]
    pub fn root(&self) -> Scope {
        Self::from_inner(self.inner.root())
    }

    /// Direct children, in creation order
    #[must_use]
    pub fn children(&self) -> Vec<Scope> {
        self.inner.children().into_iter().map(Self::from_inner).collect()
    }

    /// Register a constructor with default options
    ///
    /// # Errors
    /// See [`Scope::provide_with`].
    #[track_caller]
    pub fn provide<M, C: IntoConstructor<M>>(&self, ctor: C) -> Result<(), DigError> {
        self.provide_with(ctor, BindingOptions::default())
    }

    /// Register a constructor in this scope.
    ///
    /// Nothing is constructed until a value is requested through
    /// [`Scope::invoke`].
    ///
    /// # Errors
    /// - `InvalidConstructor` for malformed options or a constructor with no
    ///   results
    /// - `DuplicateBinding` if a produced plain or named key is already
    ///   provided anywhere in the tree
    /// - `CycleDetected` if the new provider closes a dependency cycle
    ///   (skipped when verification is deferred)
    #[track_caller]
    pub fn provide_with<M, C: IntoConstructor<M>>(&self, ctor: C, options: BindingOptions) -> Result<(), DigError> {
        let location = Location::caller(std::any::type_name::<C>());
        self.inner.register(ctor.into_constructor(location), &options)
    }

    /// Register a decorator with default options
    ///
    /// # Errors
    /// See [`Scope::decorate_with`].
    #[track_caller]
    pub fn decorate<M, C: IntoConstructor<M>>(&self, decorator: C) -> Result<(), DigError> {
        self.decorate_with(decorator, BindingOptions::default())
    }

    /// Rewrap keys owned by this scope or its descendants.
    ///
    /// Every result of `decorator` must also be one of its parameters. The
    /// name or group in `options` qualifies the results, as for
    /// [`Scope::provide_with`].
    ///
    /// # Errors
    /// - `DecoratorContractViolation` if the results are not among the
    ///   parameters, a key is rewrapped twice, or no provider of a key exists
    ///   at or below this scope
    /// - `CycleDetected` if the decorator would depend on its own output
    #[track_caller]
    pub fn decorate_with<M, C: IntoConstructor<M>>(&self, decorator: C, options: BindingOptions) -> Result<(), DigError> {
        let location = Location::caller(std::any::type_name::<C>());
        let decorator = Decorator::from_constructor(decorator.into_constructor(location), &options)?;
        decorator.attach(&self.inner)
    }

    /// Run `entry` with its parameters resolved from the root of the tree.
    ///
    /// # Errors
    /// - `MissingDependency` if a required parameter has no provider
    /// - `CycleDetected` if deferred verification finds a cycle
    /// - `InvocationFailed` if building an argument failed
    /// - `EntryFailed` carrying the entry function's own error
    #[track_caller]
    pub fn invoke<'a, M, E: IntoEntry<'a, M>>(&self, entry: E) -> Result<(), DigError> {
        let location = Location::caller(std::any::type_name::<E>());
        resolve::invoke(self.inner.root(), entry.into_entry(location))
    }

    /// Types provided at or below this scope, sorted by name
    #[must_use]
    pub fn known_types(&self) -> Vec<TypeTag> {
        let mut types = Vec::new();
        self.inner.walk(&mut |scope| {
            types.extend(scope.providers.read().keys().map(Key::type_tag));
        });
        types.sort();
        types.dedup();
        types
    }

    /// Whether `key` has been constructed anywhere in the tree
    #[must_use]
    pub fn is_resolved(&self, key: &Key) -> bool {
        let mut resolved = false;
        self.inner.root().walk(&mut |scope| {
            resolved |= scope.values.read().contains_key(key)
                || scope.groups.read().get(key).is_some_and(|values| !values.is_empty());
        });
        resolved
    }

    /// Whether the graph was checked since the last deferred registration
    #[inline]
    #[must_use]
    pub fn is_verified_acyclic(&self) -> bool {
        self.inner.is_verified_acyclic()
    }

    /// Missing-key report entry for `key`, with suggestions from the tree
    #[must_use]
    pub fn describe_missing(&self, key: &Key) -> Option<MissingKey> {
        let root = self.inner.root();
        (!root.has_provider(key)).then(|| root.missing(key))
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("label", &self.inner.label)
            .field("providers", &self.inner.providers.read().len())
            .field("children", &self.inner.children.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::inspect::{Dep, Multi};

    #[derive(Debug, Clone)]
    struct Db;

    fn new_db() -> anyhow::Result<Db> {
        Ok(Db)
    }

    #[test]
    fn scope_new_is_root() {
        let scope = Scope::new();
        assert_eq!(scope.label(), "");
        assert!(scope.parent().is_none());
        assert!(scope.children().is_empty());
        assert!(scope.is_verified_acyclic());
    }

    #[test]
    fn child_links_both_ways() {
        let root = Scope::new();
        let child = root.child("db");
        let grandchild = child.child("pool");
        assert_eq!(grandchild.parent().unwrap().label(), "db");
        assert_eq!(grandchild.root().label(), "");
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.children()[0].label(), "db");
    }

    #[test]
    fn provider_owner_prefers_shallowest() {
        let root = Scope::new();
        let a = root.child("a");
        let b = root.child("b");
        let deep = a.child("deep");
        deep.provide(new_db).unwrap();
        b.provide(|| anyhow::Ok(1u8)).unwrap();

        let owner = root.inner.provider_owner(&Key::of::<Db>()).unwrap();
        assert_eq!(owner.label(), "deep");
        assert!(b.inner.provider_owner(&Key::of::<Db>()).is_none());
    }

    #[test]
    fn known_types_sorted_below_scope() {
        let root = Scope::new();
        let child = root.child("c");
        root.provide(|| anyhow::Ok(2u64)).unwrap();
        child.provide(|| anyhow::Ok(true)).unwrap();
        child.provide(|| anyhow::Ok(1i8)).unwrap();

        let names: Vec<_> = root.known_types().iter().map(TypeTag::name).collect();
        assert_eq!(names, vec!["bool", "i8", "u64"]);
        let names: Vec<_> = child.known_types().iter().map(TypeTag::name).collect();
        assert_eq!(names, vec!["bool", "i8"]);
    }

    #[test]
    fn duplicate_in_same_constructor_rejected() {
        let scope = Scope::new();
        let err = scope.provide(Multi(|| anyhow::Ok((1u8, 2u8)))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateBinding);
        assert!(err.to_string().contains("result 0 of the same constructor"));
        assert!(scope.known_types().is_empty());
    }

    #[test]
    fn named_bindings_coexist() {
        let scope = Scope::new();
        scope.provide_with(new_db, BindingOptions::new().name("ro")).unwrap();
        scope.provide_with(new_db, BindingOptions::new().name("rw")).unwrap();
        let err = scope.provide_with(new_db, BindingOptions::new().name("ro")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateBinding);
    }

    #[test]
    fn suggestions_list_other_qualifiers() {
        let scope = Scope::new();
        scope.provide_with(new_db, BindingOptions::new().name("ro")).unwrap();
        let missing = scope.describe_missing(&Key::of::<Db>()).unwrap();
        assert_eq!(missing.suggestions, vec![Key::named::<Db>("ro")]);
        assert!(scope.describe_missing(&Key::named::<Db>("ro")).is_none());
    }

    #[test]
    fn deferred_mode_clears_verified_flag() {
        let scope = Scope::with_config(ScopeConfig::new().with_deferred_verification());
        scope.provide(new_db).unwrap();
        assert!(!scope.is_verified_acyclic());
        scope.invoke(|_db: Dep<Db>| {}).unwrap();
        assert!(scope.is_verified_acyclic());
    }
}
