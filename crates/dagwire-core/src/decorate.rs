//! Decorators
//!
//! A decorator rewraps keys that are already provided. It is indexed by the
//! scope it was registered in and applies to requests whose provider is owned
//! by that scope or one of its descendants. Providers are never replaced; the
//! decorator interposes when the key is read.

use crate::constructor::{Constructor, CtorFn, Inspect};
use crate::error::DigError;
use crate::key::Key;
use crate::options::BindingOptions;
use crate::plan::{Arg, Output, ParamPlan, ResultPlan};
use crate::resolve::Resolver;
use crate::scope::{Pending, ScopeInner};
use crate::types::{Location, NodeId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type Rewrapped = Arc<HashMap<Key, Arg>>;

pub(crate) struct Decorator {
    id: NodeId,
    location: Location,
    params: ParamPlan,
    results: ResultPlan,
    wraps: Vec<Key>,
    func: Arc<CtorFn>,
    outputs: RwLock<Option<Rewrapped>>,
}

impl Decorator {
    /// Check the rewrap contract: every result is also a parameter, at most
    /// once, and groups are returned as whole lists.
    pub(crate) fn from_constructor(ctor: Constructor, options: &BindingOptions) -> Result<Self, DigError> {
        let location = ctor.location().clone();
        options.validate(&location)?;
        if !options.aliases().is_empty() {
            return Err(DigError::decorator(&location, "decorators cannot declare aliases"));
        }

        let params = ctor.parameters()?;
        let results = ctor.results(options)?;
        if results.is_empty() {
            return Err(DigError::decorator(&location, "must decorate at least one value"));
        }

        let mut wraps: Vec<Key> = Vec::with_capacity(results.slots().len());
        for slot in results.slots() {
            if !params.keys().any(|key| *key == slot.key) {
                return Err(DigError::decorator(
                    &location,
                    format!("result {} must be among the decorator's parameters", slot.key),
                ));
            }
            if wraps.contains(&slot.key) {
                return Err(DigError::decorator(
                    &location,
                    format!("cannot decorate {} more than once", slot.key),
                ));
            }
            if slot.key.is_group() && !slot.flatten {
                return Err(DigError::decorator(
                    &location,
                    format!("decorated group {} must be returned as a flattened list", slot.key),
                ));
            }
            wraps.push(slot.key.clone());
        }

        Ok(Self {
            id: NodeId::new(),
            location,
            params,
            results,
            wraps,
            func: ctor.func(),
            outputs: RwLock::new(None),
        })
    }

    #[inline]
    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub(crate) fn location(&self) -> &Location {
        &self.location
    }

    pub(crate) fn requires(&self) -> Vec<Key> {
        self.params.keys().cloned().collect()
    }

    #[inline]
    pub(crate) fn wraps(&self) -> &[Key] {
        &self.wraps
    }

    /// Index the decorator in `scope` after checking every rewrapped key is
    /// owned at or below it and that no cycle runs through the decorator.
    ///
    /// Ownership is decided from the root, as at resolution: a group whose
    /// first contributor in breadth-first order sits outside `scope` is
    /// rejected even if `scope` holds other contributors.
    pub(crate) fn attach(self, scope: &Arc<ScopeInner>) -> Result<(), DigError> {
        let _registry = scope.registry_lock();

        let root = scope.root();
        for key in &self.wraps {
            match root.provider_owner(key) {
                None => {
                    return Err(DigError::decorator(
                        &self.location,
                        format!("no provider of {} at or below scope '{}'", key, scope.label()),
                    ));
                }
                Some(owner) if !scope.encloses(&owner) => {
                    return Err(DigError::decorator(
                        &self.location,
                        format!(
                            "{} is owned by scope '{}', outside scope '{}'",
                            key,
                            owner.label(),
                            scope.label()
                        ),
                    ));
                }
                Some(_) => {}
            }
        }

        let graph = root.dependency_graph(Some(Pending::Decorator(scope, &self)));
        if let Some(path) = graph.find_cycle_from(self.id) {
            debug!("Rejected decorator {}: cycle {}", self.location, path);
            return Err(DigError::CycleDetected { path });
        }

        let decorator = Arc::new(self);
        scope.insert_decorator(&decorator);
        debug!(
            "Registered decorator {} in scope '{}' for {}",
            decorator.location,
            scope.label(),
            decorator.wraps.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        );
        Ok(())
    }

    /// Rewrapped value of `key`, running the decorator on first use.
    ///
    /// Rewrapped keys are read from the inner part of the chain; every other
    /// parameter resolves normally.
    pub(crate) fn apply(&self, key: &Key, resolver: &Resolver) -> Result<Arg, DigError> {
        if let Some(outputs) = self.outputs.read().as_ref() {
            return self.lookup(outputs, key);
        }

        resolver.shallow_check(&self.params, &self.location)?;
        let args = self
            .params
            .slots()
            .iter()
            .map(|slot| {
                if self.wraps.contains(&slot.key) {
                    resolver.resolve_key(&slot.key, Some(self.id), &self.location)
                } else {
                    resolver.resolve_param(slot, &self.location)
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| DigError::InvocationFailed {
                location: self.location.clone(),
                source: Box::new(source),
            })?;

        let outputs = (self.func)(args).map_err(|source| DigError::ConstructionFailed {
            location: self.location.clone(),
            source,
        })?;
        if outputs.len() != self.results.slots().len() {
            return Err(DigError::invalid(
                &self.location,
                format!(
                    "returned {} values but declares {} results",
                    outputs.len(),
                    self.results.slots().len()
                ),
            ));
        }

        let rewrapped: HashMap<Key, Arg> = self
            .results
            .slots()
            .iter()
            .zip(outputs)
            .map(|(slot, output)| {
                let arg = match output {
                    Output::Value(value) => Arg::Value(value),
                    Output::Many(values) => Arg::Group(values),
                };
                (slot.key.clone(), arg)
            })
            .collect();

        let stored = {
            let mut slot = self.outputs.write();
            Arc::clone(slot.get_or_insert_with(|| Arc::new(rewrapped)))
        };
        debug!("Applied decorator {} at {}", self.location.short_name(), self.location);
        self.lookup(&stored, key)
    }

    fn lookup(&self, outputs: &HashMap<Key, Arg>, key: &Key) -> Result<Arg, DigError> {
        outputs.get(key).cloned().ok_or_else(|| {
            DigError::decorator(&self.location, format!("{key} is not rewrapped by this decorator"))
        })
    }
}
