//! Argument assembly and top-level invocation
//!
//! Every request is answered from the root of the tree: providers are found
//! anywhere below it, decorators from the owning scope upward.

use crate::error::DigError;
use crate::inspect::Entry;
use crate::key::Key;
use crate::plan::{Arg, ParamPlan, ParamSlot};
use crate::scope::ScopeInner;
use crate::types::{Location, NodeId};
use std::sync::Arc;
use tracing::{debug, trace};

pub(crate) struct Resolver {
    root: Arc<ScopeInner>,
}

impl Resolver {
    pub(crate) fn new(root: Arc<ScopeInner>) -> Self {
        Self { root }
    }

    /// Existence check for every required single key, without building
    /// anything. Reports all missing keys at once.
    pub(crate) fn shallow_check(&self, params: &ParamPlan, location: &Location) -> Result<(), DigError> {
        let missing: Vec<_> = params
            .slots()
            .iter()
            .filter(|slot| !slot.optional && !slot.key.is_group())
            .filter(|slot| !self.root.has_provider(&slot.key))
            .map(|slot| self.root.missing(&slot.key))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DigError::MissingDependency {
                location: location.clone(),
                missing,
            })
        }
    }

    /// Verify the whole tree once if registration left it unverified
    pub(crate) fn ensure_acyclic(&self) -> Result<(), DigError> {
        if self.root.is_verified_acyclic() {
            return Ok(());
        }
        let graph = self.root.dependency_graph(None);
        trace!("Verifying {} participants for cycles", graph.len());
        if let Some(path) = graph.find_cycle() {
            return Err(DigError::CycleDetected { path });
        }
        self.root.mark_verified(true);
        Ok(())
    }

    /// One argument per slot, in plan order
    pub(crate) fn build_args(&self, params: &ParamPlan, location: &Location) -> Result<Vec<Arg>, DigError> {
        params
            .slots()
            .iter()
            .map(|slot| self.resolve_param(slot, location))
            .collect()
    }

    pub(crate) fn resolve_param(&self, slot: &ParamSlot, location: &Location) -> Result<Arg, DigError> {
        if !slot.key.is_group() && !self.root.has_provider(&slot.key) {
            if slot.optional {
                return Ok(Arg::Absent);
            }
            return Err(self.missing(&slot.key, location));
        }
        self.resolve_key(&slot.key, None, location)
    }

    /// Value of `key` as seen through its decorator chain, stopping before
    /// the decorator `upto` when one is given.
    pub(crate) fn resolve_key(&self, key: &Key, upto: Option<NodeId>, location: &Location) -> Result<Arg, DigError> {
        let mut chain = self.root.decorators_for(key);
        if let Some(upto) = upto {
            let position = chain.iter().position(|decorator| decorator.id() == upto);
            chain.truncate(position.unwrap_or(0));
        }

        match chain.last() {
            Some(outermost) => outermost.apply(key, self),
            None if key.is_group() => self.resolve_group(key),
            None => self.resolve_value(key, location),
        }
    }

    fn resolve_value(&self, key: &Key, location: &Location) -> Result<Arg, DigError> {
        let Some((owner, node)) = self.root.value_providers(key).into_iter().next() else {
            return Err(self.missing(key, location));
        };
        node.call(&owner, self)?;
        owner
            .value(key)
            .map(Arg::Value)
            .ok_or_else(|| self.missing(key, location))
    }

    fn resolve_group(&self, key: &Key) -> Result<Arg, DigError> {
        for (owner, node) in self.root.value_providers(key) {
            node.call(&owner, self)?;
        }
        let mut values = self.root.group_values(key);
        self.root.shuffle(&mut values);
        trace!("Resolved group {} with {} values", key, values.len());
        Ok(Arg::Group(values))
    }

    fn missing(&self, key: &Key, location: &Location) -> DigError {
        DigError::MissingDependency {
            location: location.clone(),
            missing: vec![self.root.missing(key)],
        }
    }
}

/// Run an entry function against the tree rooted at `root`
pub(crate) fn invoke(root: Arc<ScopeInner>, entry: Entry<'_>) -> Result<(), DigError> {
    let location = entry.location().clone();
    debug!("Invoking {}", location);

    let resolver = Resolver::new(root);
    resolver.shallow_check(entry.params(), &location)?;
    resolver.ensure_acyclic()?;

    let args = resolver
        .build_args(entry.params(), &location)
        .map_err(|source| DigError::InvocationFailed {
            location: location.clone(),
            source: Box::new(source),
        })?;

    match entry.call(args) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(DigError::EntryFailed(err)),
        Err(err) => Err(DigError::InvocationFailed {
            source: Box::new(DigError::invalid(&location, err.to_string())),
            location,
        }),
    }
}
