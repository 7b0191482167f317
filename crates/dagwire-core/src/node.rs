//! Registered constructors and their one-shot invocation

use crate::constructor::CtorFn;
use crate::error::DigError;
use crate::key::Key;
use crate::plan::{ParamPlan, ResultPlan};
use crate::resolve::Resolver;
use crate::scope::ScopeInner;
use crate::staging::StagingWriter;
use crate::types::{Location, NodeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// A constructor as the graph sees it.
///
/// Created once at registration and never removed. Its outputs live in the
/// owning scope's value and group maps once `called` is set.
pub(crate) struct Node {
    id: NodeId,
    location: Location,
    params: ParamPlan,
    results: ResultPlan,
    func: Arc<CtorFn>,
    called: AtomicBool,
}

impl Node {
    pub(crate) fn new(location: Location, params: ParamPlan, results: ResultPlan, func: Arc<CtorFn>) -> Self {
        Self {
            id: NodeId::new(),
            location,
            params,
            results,
            func,
            called: AtomicBool::new(false),
        }
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

    pub(crate) fn produces(&self) -> Vec<Key> {
        self.results.keys()
    }

    #[inline]
    pub(crate) fn is_called(&self) -> bool {
        self.called.load(Ordering::Acquire)
    }

    /// Run the constructor unless it already ran, committing its outputs
    /// into `owner`.
    ///
    /// Arguments are resolved before the constructor runs; a failure there is
    /// wrapped with this constructor's location. Outputs are staged and only
    /// committed if the constructor succeeded and no concurrent call committed
    /// first.
    pub(crate) fn call(&self, owner: &ScopeInner, resolver: &Resolver) -> Result<(), DigError> {
        if self.is_called() {
            return Ok(());
        }

        resolver.shallow_check(&self.params, &self.location)?;
        let args = resolver
            .build_args(&self.params, &self.location)
            .map_err(|source| DigError::InvocationFailed {
                location: self.location.clone(),
                source: Box::new(source),
            })?;
        if self.is_called() {
            return Ok(());
        }

        trace!("Calling {} at {}", self.location.short_name(), self.location);
        let outputs = (self.func)(args).map_err(|source| DigError::ConstructionFailed {
            location: self.location.clone(),
            source,
        })?;

        let mut staging = StagingWriter::new();
        staging.stage(&self.results, outputs, &self.location)?;

        let _commit = owner.commit_lock();
        if self.is_called() {
            debug!("Discarding outputs of {}: already committed", self.location);
            return Ok(());
        }
        let staged = staging.len();
        staging.commit(owner);
        self.called.store(true, Ordering::Release);
        debug!(
            "Committed {} values from {} into scope '{}'",
            staged,
            self.location,
            owner.label()
        );
        Ok(())
    }
}
