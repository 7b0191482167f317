//! Type-erased constructors and the inspector interface.

use crate::error::DigError;
use crate::key::Key;
use crate::options::BindingOptions;
use crate::plan::{AliasSlot, Arg, Output, ParamPlan, ResultPlan, ResultSlot, ResultSpec};
use crate::types::Location;
use std::fmt;
use std::sync::Arc;

pub(crate) type CtorFn = dyn Fn(Vec<Arg>) -> anyhow::Result<Vec<Output>> + Send + Sync;

/// Reads a constructor's signature as flat plans.
///
/// This is the only view the graph has of a callable.
pub trait Inspect {
    /// Ordered parameters, each flagged optional or required
    ///
    /// # Errors
    /// `InvalidConstructor` when the signature cannot be expressed as a plan.
    fn parameters(&self) -> Result<ParamPlan, DigError>;

    /// Ordered produced keys after applying `options`, with alias duplicates
    ///
    /// # Errors
    /// `InvalidConstructor` when the options do not fit the signature.
    fn results(&self, options: &BindingOptions) -> Result<ResultPlan, DigError>;

    /// Where the callable was registered
    fn location(&self) -> &Location;
}

/// A callable with its declared parameters and outputs
#[derive(Clone)]
pub struct Constructor {
    params: ParamPlan,
    outputs: Vec<ResultSpec>,
    location: Location,
    func: Arc<CtorFn>,
}

impl Constructor {
    /// Build a constructor from explicit plans.
    ///
    /// `func` receives one [`Arg`] per parameter slot and must return one
    /// [`Output`] per entry of `outputs`.
    pub fn new<F>(params: ParamPlan, outputs: Vec<ResultSpec>, location: Location, func: F) -> Self
    where
        F: Fn(Vec<Arg>) -> anyhow::Result<Vec<Output>> + Send + Sync + 'static,
    {
        Self {
            params,
            outputs,
            location,
            func: Arc::new(func),
        }
    }

    pub(crate) fn func(&self) -> Arc<CtorFn> {
        Arc::clone(&self.func)
    }
}

impl Inspect for Constructor {
    fn parameters(&self) -> Result<ParamPlan, DigError> {
        for slot in self.params.slots() {
            if slot.key.is_group() && slot.optional {
                return Err(DigError::invalid(
                    &self.location,
                    format!("value groups cannot be optional: {}", slot.key),
                ));
            }
        }
        Ok(self.params.clone())
    }

    fn results(&self, options: &BindingOptions) -> Result<ResultPlan, DigError> {
        let group = options.group_ref();
        let mut slots = Vec::with_capacity(self.outputs.len());

        for spec in &self.outputs {
            if spec.flatten && group.is_none() {
                return Err(DigError::invalid(
                    &self.location,
                    format!("flattened results of {} require a value group", spec.ty),
                ));
            }
            let key = Key::with_qualifier(spec.ty, options.name_ref(), group);
            let aliases = options
                .aliases()
                .iter()
                .filter(|alias| alias.source() == spec.ty)
                .map(|alias| AliasSlot {
                    key: key.retyped(alias.target()),
                    convert: alias.converter(),
                })
                .collect();
            slots.push(ResultSlot {
                key,
                aliases,
                flatten: spec.flatten,
            });
        }

        for alias in options.aliases() {
            if !self.outputs.iter().any(|spec| spec.ty == alias.source()) {
                return Err(DigError::invalid(
                    &self.location,
                    format!(
                        "cannot alias {} as {}: {} is not produced by this constructor",
                        alias.source(),
                        alias.target(),
                        alias.source()
                    ),
                ));
            }
        }

        Ok(ResultPlan::new(slots))
    }

    fn location(&self) -> &Location {
        &self.location
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("params", &self.params)
            .field("outputs", &self.outputs)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}
