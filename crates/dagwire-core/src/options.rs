//! Registration options: name, group, aliases.

use crate::error::DigError;
use crate::key::TypeTag;
use crate::types::{Location, Value};
use std::fmt;
use std::sync::Arc;

/// Character that may not appear in names or groups
pub const DISALLOWED_DELIMITER: char = '`';

pub(crate) type AliasFn = dyn Fn(&Value) -> Option<Value> + Send + Sync;

/// Publishes a produced value under a second type.
///
/// Typically used to expose a concrete `Arc<Impl>` as `Arc<dyn Trait>`.
#[derive(Clone)]
pub struct Alias {
    source: TypeTag,
    target: TypeTag,
    convert: Arc<AliasFn>,
}

impl Alias {
    /// Publish an `S` result as `T` through `convert`
    #[must_use]
    pub fn new<S, T>(convert: fn(S) -> T) -> Self
    where
        S: Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        Self {
            source: TypeTag::of::<S>(),
            target: TypeTag::of::<T>(),
            convert: Arc::new(move |value: &Value| {
                value
                    .downcast_ref::<S>()
                    .map(|source| Arc::new(convert(source.clone())) as Value)
            }),
        }
    }

    /// Type of the produced result
    #[inline]
    #[must_use]
    pub fn source(&self) -> TypeTag {
        self.source
    }

    /// Type the result is also published as
    #[inline]
    #[must_use]
    pub fn target(&self) -> TypeTag {
        self.target
    }

    pub(crate) fn converter(&self) -> Arc<AliasFn> {
        Arc::clone(&self.convert)
    }
}

impl fmt::Debug for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alias")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Options applied to every value a constructor produces
#[derive(Debug, Clone, Default)]
pub struct BindingOptions {
    name: Option<String>,
    group: Option<String>,
    aliases: Vec<Alias>,
}

impl BindingOptions {
    /// No name, group or aliases
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every result under `name`
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Contribute every result to `group`
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Also publish the `S` result as `T`
    #[must_use]
    pub fn alias<S, T>(mut self, convert: fn(S) -> T) -> Self
    where
        S: Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.aliases.push(Alias::new(convert));
        self
    }

    /// The name, if set and not empty
    #[must_use]
    pub fn name_ref(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }

    /// The group, if set and not empty
    #[must_use]
    pub fn group_ref(&self) -> Option<&str> {
        self.group.as_deref().filter(|g| !g.is_empty())
    }

    /// Declared aliases, in order
    #[must_use]
    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    /// Check the options are consistent with each other.
    ///
    /// # Errors
    /// `InvalidConstructor` when name and group are combined, aliases are
    /// used with a group, a name or group contains [`DISALLOWED_DELIMITER`],
    /// or an alias targets its own source type.
    pub fn validate(&self, location: &Location) -> Result<(), DigError> {
        if let Some(group) = self.group_ref() {
            if let Some(name) = self.name_ref() {
                return Err(DigError::invalid(
                    location,
                    format!("cannot use named values with value groups: name:{name:?} provided with group:{group:?}"),
                ));
            }
            if !self.aliases.is_empty() {
                return Err(DigError::invalid(
                    location,
                    format!("cannot use aliases with value groups: aliases provided with group:{group:?}"),
                ));
            }
        }

        if let Some(name) = self.name_ref() {
            if name.contains(DISALLOWED_DELIMITER) {
                return Err(DigError::invalid(
                    location,
                    format!("invalid name {name:?}: names cannot contain {DISALLOWED_DELIMITER}"),
                ));
            }
        }
        if let Some(group) = self.group_ref() {
            if group.contains(DISALLOWED_DELIMITER) {
                return Err(DigError::invalid(
                    location,
                    format!("invalid group {group:?}: group names cannot contain {DISALLOWED_DELIMITER}"),
                ));
            }
        }

        for alias in &self.aliases {
            if alias.source == alias.target {
                return Err(DigError::invalid(
                    location,
                    format!("invalid alias of {} to itself", alias.source),
                ));
            }
        }
        Ok(())
    }
}
