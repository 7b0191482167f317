//! Error types for dagwire
//!
//! Every failure is returned to the caller of the operation that detected it.
//! Nothing is retried: bindings and constructors are treated as
//! deterministic configuration.

use crate::cycle::CyclePath;
use crate::key::Key;
use crate::types::Location;
use std::fmt;

/// Main dagwire error type
#[derive(Debug, thiserror::Error)]
pub enum DigError {
    /// Not a usable constructor, or malformed binding options
    #[error("invalid constructor {location}: {reason}")]
    InvalidConstructor {
        /// The rejected constructor
        location: Location,
        /// What is wrong with it
        reason: String,
    },

    /// A plain or named key is already provided somewhere in the tree
    #[error("cannot provide {key} from {location}: already provided by {}", join(.conflicts))]
    DuplicateBinding {
        /// The key provided twice
        key: Key,
        /// The rejected constructor
        location: Location,
        /// Where the key is already provided
        conflicts: Vec<String>,
    },

    /// Decorator does not satisfy the rewrap contract
    #[error("invalid decorator {location}: {reason}")]
    DecoratorContractViolation {
        /// The rejected decorator
        location: Location,
        /// Which part of the contract is broken
        reason: String,
    },

    /// A producer depends on its own output
    #[error("cycle detected in dependency graph: {path}")]
    CycleDetected {
        /// The dependency chain closing the cycle
        path: CyclePath,
    },

    /// Required keys with no provider anywhere in the tree
    #[error("missing dependencies for {location}: {}", join(.missing))]
    MissingDependency {
        /// The function whose parameters are missing
        location: Location,
        /// Every missing key, in parameter order
        missing: Vec<MissingKey>,
    },

    /// User constructor or decorator returned an error
    #[error("constructor {location} failed: {source}")]
    ConstructionFailed {
        /// The failing constructor
        location: Location,
        /// The underlying error
        #[source]
        source: anyhow::Error,
    },

    /// Arguments for a constructor, decorator or entry function could not be
    /// assembled
    #[error("could not build arguments for {location}: {source}")]
    InvocationFailed {
        /// The function whose arguments failed
        location: Location,
        /// The underlying error
        #[source]
        source: Box<DigError>,
    },

    /// The entry function's own error, unchanged
    #[error(transparent)]
    EntryFailed(anyhow::Error),

    /// Configuration could not be parsed
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Classification of [`DigError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`DigError::InvalidConstructor`]
    InvalidConstructor,
    /// See [`DigError::DuplicateBinding`]
    DuplicateBinding,
    /// See [`DigError::DecoratorContractViolation`]
    DecoratorContractViolation,
    /// See [`DigError::CycleDetected`]
    CycleDetected,
    /// See [`DigError::MissingDependency`]
    MissingDependency,
    /// See [`DigError::ConstructionFailed`]
    ConstructionFailed,
    /// See [`DigError::InvocationFailed`]
    InvocationFailed,
    /// See [`DigError::EntryFailed`]
    EntryFailed,
    /// See [`DigError::Config`]
    Config,
}

impl DigError {
    /// Variant of this error, without its payload
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConstructor { .. } => ErrorKind::InvalidConstructor,
            Self::DuplicateBinding { .. } => ErrorKind::DuplicateBinding,
            Self::DecoratorContractViolation { .. } => ErrorKind::DecoratorContractViolation,
            Self::CycleDetected { .. } => ErrorKind::CycleDetected,
            Self::MissingDependency { .. } => ErrorKind::MissingDependency,
            Self::ConstructionFailed { .. } => ErrorKind::ConstructionFailed,
            Self::InvocationFailed { .. } => ErrorKind::InvocationFailed,
            Self::EntryFailed(_) => ErrorKind::EntryFailed,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Errors only `provide` and `decorate` return.
    ///
    /// Any rejected registration leaves the graph untouched, including one
    /// rejected with `CycleDetected`. That kind is not listed here because
    /// deferred verification also reports it from `invoke`.
    #[inline]
    #[must_use]
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConstructor { .. }
                | Self::DuplicateBinding { .. }
                | Self::DecoratorContractViolation { .. }
        )
    }

    /// The innermost error that was not produced by dagwire itself.
    ///
    /// Unwraps invocation and construction wrappers down to the error a user
    /// constructor or entry function returned. Errors detected by the engine
    /// are their own root cause.
    #[must_use]
    pub fn root_cause(&self) -> &(dyn std::error::Error + 'static) {
        match self {
            Self::InvocationFailed { source, .. } => source.root_cause(),
            Self::ConstructionFailed { source, .. } => match source.downcast_ref::<DigError>() {
                Some(inner) => inner.root_cause(),
                None => &**source,
            },
            Self::EntryFailed(source) => &**source,
            other => other,
        }
    }

    pub(crate) fn invalid(location: &Location, reason: impl Into<String>) -> Self {
        Self::InvalidConstructor {
            location: location.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn decorator(location: &Location, reason: impl Into<String>) -> Self {
        Self::DecoratorContractViolation {
            location: location.clone(),
            reason: reason.into(),
        }
    }
}

/// One required key that has no provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingKey {
    /// The key nobody provides
    pub key: Key,
    /// Keys of the same type registered under another name or group
    pub suggestions: Vec<Key>,
}

impl fmt::Display for MissingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing type: {}", self.key)?;
        if !self.suggestions.is_empty() {
            write!(f, " (did you mean {}?)", join(&self.suggestions))?;
        }
        Ok(())
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Db;

    fn loc() -> Location {
        Location::caller("tests::new_db")
    }

    #[test]
    fn missing_dependency_lists_every_key() {
        let err = DigError::MissingDependency {
            location: loc(),
            missing: vec![
                MissingKey {
                    key: Key::of::<u8>(),
                    suggestions: vec![],
                },
                MissingKey {
                    key: Key::named::<u16>("port"),
                    suggestions: vec![Key::of::<u16>()],
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("missing type: u8"));
        assert!(msg.contains("missing type: u16[name=\"port\"] (did you mean u16?)"));
        assert_eq!(err.kind(), ErrorKind::MissingDependency);
    }

    #[test]
    fn root_cause_unwraps_construction_chain() {
        let inner = DigError::ConstructionFailed {
            location: loc(),
            source: anyhow::anyhow!("disk on fire"),
        };
        let outer = DigError::InvocationFailed {
            location: loc(),
            source: Box::new(inner),
        };
        assert_eq!(outer.root_cause().to_string(), "disk on fire");
        assert_eq!(outer.kind(), ErrorKind::InvocationFailed);
    }

    #[test]
    fn engine_errors_are_their_own_root_cause() {
        let err = DigError::invalid(&loc(), "no outputs");
        assert!(err.root_cause().to_string().contains("no outputs"));
        assert!(err.is_registration_error());
    }

    #[test]
    fn duplicate_binding_names_conflicts() {
        let err = DigError::DuplicateBinding {
            key: Key::of::<Db>(),
            location: loc(),
            conflicts: vec!["a (x.rs:1)".into(), "b (y.rs:2)".into()],
        };
        assert!(err.to_string().ends_with("already provided by a (x.rs:1); b (y.rs:2)"));
    }
}
