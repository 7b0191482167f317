//! Binding identity
//!
//! A [`Key`] names one bindable slot in the graph: a [`TypeTag`] plus at most
//! one discriminator. Plain keys identify a singleton, named keys let several
//! producers of one type coexist, group keys collect contributions from any
//! number of producers.

use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Comparable handle for a Rust type.
///
/// Equality and hashing use the [`TypeId`] only; the name is carried for
/// diagnostics and ordering.
#[derive(Debug, Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Tag for `T`
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Underlying [`TypeId`]
    #[inline]
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Rust type name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for TypeTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeTag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(other.name).then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Discriminator of a key. Name and group are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Qualifier {
    /// No discriminator
    Plain,
    /// One of several producers of a type
    Named(Arc<str>),
    /// Contribution to a value group
    Group(Arc<str>),
}

/// Identity of a bindable value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    ty: TypeTag,
    qualifier: Qualifier,
}

impl Key {
    /// Plain key for `T`
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::plain(TypeTag::of::<T>())
    }

    /// Named key for `T`
    #[must_use]
    pub fn named<T: ?Sized + 'static>(name: &str) -> Self {
        Self::with_qualifier(TypeTag::of::<T>(), Some(name), None)
    }

    /// Group key for `T`
    #[must_use]
    pub fn group<T: ?Sized + 'static>(group: &str) -> Self {
        Self::with_qualifier(TypeTag::of::<T>(), None, Some(group))
    }

    /// Plain key for a type known only at runtime
    #[inline]
    #[must_use]
    pub fn plain(ty: TypeTag) -> Self {
        Self {
            ty,
            qualifier: Qualifier::Plain,
        }
    }

    /// Build a key from optional name and group.
    ///
    /// Empty strings count as absent. If both are given the group wins;
    /// callers validate exclusivity before reaching here.
    #[must_use]
    pub fn with_qualifier(ty: TypeTag, name: Option<&str>, group: Option<&str>) -> Self {
        let qualifier = match (name.filter(|n| !n.is_empty()), group.filter(|g| !g.is_empty())) {
            (_, Some(group)) => Qualifier::Group(Arc::from(group)),
            (Some(name), None) => Qualifier::Named(Arc::from(name)),
            (None, None) => Qualifier::Plain,
        };
        Self { ty, qualifier }
    }

    /// Same discriminator, different type. Used for alias duplication.
    #[must_use]
    pub fn retyped(&self, ty: TypeTag) -> Self {
        Self {
            ty,
            qualifier: self.qualifier.clone(),
        }
    }

    /// Type component of the key
    #[inline]
    #[must_use]
    pub fn type_tag(&self) -> TypeTag {
        self.ty
    }

    /// Name or group component of the key
    #[inline]
    #[must_use]
    pub fn qualifier(&self) -> &Qualifier {
        &self.qualifier
    }

    /// Name of a named key
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match &self.qualifier {
            Qualifier::Named(name) => Some(name.as_ref()),
            _ => None,
        }
    }

    /// Group of a group key
    #[must_use]
    pub fn group_name(&self) -> Option<&str> {
        match &self.qualifier {
            Qualifier::Group(group) => Some(group.as_ref()),
            _ => None,
        }
    }

    /// Whether the key collects group contributions
    #[inline]
    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self.qualifier, Qualifier::Group(_))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Qualifier::Plain => write!(f, "{}", self.ty),
            Qualifier::Named(name) => write!(f, "{}[name={:?}]", self.ty, name),
            Qualifier::Group(group) => write!(f, "{}[group={:?}]", self.ty, group),
        }
    }
}
