//! Parameter and result plans
//!
//! The boundary between the graph engine and the signature inspector. A
//! constructor is described by a flat ordered list of required keys
//! ([`ParamPlan`]) and a flat ordered list of produced keys ([`ResultPlan`]);
//! the engine never looks at the callable itself.

use crate::key::{Key, TypeTag};
use crate::options::AliasFn;
use crate::types::Value;
use std::fmt;
use std::sync::Arc;

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSlot {
    /// Key the argument is resolved from
    pub key: Key,
    /// A missing provider yields [`Arg::Absent`] instead of an error
    pub optional: bool,
}

impl ParamSlot {
    /// Parameter that must have a provider
    #[inline]
    #[must_use]
    pub fn required(key: Key) -> Self {
        Self {
            key,
            optional: false,
        }
    }

    /// Parameter that may be absent
    #[inline]
    #[must_use]
    pub fn optional(key: Key) -> Self {
        Self {
            key,
            optional: true,
        }
    }
}

/// Ordered parameters of a constructor or entry function
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamPlan {
    slots: Vec<ParamSlot>,
}

impl ParamPlan {
    /// Plan from slots in argument order
    #[inline]
    #[must_use]
    pub fn new(slots: Vec<ParamSlot>) -> Self {
        Self { slots }
    }

    /// Slots in argument order
    #[inline]
    #[must_use]
    pub fn slots(&self) -> &[ParamSlot] {
        &self.slots
    }

    /// Number of parameters
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the function takes no parameters
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Every key this plan depends on, optional or not
    pub fn keys(&self) -> impl Iterator<Item = &Key> + '_ {
        self.slots.iter().map(|slot| &slot.key)
    }
}

impl FromIterator<ParamSlot> for ParamPlan {
    fn from_iter<I: IntoIterator<Item = ParamSlot>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// One produced type, before binding options are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultSpec {
    /// Produced type, or element type when flattened
    pub ty: TypeTag,
    /// The output is a list whose elements are contributed one by one.
    /// Only meaningful for group bindings.
    pub flatten: bool,
}

impl ResultSpec {
    /// One value of `ty`
    #[inline]
    #[must_use]
    pub fn single(ty: TypeTag) -> Self {
        Self { ty, flatten: false }
    }

    /// A list of `ty` contributed element by element
    #[inline]
    #[must_use]
    pub fn flattened(ty: TypeTag) -> Self {
        Self { ty, flatten: true }
    }
}

/// An alias key and how to derive its value
#[derive(Clone)]
pub struct AliasSlot {
    /// Key the converted value is published under
    pub key: Key,
    pub(crate) convert: Arc<AliasFn>,
}

impl fmt::Debug for AliasSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AliasSlot").field("key", &self.key).finish_non_exhaustive()
    }
}

/// One produced key, with the keys duplicated from it
#[derive(Debug, Clone)]
pub struct ResultSlot {
    /// Key the value is published under
    pub key: Key,
    /// Further keys derived from the same value
    pub aliases: Vec<AliasSlot>,
    /// Mirrors [`ResultSpec::flatten`]
    pub flatten: bool,
}

/// Ordered outputs of a constructor, positionally matching its return values
#[derive(Debug, Clone, Default)]
pub struct ResultPlan {
    slots: Vec<ResultSlot>,
}

impl ResultPlan {
    /// Plan from slots in return order
    #[inline]
    #[must_use]
    pub fn new(slots: Vec<ResultSlot>) -> Self {
        Self { slots }
    }

    /// Slots in return order
    #[inline]
    #[must_use]
    pub fn slots(&self) -> &[ResultSlot] {
        &self.slots
    }

    /// Every produced key including alias duplicates, in plan order
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        let mut keys = Vec::new();
        for slot in &self.slots {
            keys.push(slot.key.clone());
            keys.extend(slot.aliases.iter().map(|alias| alias.key.clone()));
        }
        keys
    }

    /// Whether nothing is produced
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A resolved argument handed to a constructor
#[derive(Clone)]
pub enum Arg {
    /// Singleton value
    Value(Value),
    /// Optional parameter with no provider
    Absent,
    /// Full contribution list of a group
    Group(Vec<Value>),
}

impl Arg {
    /// Variant name, for diagnostics
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Absent => "absent",
            Self::Group(_) => "group",
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Arg::Value(..)"),
            Self::Absent => f.write_str("Arg::Absent"),
            Self::Group(values) => write!(f, "Arg::Group(len={})", values.len()),
        }
    }
}

/// One value returned by a constructor
#[derive(Clone)]
pub enum Output {
    /// Single value
    Value(Value),
    /// Elements of a flattened group result
    Many(Vec<Value>),
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Output::Value(..)"),
            Self::Many(values) => write!(f, "Output::Many(len={})", values.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Alias;

    #[test]
    fn result_plan_keys_include_aliases() {
        let alias = Alias::new::<u8, u16>(u16::from);
        let plan = ResultPlan::new(vec![ResultSlot {
            key: Key::named::<u8>("x"),
            aliases: vec![AliasSlot {
                key: Key::named::<u16>("x"),
                convert: alias.converter(),
            }],
            flatten: false,
        }]);
        assert_eq!(plan.keys(), vec![Key::named::<u8>("x"), Key::named::<u16>("x")]);
    }

    #[test]
    fn param_plan_collects() {
        let plan: ParamPlan = vec![
            ParamSlot::required(Key::of::<u8>()),
            ParamSlot::optional(Key::of::<u16>()),
        ]
        .into_iter()
        .collect();
        assert_eq!(plan.len(), 2);
        assert!(plan.slots()[1].optional);
        assert_eq!(plan.keys().count(), 2);
    }
}
