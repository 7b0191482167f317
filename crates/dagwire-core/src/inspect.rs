//! Typed front end
//!
//! Turns ordinary Rust functions into [`Constructor`]s and [`Entry`]
//! functions. Parameters are declared with wrapper types:
//!
//! - [`Dep<T>`] requires the plain binding of `T`
//! - [`Named<T, N>`] requires `T` registered under the name `N::NAME`
//! - [`Optional<P>`] resolves to `None` when nothing provides `P`
//! - [`Group<T, G>`] collects every contribution to the group `G::NAME`
//!
//! A function returning `anyhow::Result<T>` produces one value of type `T`.
//! Wrap it in [`Multi`] to produce several values from a tuple, or to
//! contribute each element of a [`Flatten`] list to a group separately.
//!
//! ```rust,ignore
//! binding_name!(pub ReadOnly = "ro");
//!
//! fn open(cfg: Dep<Config>, ro: Named<Arc<Db>, ReadOnly>) -> anyhow::Result<Arc<Service>> {
//!     Ok(Arc::new(Service::new(cfg.0, ro.0)))
//! }
//! ```

use crate::constructor::Constructor;
use crate::key::{Key, TypeTag};
use crate::plan::{Arg, Output, ParamPlan, ParamSlot, ResultSpec};
use crate::types::{Location, Value};
use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

/// Compile-time name or group label
pub trait Name: 'static {
    /// The label used in the key
    const NAME: &'static str;
}

/// Declare a unit type implementing [`Name`]
#[macro_export]
macro_rules! binding_name {
    ($vis:vis $ident:ident = $value:literal) => {
        #[derive(Debug, Clone, Copy)]
        $vis struct $ident;

        impl $crate::inspect::Name for $ident {
            const NAME: &'static str = $value;
        }
    };
}

/// A parameter type the graph knows how to supply
pub trait Injectable: Sized + 'static {
    /// The key this parameter reads and whether it may be absent
    fn slot() -> ParamSlot;

    /// Convert the resolved argument
    ///
    /// # Errors
    /// When the argument does not have the shape or type the slot declared.
    fn from_arg(arg: Arg) -> anyhow::Result<Self>;
}

/// A parameter bound to exactly one value
pub trait Single: Sized + 'static {
    /// Key of the single value
    fn key() -> Key;

    /// Clone the stored value out of its type-erased form
    ///
    /// # Errors
    /// When the stored value has another type.
    fn from_value(value: &Value) -> anyhow::Result<Self>;
}

fn downcast<T: Clone + 'static>(value: &Value) -> anyhow::Result<T> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("stored value is not a {}", type_name::<T>()))
}

fn single_from_arg<P: Single>(arg: Arg) -> anyhow::Result<P> {
    match arg {
        Arg::Value(value) => P::from_value(&value),
        other => anyhow::bail!("expected a value for {}, got {}", P::key(), other.describe()),
    }
}

/// Plain dependency on `T`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dep<T>(pub T);

impl<T> Dep<T> {
    /// Unwrap the value
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Clone + Send + Sync + 'static> Single for Dep<T> {
    fn key() -> Key {
        Key::of::<T>()
    }

    fn from_value(value: &Value) -> anyhow::Result<Self> {
        downcast(value).map(Dep)
    }
}

/// Dependency on `T` registered under `N::NAME`
#[derive(Debug, Clone)]
pub struct Named<T, N>(pub T, PhantomData<fn() -> N>);

impl<T, N> Named<T, N> {
    /// Wrap a value read under `N::NAME`
    #[inline]
    pub fn new(value: T) -> Self {
        Self(value, PhantomData)
    }

    /// Unwrap the value
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Clone + Send + Sync + 'static, N: Name> Single for Named<T, N> {
    fn key() -> Key {
        Key::named::<T>(N::NAME)
    }

    fn from_value(value: &Value) -> anyhow::Result<Self> {
        downcast(value).map(Named::new)
    }
}

macro_rules! impl_injectable_single {
    ($ty:ident < $($gen:ident),* >) => {
        impl<$($gen),*> Injectable for $ty<$($gen),*>
        where
            $ty<$($gen),*>: Single,
        {
            fn slot() -> ParamSlot {
                ParamSlot::required(<Self as Single>::key())
            }

            fn from_arg(arg: Arg) -> anyhow::Result<Self> {
                single_from_arg(arg)
            }
        }
    };
}

impl_injectable_single!(Dep<T>);
impl_injectable_single!(Named<T, N>);

/// `P` if something provides it, `None` otherwise
#[derive(Debug, Clone)]
pub struct Optional<P>(pub Option<P>);

impl<P> Optional<P> {
    /// Unwrap the value, `None` when nothing provides it
    #[inline]
    pub fn into_inner(self) -> Option<P> {
        self.0
    }
}

impl<P: Single> Injectable for Optional<P> {
    fn slot() -> ParamSlot {
        ParamSlot::optional(P::key())
    }

    fn from_arg(arg: Arg) -> anyhow::Result<Self> {
        match arg {
            Arg::Absent => Ok(Self(None)),
            other => single_from_arg(other).map(|value| Self(Some(value))),
        }
    }
}

/// Every contribution to the group `G::NAME`, in unspecified order
#[derive(Debug, Clone)]
pub struct Group<T, G>(pub Vec<T>, PhantomData<fn() -> G>);

impl<T, G> Group<T, G> {
    /// Wrap the members of `G::NAME`
    #[inline]
    pub fn new(values: Vec<T>) -> Self {
        Self(values, PhantomData)
    }

    /// Unwrap the members
    #[inline]
    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

impl<T: Clone + Send + Sync + 'static, G: Name> Injectable for Group<T, G> {
    fn slot() -> ParamSlot {
        ParamSlot::required(Key::group::<T>(G::NAME))
    }

    fn from_arg(arg: Arg) -> anyhow::Result<Self> {
        match arg {
            Arg::Group(values) => values
                .iter()
                .map(downcast::<T>)
                .collect::<anyhow::Result<Vec<_>>>()
                .map(Self::new),
            other => anyhow::bail!(
                "expected a group for {}, got {}",
                Key::group::<T>(G::NAME),
                other.describe()
            ),
        }
    }
}

/// Several results of one constructor
pub trait Outputs: Send + Sync + 'static {
    /// Declared results, in order
    fn specs() -> Vec<ResultSpec>;
    /// Type-erase the results, one [`Output`] per spec
    fn into_outputs(self) -> Vec<Output>;
}

/// A list whose elements are contributed to a group one by one
#[derive(Debug, Clone, Default)]
pub struct Flatten<T>(pub Vec<T>);

impl<T: Send + Sync + 'static> Outputs for Flatten<T> {
    fn specs() -> Vec<ResultSpec> {
        vec![ResultSpec::flattened(TypeTag::of::<T>())]
    }

    fn into_outputs(self) -> Vec<Output> {
        vec![Output::Many(
            self.0.into_iter().map(|value| Arc::new(value) as Value).collect(),
        )]
    }
}

macro_rules! impl_outputs_tuple {
    ($($out:ident),+) => {
        impl<$($out: Send + Sync + 'static),+> Outputs for ($($out,)+) {
            fn specs() -> Vec<ResultSpec> {
                vec![$(ResultSpec::single(TypeTag::of::<$out>())),+]
            }

            #[allow(non_snake_case)]
            fn into_outputs(self) -> Vec<Output> {
                let ($($out,)+) = self;
                vec![$(Output::Value(Arc::new($out))),+]
            }
        }
    };
}

impl_outputs_tuple!(A, B);
impl_outputs_tuple!(A, B, C);
impl_outputs_tuple!(A, B, C, D);

/// Marks a function whose return value is an [`Outputs`] set
#[derive(Debug, Clone, Copy)]
pub struct Multi<F>(pub F);

/// Conversion into a type-erased [`Constructor`]
pub trait IntoConstructor<Marker> {
    /// Erase the callable, recording where it was registered
    fn into_constructor(self, location: Location) -> Constructor;
}

impl IntoConstructor<()> for Constructor {
    fn into_constructor(self, _location: Location) -> Constructor {
        self
    }
}

fn next_arg(args: &mut impl Iterator<Item = Arg>) -> anyhow::Result<Arg> {
    args.next()
        .ok_or_else(|| anyhow::anyhow!("fewer arguments than declared parameters"))
}

macro_rules! impl_into_constructor {
    ($($param:ident),*) => {
        impl<Func, Out, $($param,)*> IntoConstructor<fn($($param,)*) -> Out> for Func
        where
            Func: Fn($($param),*) -> anyhow::Result<Out> + Send + Sync + 'static,
            Out: Send + Sync + 'static,
            $($param: Injectable,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_constructor(self, location: Location) -> Constructor {
                let params = ParamPlan::new(vec![$(<$param as Injectable>::slot()),*]);
                let outputs = vec![ResultSpec::single(TypeTag::of::<Out>())];
                let func = self;
                Constructor::new(params, outputs, location, move |args: Vec<Arg>| {
                    let mut args = args.into_iter();
                    $(let $param = <$param as Injectable>::from_arg(next_arg(&mut args)?)?;)*
                    let out = func($($param),*)?;
                    Ok(vec![Output::Value(Arc::new(out))])
                })
            }
        }

        impl<Func, Out, $($param,)*> IntoConstructor<Multi<fn($($param,)*) -> Out>> for Multi<Func>
        where
            Func: Fn($($param),*) -> anyhow::Result<Out> + Send + Sync + 'static,
            Out: Outputs,
            $($param: Injectable,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_constructor(self, location: Location) -> Constructor {
                let params = ParamPlan::new(vec![$(<$param as Injectable>::slot()),*]);
                let Multi(func) = self;
                Constructor::new(params, Out::specs(), location, move |args: Vec<Arg>| {
                    let mut args = args.into_iter();
                    $(let $param = <$param as Injectable>::from_arg(next_arg(&mut args)?)?;)*
                    Ok(func($($param),*)?.into_outputs())
                })
            }
        }
    };
}

impl_into_constructor!();
impl_into_constructor!(A1);
impl_into_constructor!(A1, A2);
impl_into_constructor!(A1, A2, A3);
impl_into_constructor!(A1, A2, A3, A4);
impl_into_constructor!(A1, A2, A3, A4, A5);
impl_into_constructor!(A1, A2, A3, A4, A5, A6);

/// What an entry function may return
pub trait EntryOutcome {
    /// Normalize to a result
    ///
    /// # Errors
    /// The entry function's own error.
    fn into_result(self) -> anyhow::Result<()>;
}

impl EntryOutcome for () {
    fn into_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl EntryOutcome for anyhow::Result<()> {
    fn into_result(self) -> anyhow::Result<()> {
        self
    }
}

/// Outer error: arguments could not be converted. Inner: the entry's result.
type EntryFn<'a> = dyn FnOnce(Vec<Arg>) -> anyhow::Result<anyhow::Result<()>> + 'a;

/// A function run once against the graph by [`Scope::invoke`](crate::Scope::invoke)
pub struct Entry<'a> {
    params: ParamPlan,
    location: Location,
    func: Box<EntryFn<'a>>,
}

impl<'a> Entry<'a> {
    /// Parameters the entry function reads
    #[inline]
    #[must_use]
    pub fn params(&self) -> &ParamPlan {
        &self.params
    }

    /// Where the entry function was invoked
    #[inline]
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub(crate) fn call(self, args: Vec<Arg>) -> anyhow::Result<anyhow::Result<()>> {
        (self.func)(args)
    }
}

impl std::fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("params", &self.params)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Conversion into an [`Entry`]
pub trait IntoEntry<'a, Marker> {
    /// Erase the function, recording where it was invoked
    fn into_entry(self, location: Location) -> Entry<'a>;
}

macro_rules! impl_into_entry {
    ($($param:ident),*) => {
        impl<'a, Func, Ret, $($param,)*> IntoEntry<'a, fn($($param,)*) -> Ret> for Func
        where
            Func: FnOnce($($param),*) -> Ret + 'a,
            Ret: EntryOutcome,
            $($param: Injectable,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_entry(self, location: Location) -> Entry<'a> {
                let params = ParamPlan::new(vec![$(<$param as Injectable>::slot()),*]);
                let func = self;
                Entry {
                    params,
                    location,
                    func: Box::new(move |args: Vec<Arg>| {
                        let mut args = args.into_iter();
                        $(let $param = <$param as Injectable>::from_arg(next_arg(&mut args)?)?;)*
                        Ok(func($($param),*).into_result())
                    }),
                }
            }
        }
    };
}

impl_into_entry!();
impl_into_entry!(A1);
impl_into_entry!(A1, A2);
impl_into_entry!(A1, A2, A3);
impl_into_entry!(A1, A2, A3, A4);
impl_into_entry!(A1, A2, A3, A4, A5);
impl_into_entry!(A1, A2, A3, A4, A5, A6);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructor::Inspect;
    use crate::options::BindingOptions;

    binding_name!(ReadOnly = "ro");
    binding_name!(Handlers = "handlers");

    #[derive(Debug, Clone, PartialEq)]
    struct Config(u32);

    fn loc() -> Location {
        Location::caller("tests::ctor")
    }

    fn value<T: Send + Sync + 'static>(v: T) -> Arg {
        Arg::Value(Arc::new(v))
    }

    fn new_port(cfg: Dep<Config>, extra: Optional<Named<u32, ReadOnly>>) -> anyhow::Result<u16> {
        let extra = extra.0.map_or(0, Named::into_inner);
        Ok(u16::try_from(cfg.0 .0 + extra)?)
    }

    #[test]
    fn fn_plans_follow_signature() {
        let ctor = new_port.into_constructor(loc());
        let params = ctor.parameters().unwrap();
        assert_eq!(
            params.slots(),
            &[
                ParamSlot::required(Key::of::<Config>()),
                ParamSlot::optional(Key::named::<u32>("ro")),
            ]
        );
        let results = ctor.results(&BindingOptions::new()).unwrap();
        assert_eq!(results.keys(), vec![Key::of::<u16>()]);
    }

    #[test]
    fn fn_constructor_converts_arguments() {
        let ctor = new_port.into_constructor(loc());
        let out = (ctor.func())(vec![value(Config(8)), Arg::Absent]).unwrap();
        match &out[..] {
            [Output::Value(v)] => assert_eq!(v.downcast_ref::<u16>(), Some(&8)),
            other => panic!("unexpected outputs {other:?}"),
        }

        let out = (ctor.func())(vec![value(Config(8)), value(2u32)]).unwrap();
        match &out[..] {
            [Output::Value(v)] => assert_eq!(v.downcast_ref::<u16>(), Some(&10)),
            other => panic!("unexpected outputs {other:?}"),
        }
    }

    #[test]
    fn wrong_argument_shape_is_an_error() {
        let ctor = new_port.into_constructor(loc());
        let err = (ctor.func())(vec![Arg::Group(vec![]), Arg::Absent]).unwrap_err();
        assert!(err.to_string().contains("expected a value"));
    }

    #[test]
    fn multi_tuple_outputs() {
        let ctor = Multi(|| anyhow::Ok((1u8, "two", 3u64))).into_constructor(loc());
        assert_eq!(
            ctor.results(&BindingOptions::new()).unwrap().keys(),
            vec![Key::of::<u8>(), Key::of::<&'static str>(), Key::of::<u64>()]
        );
        assert_eq!((ctor.func())(vec![]).unwrap().len(), 3);
    }

    #[test]
    fn multi_flatten_contributes_elements() {
        let ctor = Multi(|| anyhow::Ok(Flatten(vec![1u8, 2, 3]))).into_constructor(loc());
        let plan = ctor.results(&BindingOptions::new().group("nums")).unwrap();
        assert!(plan.slots()[0].flatten);
        match &(ctor.func())(vec![]).unwrap()[..] {
            [Output::Many(values)] => assert_eq!(values.len(), 3),
            other => panic!("unexpected outputs {other:?}"),
        }
    }

    #[test]
    fn group_param_collects_values() {
        let group = Group::<u8, Handlers>::from_arg(Arg::Group(vec![Arc::new(1u8), Arc::new(2u8)])).unwrap();
        assert_eq!(group.into_inner(), vec![1, 2]);
        assert_eq!(Group::<u8, Handlers>::slot().key, Key::group::<u8>("handlers"));
    }

    #[test]
    fn entry_borrows_from_caller() {
        let mut seen = None;
        let entry = (|cfg: Dep<Config>| seen = Some(cfg.0)).into_entry(loc());
        assert_eq!(entry.params().len(), 1);
        entry.call(vec![value(Config(4))]).unwrap().unwrap();
        assert_eq!(seen, Some(Config(4)));
    }

    #[test]
    fn entry_error_is_returned_inside() {
        let entry = (|| -> anyhow::Result<()> { anyhow::bail!("boom") }).into_entry(loc());
        let inner = entry.call(vec![]).unwrap();
        assert_eq!(inner.unwrap_err().to_string(), "boom");
    }
}
