//! dagwire core
//!
//! Dependency-injection graph engine with hierarchical scopes.
//!
//! # Overview
//!
//! Constructors declare the values they consume and produce. Nothing runs at
//! registration; values are built lazily when an entry function asks for
//! them, and every constructor runs at most once per scope tree.
//!
//! - **Scope**: a registry in a tree of registries. Providers registered
//!   anywhere in the tree are visible to requests made anywhere in it.
//! - **Key**: type plus optional name or group
//! - **Decorators**: rewrap an already provided value for requests whose
//!   provider lives at or below the decorating scope
//! - **Groups**: many producers contribute to one list, returned in a
//!   randomized order
//!
//! # Example
//!
//! ```rust
//! use dagwire_core::prelude::*;
//! use std::sync::Arc;
//!
//! struct Config {
//!     url: String,
//! }
//!
//! struct Db {
//!     url: String,
//! }
//!
//! let scope = Scope::new();
//! scope.provide(|| anyhow::Ok(Arc::new(Config { url: "mem://".into() })))?;
//! scope.provide(|cfg: Dep<Arc<Config>>| {
//!     anyhow::Ok(Arc::new(Db { url: cfg.0.url.clone() }))
//! })?;
//!
//! scope.invoke(|db: Dep<Arc<Db>>| assert_eq!(db.0.url, "mem://"))?;
//! # Ok::<(), dagwire_core::DigError>(())
//! ```

pub mod config;
pub mod constructor;
pub mod cycle;
mod decorate;
pub mod error;
pub mod inspect;
pub mod key;
mod node;
pub mod options;
pub mod plan;
mod resolve;
mod scope;
mod staging;
pub mod types;

// Re-exports
pub use config::ScopeConfig;
pub use constructor::{Constructor, Inspect};
pub use cycle::{CyclePath, CycleStep};
pub use error::{DigError, ErrorKind, MissingKey};
pub use inspect::{
    Dep, Entry, EntryOutcome, Flatten, Group, Injectable, IntoConstructor, IntoEntry, Multi, Name, Named,
    Optional, Outputs, Single,
};
pub use key::{Key, Qualifier, TypeTag};
pub use options::{Alias, BindingOptions, DISALLOWED_DELIMITER};
pub use plan::{Arg, Output, ParamPlan, ParamSlot, ResultPlan, ResultSlot, ResultSpec};
pub use scope::Scope;
pub use types::{Location, NodeId, Value};

/// Prelude module for common imports
pub mod prelude {
    //! Registration, invocation and parameter wrappers
    pub use crate::binding_name;
    pub use crate::{
        BindingOptions, Dep, DigError, ErrorKind, Flatten, Group, Key, Multi, Name, Named, Optional, Scope,
        ScopeConfig,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
