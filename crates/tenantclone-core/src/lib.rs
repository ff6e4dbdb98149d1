//! # tenantclone-core
//!
//! Core types, descriptors, and traits for the tenant clone engine.
//!
//! This crate holds the data structures every other tenantclone crate shares:
//! the entity-type descriptors that drive cloning, the per-run id mapping,
//! clone job results, the error type, and the storage traits.

pub mod defaults;
pub mod descriptor;
pub mod error;
pub mod identifiers;
pub mod logging;
pub mod mapping;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use descriptor::{
    Cardinality, CloneableEntityType, ColumnOverride, ForeignKey, ForeignKeyTarget,
    MissingTargetPolicy, OverrideValue, Scope, ScopeLink, UniqueColumn, UniqueKind,
};
pub use error::{Error, Result};
pub use mapping::{IdMapping, MappingEntry, PhaseMappings};
pub use models::*;
pub use traits::*;
