//! # tenantclone-engine
//!
//! Clones one organization's dataset into another organization.
//!
//! A [`ClonePlan`] orders the cloneable entity types so every foreign-key
//! target is cloned before the rows that reference it. The
//! [`CloneOrchestrator`] walks the plan, runs the generic [`EntityCloner`]
//! for each type, and records the old-id to new-id mapping that later types
//! use to re-point their references.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tenantclone_core::CloneDestination;
//! use tenantclone_engine::{default_catalog, CloneOptions, CloneOrchestrator, ClonePlan, EngineConfig};
//!
//! let plan = ClonePlan::new(default_catalog())?;
//! let orchestrator = CloneOrchestrator::new(Arc::new(db.entities), plan, EngineConfig::from_env());
//! let job = orchestrator
//!     .clone_organization(source, CloneDestination::New { name: "Acme Copy".into() }, CloneOptions::default())
//!     .await;
//! println!("{}", job.status);
//! ```

pub mod cancel;
pub mod catalog;
pub mod cloner;
pub mod config;
pub mod orchestrator;
pub mod plan;
pub mod sanitizer;
pub mod scope;
pub mod uniqueness;
pub mod verification;

pub use cancel::CancelHandle;
pub use catalog::default_catalog;
pub use cloner::{EntityCloner, PhaseContext, PhaseOutcome};
pub use config::EngineConfig;
pub use orchestrator::{CloneOptions, CloneOrchestrator};
pub use plan::ClonePlan;
pub use sanitizer::sanitize_external_references;
pub use uniqueness::{destination_suffix, normalize_slug, UniquenessResolver};
pub use verification::verify_clone;
