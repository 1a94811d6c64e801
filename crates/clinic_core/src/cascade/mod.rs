//! Referential cascade engine.
//!
//! # Responsibility
//! - Describe which collections depend on which roots (`catalog`).
//! - Delete a root and all of its dependents atomically (`executor`).
//! - Run the cascade from the store's before-delete lifecycle (`hook`).

pub mod catalog;
pub mod executor;
pub mod hook;

pub use catalog::{CascadeRule, CatalogError, DependencyCatalog, DependencyEntry};
pub use executor::{CascadeError, CascadeExecutor, CascadeReport, CollectionRemoval};
pub use hook::{bind_cascade, bind_patient_cascade, CascadeHook};
