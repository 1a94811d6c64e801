//! Clinic domain model.
//!
//! # Responsibility
//! - Define record identity shared by the record store and the cascade engine.
//! - Define clinic read/write models persisted by the clinic repository.
//!
//! # Invariants
//! - Every record is identified by a store-assigned `RecordId`.
//! - Deletion is a hard delete; dependents go with their patient.

pub mod clinic;
pub mod record;
