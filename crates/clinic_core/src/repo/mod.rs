//! Repository layer for clinic records.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes validate requests before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `Validation`) in
//!   addition to DB transport errors.

pub mod clinic_repo;

pub use clinic_repo::{ClinicRepository, RepoError, RepoResult, SqliteClinicRepository};
