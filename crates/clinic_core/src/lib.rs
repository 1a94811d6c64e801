//! Core domain logic for the dental clinic record store.
//! Owns referential integrity on delete: removing a patient removes every
//! record that points at it, atomically.

pub mod cascade;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use cascade::{
    bind_patient_cascade, CascadeError, CascadeExecutor, CascadeHook, CascadeReport, CascadeRule,
    CatalogError, CollectionRemoval, DependencyCatalog, DependencyEntry,
};
pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_config, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::record::{RecordId, RecordRef};
pub use repo::{ClinicRepository, RepoError, RepoResult, SqliteClinicRepository};
pub use service::{PatientDeleteOutcome, PatientService, PatientServiceError};
pub use store::{
    BeforeDeleteHook, DeleteError, DeletePipeline, FieldFilter, RecordStore, RecordTx,
    SqliteRecordStore, StoreError,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
