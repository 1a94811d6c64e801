//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and store calls into use-case level APIs.
//! - Keep callers decoupled from storage and cascade details.

pub mod patient_service;

pub use patient_service::{PatientDeleteOutcome, PatientService, PatientServiceError};
