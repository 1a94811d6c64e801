//! Patient use-case service.
//!
//! # Responsibility
//! - Register and read patients through the clinic repository.
//! - Delete patients through the lifecycle pipeline with the cascade bound.
//!
//! # Invariants
//! - The cascade catalog is checked against the store before the service exists.
//! - A patient delete removes every catalogued dependent or nothing.
//! - Deleting an already-deleted patient is an outcome, not an error.

use crate::cascade::executor::{CascadeError, CascadeExecutor};
use crate::cascade::hook::bind_patient_cascade;
use crate::model::clinic::collections::PATIENTS;
use crate::model::clinic::{NewPatient, Patient};
use crate::model::record::{RecordId, RecordRef};
use crate::repo::clinic_repo::{ClinicRepository, RepoError};
use crate::store::lifecycle::{DeleteError, DeletePipeline};
use crate::store::{RecordStore, StoreError};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Result of a patient delete that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientDeleteOutcome {
    /// Patient and all dependents were removed.
    Deleted,
    /// Patient did not exist; nothing was changed.
    AlreadyDeleted,
}

/// Service error for patient use-cases.
#[derive(Debug)]
pub enum PatientServiceError {
    /// Target patient does not exist.
    PatientNotFound(RecordId),
    /// Persistence-layer failure.
    Repo(RepoError),
    /// Delete was aborted and rolled back.
    Delete(DeleteError),
    /// Store does not match the cascade catalog.
    Store(StoreError),
    /// Internal consistency mismatch between write and read-back.
    InconsistentState(&'static str),
}

impl PatientServiceError {
    /// Cascade failure behind an aborted delete, if the cascade caused it.
    pub fn cascade_error(&self) -> Option<&CascadeError> {
        match self {
            Self::Delete(err) => err.hook_error::<CascadeError>(),
            _ => None,
        }
    }
}

impl Display for PatientServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PatientNotFound(id) => write!(f, "patient not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Delete(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "cascade catalog check failed: {err}"),
            Self::InconsistentState(details) => write!(f, "inconsistent patient state: {details}"),
        }
    }
}

impl Error for PatientServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Delete(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for PatientServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(record) if record.collection == PATIENTS => {
                Self::PatientNotFound(record.id)
            }
            other => Self::Repo(other),
        }
    }
}

impl From<DeleteError> for PatientServiceError {
    fn from(value: DeleteError) -> Self {
        Self::Delete(value)
    }
}

/// Patient service facade over a repository and a record store.
pub struct PatientService<R: ClinicRepository, S: RecordStore> {
    repo: R,
    pipeline: DeletePipeline<S>,
}

impl<R: ClinicRepository, S: RecordStore> PatientService<R, S> {
    /// Creates a service whose patient deletes cascade through `executor`.
    ///
    /// # Errors
    /// - `Store` when a catalogued collection or field is missing from `store`.
    pub fn try_new(
        repo: R,
        store: S,
        executor: Arc<CascadeExecutor>,
    ) -> Result<Self, PatientServiceError> {
        if let Err(err) = store.check_catalog(executor.catalog()) {
            error!(
                "event=patient_service_init module=service status=error error_code=catalog_mismatch error={err}"
            );
            return Err(PatientServiceError::Store(err));
        }
        let mut pipeline = DeletePipeline::new(store);
        bind_patient_cascade(&mut pipeline, executor);
        Ok(Self { repo, pipeline })
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn pipeline(&self) -> &DeletePipeline<S> {
        &self.pipeline
    }

    /// Registers one patient and returns the stored read model.
    pub fn register_patient(&self, patient: &NewPatient) -> Result<Patient, PatientServiceError> {
        let id = self.repo.create_patient(patient)?;
        info!("event=patient_register module=service status=ok patient={id}");
        self.repo
            .get_patient(id)?
            .ok_or(PatientServiceError::InconsistentState(
                "registered patient not found in read-back",
            ))
    }

    pub fn get_patient(&self, id: RecordId) -> Result<Option<Patient>, PatientServiceError> {
        Ok(self.repo.get_patient(id)?)
    }

    /// Deletes one patient and every record that depends on it.
    ///
    /// # Errors
    /// - `Delete` when the cascade or the patient delete failed; nothing was
    ///   removed.
    pub fn delete_patient(&self, id: RecordId) -> Result<PatientDeleteOutcome, PatientServiceError> {
        match self.pipeline.delete(&RecordRef::new(PATIENTS, id)) {
            Ok(()) => Ok(PatientDeleteOutcome::Deleted),
            Err(err) if err.is_not_found() => Ok(PatientDeleteOutcome::AlreadyDeleted),
            Err(err) => Err(err.into()),
        }
    }
}
