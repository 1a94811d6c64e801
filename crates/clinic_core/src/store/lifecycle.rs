//! Delete lifecycle pipeline.
//!
//! # Responsibility
//! - Let components register before-delete hooks per collection.
//! - Run hooks and the triggering delete inside one transaction.
//!
//! # Invariants
//! - Hooks run in registration order, inside the same transaction as the delete.
//! - The triggering delete is the pipeline's explicit final step; it runs only
//!   after every hook for the collection returned `Ok`.
//! - Any hook error, delete error or commit error leaves the store unchanged.

use crate::model::record::RecordRef;
use crate::store::{RecordStore, RecordTx, StoreError};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// Error type returned by before-delete hooks.
pub type HookError = Box<dyn Error + Send + Sync + 'static>;

/// Handler invoked before a record of a bound collection is deleted.
pub trait BeforeDeleteHook: Send + Sync {
    /// Stable name used in logs and errors.
    fn name(&self) -> &str;

    /// Runs inside the delete transaction. Returning an error aborts the delete.
    fn before_delete(&self, tx: &dyn RecordTx, record: &RecordRef) -> Result<(), HookError>;
}

/// Errors from `DeletePipeline::delete`.
#[derive(Debug)]
pub enum DeleteError {
    /// Transaction could not be opened.
    Begin(StoreError),
    /// A before-delete hook rejected the delete.
    Hook {
        hook: String,
        record: RecordRef,
        source: HookError,
    },
    /// Target record does not exist.
    NotFound(RecordRef),
    /// Target record could not be deleted.
    Delete { record: RecordRef, source: StoreError },
    /// Transaction could not be committed.
    Commit(StoreError),
}

impl DeleteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns the hook failure downcast to `E`, if a hook failed with `E`.
    pub fn hook_error<E: Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Hook { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl Display for DeleteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Begin(err) => write!(f, "failed to open delete transaction: {err}"),
            Self::Hook {
                hook,
                record,
                source,
            } => write!(f, "hook `{hook}` rejected delete of {record}: {source}"),
            Self::NotFound(record) => write!(f, "record not found: {record}"),
            Self::Delete { record, source } => write!(f, "failed to delete {record}: {source}"),
            Self::Commit(err) => write!(f, "failed to commit delete: {err}"),
        }
    }
}

impl Error for DeleteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Begin(err) | Self::Commit(err) => Some(err),
            Self::Hook { source, .. } => Some(source.as_ref()),
            Self::Delete { source, .. } => Some(source),
            Self::NotFound(_) => None,
        }
    }
}

/// Delete entry point of a record store with before-delete hooks.
pub struct DeletePipeline<S> {
    store: S,
    hooks: BTreeMap<String, Vec<Arc<dyn BeforeDeleteHook>>>,
}

impl<S: RecordStore> DeletePipeline<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            hooks: BTreeMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registers `hook` to run before every delete in `collection`.
    pub fn on_before_delete(
        &mut self,
        collection: impl Into<String>,
        hook: Arc<dyn BeforeDeleteHook>,
    ) {
        self.hooks.entry(collection.into()).or_default().push(hook);
    }

    /// Number of hooks bound to `collection`.
    pub fn hook_count(&self, collection: &str) -> usize {
        self.hooks.get(collection).map_or(0, Vec::len)
    }

    /// Deletes `record` after running its collection's hooks, atomically.
    pub fn delete(&self, record: &RecordRef) -> Result<(), DeleteError> {
        let started_at = Instant::now();
        let tx = self.store.begin_transaction().map_err(DeleteError::Begin)?;

        for hook in self.hooks.get(&record.collection).into_iter().flatten() {
            if let Err(source) = hook.before_delete(&tx, record) {
                error!(
                    "event=record_delete module=store status=error record={} hook={} duration_ms={} error_code=hook_rejected error={}",
                    record,
                    hook.name(),
                    started_at.elapsed().as_millis(),
                    source
                );
                rollback_quietly(tx, record);
                return Err(DeleteError::Hook {
                    hook: hook.name().to_string(),
                    record: record.clone(),
                    source,
                });
            }
        }

        if let Err(source) = tx.delete_record(record) {
            rollback_quietly(tx, record);
            if source.is_not_found() {
                warn!("event=record_delete module=store status=skipped record={record} reason=not_found");
                return Err(DeleteError::NotFound(record.clone()));
            }
            return Err(DeleteError::Delete {
                record: record.clone(),
                source,
            });
        }

        tx.commit().map_err(DeleteError::Commit)?;
        info!(
            "event=record_delete module=store status=ok record={} hooks={} duration_ms={}",
            record,
            self.hook_count(&record.collection),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }
}

pub(crate) fn rollback_quietly<T: RecordTx>(tx: T, record: &RecordRef) {
    if let Err(err) = tx.rollback() {
        // The connection discards the transaction on drop either way.
        warn!("event=tx_rollback module=store status=error record={record} error={err}");
    }
}
