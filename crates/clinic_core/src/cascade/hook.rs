//! Binds the cascade executor to the delete lifecycle.

use crate::cascade::executor::CascadeExecutor;
use crate::model::clinic::collections::PATIENTS;
use crate::model::record::RecordRef;
use crate::store::lifecycle::{BeforeDeleteHook, DeletePipeline, HookError};
use crate::store::{RecordStore, RecordTx};
use std::sync::Arc;

const HOOK_NAME: &str = "cascade";

/// Before-delete hook that purges a record's dependents in the pipeline's
/// transaction. The pipeline itself deletes the record afterwards.
#[derive(Debug, Clone)]
pub struct CascadeHook {
    executor: Arc<CascadeExecutor>,
}

impl CascadeHook {
    pub fn new(executor: Arc<CascadeExecutor>) -> Self {
        Self { executor }
    }
}

impl BeforeDeleteHook for CascadeHook {
    fn name(&self) -> &str {
        HOOK_NAME
    }

    fn before_delete(&self, tx: &dyn RecordTx, record: &RecordRef) -> Result<(), HookError> {
        self.executor.purge_dependents(tx, record)?;
        Ok(())
    }
}

/// Registers the cascade hook for deletes in `collection`.
pub fn bind_cascade<S: RecordStore>(
    pipeline: &mut DeletePipeline<S>,
    collection: &str,
    executor: Arc<CascadeExecutor>,
) {
    pipeline.on_before_delete(collection, Arc::new(CascadeHook::new(executor)));
}

/// Registers the cascade hook for patient deletes.
pub fn bind_patient_cascade<S: RecordStore>(
    pipeline: &mut DeletePipeline<S>,
    executor: Arc<CascadeExecutor>,
) {
    bind_cascade(pipeline, PATIENTS, executor);
}
