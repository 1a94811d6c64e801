//! Cascade executor: transactional delete of a root and all its dependents.
//!
//! # Responsibility
//! - Find and delete every catalogued dependent of a root record.
//! - Delete the root and commit, all inside one store transaction.
//!
//! # Invariants
//! - Either the root and every dependent are gone after commit, or nothing changed.
//! - Dependents are deleted before the records they reference.
//! - Dependent lookups have no result-count limit.
//! - A missing root is reported as `RootNotFound`, never as a failure of the store.

use crate::cascade::catalog::DependencyCatalog;
use crate::model::record::{RecordId, RecordRef};
use crate::store::lifecycle::rollback_quietly;
use crate::store::{FieldFilter, RecordStore, RecordTx, StoreError};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// Number of records removed from one collection during a cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionRemoval {
    pub collection: String,
    pub count: usize,
}

/// Outcome of a successful cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub root: RecordRef,
    /// Per-collection counts in first-visit order. Nested visits aggregate.
    pub removed: Vec<CollectionRemoval>,
}

impl CascadeReport {
    fn new(root: RecordRef) -> Self {
        Self {
            root,
            removed: Vec::new(),
        }
    }

    /// Dependents removed, excluding the root itself.
    pub fn total_removed(&self) -> usize {
        self.removed.iter().map(|removal| removal.count).sum()
    }

    pub fn removed_from(&self, collection: &str) -> usize {
        self.removed
            .iter()
            .find(|removal| removal.collection == collection)
            .map_or(0, |removal| removal.count)
    }

    fn add(&mut self, collection: &str, count: usize) {
        match self
            .removed
            .iter_mut()
            .find(|removal| removal.collection == collection)
        {
            Some(removal) => removal.count += count,
            None => self.removed.push(CollectionRemoval {
                collection: collection.to_string(),
                count,
            }),
        }
    }
}

/// Errors from a cascade. Every variant leaves the store unchanged.
#[derive(Debug)]
pub enum CascadeError {
    /// Transaction could not be opened.
    BeginFailure(StoreError),
    /// Dependent lookup failed.
    QueryFailure {
        collection: String,
        source: StoreError,
    },
    /// A dependent or the root could not be deleted.
    DeleteFailure {
        record: RecordRef,
        source: StoreError,
    },
    /// The transaction could not be committed.
    CommitFailure(StoreError),
    /// Root record does not exist; usually an already-completed delete.
    RootNotFound(RecordRef),
}

impl CascadeError {
    /// True only for `RootNotFound`.
    pub fn is_already_deleted(&self) -> bool {
        matches!(self, Self::RootNotFound(_))
    }

    /// Whether callers should treat this as a failed delete.
    pub fn is_fatal(&self) -> bool {
        !self.is_already_deleted()
    }

    /// Whether the store gave up waiting on a lock held elsewhere.
    pub fn is_timeout(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_busy)
    }

    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::BeginFailure(source) | Self::CommitFailure(source) => Some(source),
            Self::QueryFailure { source, .. } | Self::DeleteFailure { source, .. } => Some(source),
            Self::RootNotFound(_) => None,
        }
    }

    /// Stable code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BeginFailure(_) => "begin_failed",
            Self::QueryFailure { .. } => "query_failed",
            Self::DeleteFailure { .. } => "delete_failed",
            Self::CommitFailure(_) => "commit_failed",
            Self::RootNotFound(_) => "root_not_found",
        }
    }
}

impl Display for CascadeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BeginFailure(err) => write!(f, "failed to open cascade transaction: {err}"),
            Self::QueryFailure { collection, source } => {
                write!(f, "failed to query dependents in `{collection}`: {source}")
            }
            Self::DeleteFailure { record, source } => {
                write!(f, "failed to delete {record}: {source}")
            }
            Self::CommitFailure(err) => write!(f, "failed to commit cascade: {err}"),
            Self::RootNotFound(record) => write!(f, "cascade root not found: {record}"),
        }
    }
}

impl Error for CascadeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.store_error().map(|err| err as &(dyn Error + 'static))
    }
}

/// Stateless cascade engine over an immutable dependency catalog.
#[derive(Debug, Clone)]
pub struct CascadeExecutor {
    catalog: Arc<DependencyCatalog>,
}

impl CascadeExecutor {
    pub fn new(catalog: DependencyCatalog) -> Self {
        Self::with_shared_catalog(Arc::new(catalog))
    }

    pub fn with_shared_catalog(catalog: Arc<DependencyCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &DependencyCatalog {
        &self.catalog
    }

    /// Deletes `root_type/root_id` and all its dependents in one transaction.
    ///
    /// # Errors
    /// - `RootNotFound` when the root does not exist; nothing is changed.
    /// - Any other variant aborts the cascade; the transaction is rolled back.
    pub fn cascade_delete<S: RecordStore>(
        &self,
        store: &S,
        root_type: &str,
        root_id: RecordId,
    ) -> Result<CascadeReport, CascadeError> {
        let root = RecordRef::new(root_type, root_id);
        let started_at = Instant::now();
        info!("event=cascade_delete module=cascade status=start root={root}");

        let result = self.run(store, &root);
        match &result {
            Ok(report) => info!(
                "event=cascade_delete module=cascade status=ok root={} removed={} duration_ms={}",
                root,
                report.total_removed(),
                started_at.elapsed().as_millis()
            ),
            Err(err) if err.is_already_deleted() => warn!(
                "event=cascade_delete module=cascade status=skipped root={} reason=root_not_found duration_ms={}",
                root,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=cascade_delete module=cascade status=error root={} duration_ms={} error_code={} error={}",
                root,
                started_at.elapsed().as_millis(),
                err.code(),
                err
            ),
        }
        result
    }

    /// Deletes every catalogued dependent of `root` inside `tx`. Does not
    /// delete the root and does not commit.
    pub fn purge_dependents<T: RecordTx + ?Sized>(
        &self,
        tx: &T,
        root: &RecordRef,
    ) -> Result<CascadeReport, CascadeError> {
        let mut report = CascadeReport::new(root.clone());
        self.purge_into(tx, root, 0, &mut report)?;
        Ok(report)
    }

    /// Deletes the root record itself inside `tx`.
    pub fn finish<T: RecordTx + ?Sized>(&self, tx: &T, root: &RecordRef) -> Result<(), CascadeError> {
        match tx.delete_record(root) {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Err(CascadeError::RootNotFound(root.clone())),
            Err(source) => Err(CascadeError::DeleteFailure {
                record: root.clone(),
                source,
            }),
        }
    }

    fn run<S: RecordStore>(&self, store: &S, root: &RecordRef) -> Result<CascadeReport, CascadeError> {
        let tx = store
            .begin_transaction()
            .map_err(CascadeError::BeginFailure)?;

        let outcome = self
            .purge_dependents(&tx, root)
            .and_then(|report| self.finish(&tx, root).map(|()| report));
        let report = match outcome {
            Ok(report) => report,
            Err(err) => {
                rollback_quietly(tx, root);
                return Err(err);
            }
        };

        tx.commit().map_err(CascadeError::CommitFailure)?;
        Ok(report)
    }

    fn purge_into<T: RecordTx + ?Sized>(
        &self,
        tx: &T,
        parent: &RecordRef,
        depth: usize,
        report: &mut CascadeReport,
    ) -> Result<(), CascadeError> {
        for entry in self.catalog.entries_for(&parent.collection) {
            let filter = FieldFilter::equals(&entry.foreign_key_field, parent.id);
            let dependents = tx
                .find_by_filter(&entry.collection, &filter)
                .map_err(|source| CascadeError::QueryFailure {
                    collection: entry.collection.clone(),
                    source,
                })?;

            for record in &dependents {
                self.purge_into(tx, record, depth + 1, report)?;
                tx.delete_record(record)
                    .map_err(|source| CascadeError::DeleteFailure {
                        record: record.clone(),
                        source,
                    })?;
            }
            report.add(&entry.collection, dependents.len());

            if depth == 0 {
                info!(
                    "event=cascade_collection module=cascade status=ok root={} collection={} field={} removed={}",
                    parent,
                    entry.collection,
                    entry.foreign_key_field,
                    dependents.len()
                );
            } else {
                debug!(
                    "event=cascade_collection module=cascade status=ok parent={} depth={} collection={} field={} removed={}",
                    parent,
                    depth,
                    entry.collection,
                    entry.foreign_key_field,
                    dependents.len()
                );
            }
        }
        Ok(())
    }
}
