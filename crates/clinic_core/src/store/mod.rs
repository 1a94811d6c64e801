//! Record store contract and implementations.
//!
//! # Responsibility
//! - Define the transactional record-store interface the cascade engine runs on.
//! - Provide the SQLite-backed store and the delete lifecycle pipeline.
//!
//! # Invariants
//! - Every read and write issued through a `RecordTx` is invisible to other
//!   connections until `commit` succeeds.
//! - Dropping a `RecordTx` without `commit` rolls it back.
//! - Collection and field names are validated identifiers before they reach SQL.

use crate::cascade::catalog::DependencyCatalog;
use crate::db::DbError;
use crate::model::record::{RecordId, RecordRef};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod lifecycle;
pub mod sqlite;

pub use lifecycle::{BeforeDeleteHook, DeleteError, DeletePipeline, HookError};
pub use sqlite::{SqliteRecordStore, SqliteRecordTx};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,62}$").expect("valid identifier regex"));

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by record store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error, including lock timeouts.
    Db(DbError),
    /// Record addressed by a delete does not exist.
    NotFound(RecordRef),
    /// Collection or field name is not a plain lowercase identifier.
    InvalidIdentifier(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Collection does not exist in the store.
    MissingCollection(String),
    /// Field does not exist on an existing collection.
    MissingField { collection: String, field: String },
    /// Persisted data cannot be mapped back to a record reference.
    InvalidData(String),
}

impl StoreError {
    /// Returns whether the store gave up waiting on a lock.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_busy())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(record) => write!(f, "record not found: {record}"),
            Self::InvalidIdentifier(value) => write!(f, "invalid store identifier `{value}`"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "record store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingCollection(collection) => {
                write!(f, "record store has no collection `{collection}`")
            }
            Self::MissingField { collection, field } => {
                write!(f, "collection `{collection}` has no field `{field}`")
            }
            Self::InvalidData(message) => write!(f, "invalid record data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Equality filter `field = value` over one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldFilter<'a> {
    pub field: &'a str,
    pub value: RecordId,
}

impl<'a> FieldFilter<'a> {
    pub fn equals(field: &'a str, value: RecordId) -> Self {
        Self { field, value }
    }
}

/// One open unit of work against a record store.
pub trait RecordTx {
    /// Returns every record in `collection` matching `filter`, without a
    /// result-count limit.
    fn find_by_filter(
        &self,
        collection: &str,
        filter: &FieldFilter<'_>,
    ) -> StoreResult<Vec<RecordRef>>;

    /// Deletes one record. Returns `StoreError::NotFound` when nothing matched.
    fn delete_record(&self, record: &RecordRef) -> StoreResult<()>;

    /// Makes every write of this transaction visible atomically.
    fn commit(self) -> StoreResult<()>
    where
        Self: Sized;

    /// Discards every write of this transaction.
    fn rollback(self) -> StoreResult<()>
    where
        Self: Sized;
}

/// Store capable of opening transactions.
pub trait RecordStore {
    type Tx<'s>: RecordTx
    where
        Self: 's;

    /// Opens a transaction holding the store's write lock until commit or rollback.
    fn begin_transaction(&self) -> StoreResult<Self::Tx<'_>>;

    /// Verifies that every collection and field named by `catalog` exists.
    ///
    /// Stores without a schema accept any catalog.
    fn check_catalog(&self, _catalog: &DependencyCatalog) -> StoreResult<()> {
        Ok(())
    }
}

/// Returns whether `value` may be used as a collection or field name.
pub fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

pub(crate) fn checked_identifier(value: &str) -> StoreResult<&str> {
    if is_valid_identifier(value) {
        Ok(value)
    } else {
        Err(StoreError::InvalidIdentifier(value.to_string()))
    }
}
