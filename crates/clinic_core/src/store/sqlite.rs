//! SQLite-backed record store.
//!
//! # Responsibility
//! - Map collections to tables and records to rows keyed by `id`.
//! - Open `IMMEDIATE` transactions so a cascade owns the write lock from its
//!   first lookup to its commit.
//! - Verify that a dependency catalog matches the migrated schema.
//!
//! # Invariants
//! - Connections must be migrated to the latest schema version.
//! - Identifiers are validated and quoted before being formatted into SQL;
//!   values are always bound parameters.
//! - Connections from `crate::db` reject unknown quoted identifiers instead of
//!   reading them as string literals.
//! - Lock waits are bounded by the connection busy timeout.

use crate::cascade::catalog::DependencyCatalog;
use crate::db::migrations::{current_user_version, latest_version};
use crate::model::record::{RecordId, RecordRef};
use crate::store::{
    checked_identifier, FieldFilter, RecordStore, RecordTx, StoreError, StoreResult,
};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

const ID_FIELD: &str = "id";

/// Record store over a migrated SQLite connection.
pub struct SqliteRecordStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordStore<'conn> {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        let expected_version = latest_version();
        let actual_version = current_user_version(conn)?;
        if actual_version != expected_version {
            return Err(StoreError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Counts records matching `filter` outside of any explicit transaction.
    pub fn count_by_filter(&self, collection: &str, filter: &FieldFilter<'_>) -> StoreResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1;",
            quoted(collection)?,
            quoted(filter.field)?
        );
        let count: i64 = self
            .conn
            .query_row(&sql, [filter.value.to_string()], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| StoreError::InvalidData(format!("negative row count {count}")))
    }

    /// Returns whether `record` is present.
    pub fn exists(&self, record: &RecordRef) -> StoreResult<bool> {
        Ok(self.count_by_filter(&record.collection, &FieldFilter::equals(ID_FIELD, record.id))? > 0)
    }

    /// Verifies every root and dependent collection of `catalog` exists with
    /// the fields the cascade will query.
    pub fn ensure_catalog_ready(&self, catalog: &DependencyCatalog) -> StoreResult<()> {
        for root in catalog.roots() {
            self.ensure_field(root, ID_FIELD)?;
            for entry in catalog.entries_for(root) {
                self.ensure_field(&entry.collection, ID_FIELD)?;
                self.ensure_field(&entry.collection, &entry.foreign_key_field)?;
            }
        }
        Ok(())
    }

    fn ensure_field(&self, collection: &str, field: &str) -> StoreResult<()> {
        let columns = table_columns(self.conn, collection)?;
        if columns.is_empty() {
            return Err(StoreError::MissingCollection(collection.to_string()));
        }
        if !columns.iter().any(|column| column == field) {
            return Err(StoreError::MissingField {
                collection: collection.to_string(),
                field: field.to_string(),
            });
        }
        Ok(())
    }
}

impl RecordStore for SqliteRecordStore<'_> {
    type Tx<'s>
        = SqliteRecordTx<'s>
    where
        Self: 's;

    fn begin_transaction(&self) -> StoreResult<SqliteRecordTx<'_>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        Ok(SqliteRecordTx { tx })
    }

    fn check_catalog(&self, catalog: &DependencyCatalog) -> StoreResult<()> {
        self.ensure_catalog_ready(catalog)
    }
}

/// Open SQLite transaction. Rolls back on drop unless committed.
pub struct SqliteRecordTx<'conn> {
    tx: Transaction<'conn>,
}

impl RecordTx for SqliteRecordTx<'_> {
    fn find_by_filter(
        &self,
        collection: &str,
        filter: &FieldFilter<'_>,
    ) -> StoreResult<Vec<RecordRef>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {} ASC;",
            quoted(ID_FIELD)?,
            quoted(collection)?,
            quoted(filter.field)?,
            quoted(ID_FIELD)?
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let mut rows = stmt.query([filter.value.to_string()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get(0)?;
            records.push(RecordRef::new(collection, parse_record_id(collection, &id_text)?));
        }
        Ok(records)
    }

    fn delete_record(&self, record: &RecordRef) -> StoreResult<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1;",
            quoted(&record.collection)?,
            quoted(ID_FIELD)?
        );
        let changed = self.tx.execute(&sql, [record.id.to_string()])?;
        if changed == 0 {
            return Err(StoreError::NotFound(record.clone()));
        }
        Ok(())
    }

    fn commit(self) -> StoreResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    fn rollback(self) -> StoreResult<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

fn quoted(identifier: &str) -> StoreResult<String> {
    Ok(format!("\"{}\"", checked_identifier(identifier)?))
}

fn parse_record_id(collection: &str, value: &str) -> StoreResult<RecordId> {
    Uuid::parse_str(value).map_err(|_| {
        StoreError::InvalidData(format!("invalid id value `{value}` in {collection}.id"))
    })
}

fn table_columns(conn: &Connection, table: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", quoted(table)?))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}
