//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register clinic schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - Foreign keys between collections never use `ON DELETE CASCADE`; cascading
//!   is owned by `crate::cascade`.

use crate::db::{DbError, DbResult};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("0001_patients.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("0002_billing.sql"),
    },
    Migration {
        version: 3,
        sql: include_str!("0003_clinical.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current_version)
    {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    Ok(())
}

/// Reads the schema version recorded on `conn`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, current_user_version, latest_version, MIGRATIONS};
    use crate::db::DbError;
    use rusqlite::Connection;

    #[test]
    fn migration_versions_are_strictly_increasing() {
        assert!(MIGRATIONS
            .windows(2)
            .all(|pair| pair[0].version < pair[1].version));
        assert_eq!(MIGRATIONS[0].version, 1);
    }

    #[test]
    fn fresh_connection_is_migrated_to_latest_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        assert_eq!(current_user_version(&conn).unwrap(), latest_version());

        apply_migrations(&mut conn).unwrap();
        assert_eq!(current_user_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn partially_migrated_connection_gets_only_pending_migrations() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0].sql).unwrap();
        conn.execute_batch("PRAGMA user_version = 1;").unwrap();

        apply_migrations(&mut conn).unwrap();

        assert_eq!(current_user_version(&conn).unwrap(), latest_version());
        let invoices: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'invoices';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(invoices, 1);
    }

    #[test]
    fn newer_user_version_is_rejected_without_changes() {
        let mut conn = Connection::open_in_memory().unwrap();
        let future = latest_version() + 1;
        conn.execute_batch(&format!("PRAGMA user_version = {future};"))
            .unwrap();

        let err = apply_migrations(&mut conn).unwrap_err();

        assert!(matches!(
            err,
            DbError::UnsupportedSchemaVersion { db_version, latest_supported }
                if db_version == future && latest_supported == latest_version()
        ));
        assert_eq!(current_user_version(&conn).unwrap(), future);
        let tables: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table';", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(tables, 0);
    }
}
