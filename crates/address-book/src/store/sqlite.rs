use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::{debug, info, instrument};

use super::{
    AddressStore, LatitudeBand, PersistenceError, apply_patch, check_pagination, revalidate,
};
use crate::{
    error::{AddressBookError, Result},
    model::{Address, AddressId, AddressPatch, NewAddress, Pagination},
};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS addresses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    street TEXT NOT NULL,
    city TEXT NOT NULL,
    state TEXT NOT NULL,
    postal_code TEXT NOT NULL,
    country TEXT NOT NULL,
    latitude REAL NOT NULL CHECK (latitude BETWEEN -90 AND 90),
    longitude REAL NOT NULL CHECK (longitude BETWEEN -180 AND 180),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_addresses_latitude ON addresses (latitude);
CREATE INDEX IF NOT EXISTS ix_addresses_longitude ON addresses (longitude);
";

const SELECT_COLUMNS: &str = "SELECT id, street, city, state, postal_code, country, \
     latitude, longitude, created_at, updated_at FROM addresses";

/// SQLite-backed store.
///
/// One connection guarded by a mutex: writers are serialized and each
/// read-merge-write runs inside an immediate transaction, so a concurrent writer
/// in another process sees either the old or the new row.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file. Parent directories are created as needed.
    #[instrument(name = "Open SQLite address store", level = "info", skip(busy_timeout))]
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        info!(path = %path.display(), journal_mode = %mode, "Opened SQLite database");
        Self::with_connection(conn)
    }

    /// A private, non-durable database. Handy for tests that want the SQL path.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| PersistenceError::Poisoned.into())
    }
}

fn row_to_address(row: &Row<'_>) -> rusqlite::Result<Address> {
    Ok(Address {
        id: AddressId(row.get(0)?),
        street: row.get(1)?,
        city: row.get(2)?,
        state: row.get(3)?,
        postal_code: row.get(4)?,
        country: row.get(5)?,
        latitude: row.get(6)?,
        longitude: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn find(conn: &Connection, id: AddressId) -> Result<Address> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1"),
        params![id.get()],
        row_to_address,
    )
    .optional()?
    .ok_or(AddressBookError::NotFound(id))
}

fn to_sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl AddressStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn create(&self, record: NewAddress) -> Result<Address> {
        let record = revalidate(record)?;
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            r"INSERT INTO addresses
            (street, city, state, postal_code, country, latitude, longitude, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.street,
                record.city,
                record.state,
                record.postal_code,
                record.country,
                record.latitude,
                record.longitude,
                now,
                now,
            ],
        )?;
        let id = AddressId(conn.last_insert_rowid());
        debug!(%id, "Inserted address into SQLite store");
        Ok(record.into_address(id, now, now))
    }

    fn get(&self, id: AddressId) -> Result<Address> {
        let conn = self.conn()?;
        find(&conn, id)
    }

    fn list(&self, page: Pagination) -> Result<Vec<Address>> {
        check_pagination(page)?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} ORDER BY id LIMIT ?1 OFFSET ?2"
        ))?;
        let addresses = stmt
            .query_map(
                params![to_sql_int(page.limit), to_sql_int(page.skip)],
                row_to_address,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(addresses)
    }

    fn update(&self, id: AddressId, patch: &AddressPatch) -> Result<Address> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = find(&tx, id)?;
        let updated = apply_patch(&existing, patch)?;
        tx.execute(
            r"UPDATE addresses SET
            street = ?1, city = ?2, state = ?3, postal_code = ?4, country = ?5,
            latitude = ?6, longitude = ?7, updated_at = ?8
            WHERE id = ?9",
            params![
                updated.street,
                updated.city,
                updated.state,
                updated.postal_code,
                updated.country,
                updated.latitude,
                updated.longitude,
                updated.updated_at,
                id.get(),
            ],
        )?;
        tx.commit()?;
        Ok(updated)
    }

    fn delete(&self, id: AddressId) -> Result<()> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM addresses WHERE id = ?1", params![id.get()])?;
        if deleted == 0 {
            return Err(AddressBookError::NotFound(id));
        }
        Ok(())
    }

    fn scan(&self, band: LatitudeBand) -> Result<Vec<Address>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE latitude BETWEEN ?1 AND ?2 ORDER BY id"
        ))?;
        let addresses = stmt
            .query_map(params![band.min, band.max], row_to_address)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(addresses)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM addresses", [], |row| row.get(0))?;
        usize::try_from(count)
            .map_err(|_| PersistenceError::Corrupt(format!("negative row count {count}")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(city: &str) -> NewAddress {
        NewAddress {
            street: "Unter den Linden 1".into(),
            city: city.into(),
            state: "Berlin".into(),
            postal_code: "10117".into(),
            country: "Germany".into(),
            latitude: 52.5170,
            longitude: 13.3889,
        }
    }

    #[test]
    fn test_round_trip_preserves_timestamps() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store.create(record("Berlin")).unwrap();
        let fetched = store.get(created.id).unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn test_get_reads_committed_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.get(AddressId(1)),
            Err(AddressBookError::NotFound(AddressId(1)))
        ));

        let created = store.create(record("Berlin")).unwrap();
        let patch = AddressPatch {
            city: Some("Potsdam".into()),
            ..Default::default()
        };
        let updated = store.update(created.id, &patch).unwrap();
        assert_eq!(store.get(created.id).unwrap(), updated);
    }

    #[test]
    fn test_list_orders_by_id_and_pages() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ids: Vec<_> = ["A", "B", "C", "D"]
            .into_iter()
            .map(|city| store.create(record(city)).unwrap().id)
            .collect();

        let page = store.list(Pagination::new(1, 2)).unwrap();
        assert_eq!(page.iter().map(|a| a.id).collect::<Vec<_>>(), ids[1..3]);
        assert!(store.list(Pagination::new(10, 2)).unwrap().is_empty());
    }

    #[test]
    fn test_delete_twice_reports_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store.create(record("Berlin")).unwrap();
        store.delete(created.id).unwrap();
        assert!(matches!(
            store.delete(created.id),
            Err(AddressBookError::NotFound(id)) if id == created.id
        ));
    }

    #[test]
    fn test_autoincrement_never_reuses_ids() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.create(record("Berlin")).unwrap();
        store.delete(first.id).unwrap();
        let second = store.create(record("Berlin")).unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("addresses.db");

        let created = {
            let store = SqliteStore::open(&path, Duration::from_secs(1)).unwrap();
            store.create(record("Berlin")).unwrap()
        };

        let store = SqliteStore::open(&path, Duration::from_secs(1)).unwrap();
        assert_eq!(store.get(created.id).unwrap(), created);
        assert_eq!(store.count().unwrap(), 1);
    }
}
