use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rusqlite::{Connection, OpenFlags, params};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::StoreError;

use super::schema::{OUTLET_COLUMNS, OUTLET_TABLE, SCHEMA_SQL};
use super::{CellValue, Outlet, RecordStore, Row};

/// SQLite-backed implementation of `RecordStore`.
///
/// Holds no connection between calls: every read opens a read-only
/// connection, runs on the blocking pool, and closes it before returning.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    db_path: PathBuf,
    open_handles: Arc<AtomicUsize>,
}

/// VM steps between checks of the cancel flag.
const CANCEL_CHECK_STEPS: i32 = 1_000;

/// Raised when the caller stops waiting for a blocking store call, e.g. when
/// the executor's deadline drops the future. The running statement sees the
/// flag from its progress handler and aborts with `SQLITE_INTERRUPT`.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A read-only connection that is counted while alive.
struct ScopedConnection {
    conn: Connection,
    open_handles: Arc<AtomicUsize>,
}

impl ScopedConnection {
    fn open(path: &Path, open_handles: &Arc<AtomicUsize>) -> rusqlite::Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "query_only", true)?;
        open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            conn,
            open_handles: Arc::clone(open_handles),
        })
    }
}

impl Deref for ScopedConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SqliteRecordStore {
    /// Point a store at an existing database file.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        if !path.is_file() {
            return Err(StoreError::NotFound(path.display().to_string()).into());
        }
        Ok(Self {
            db_path: path.to_path_buf(),
            open_handles: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Connections currently held open by this store (and its clones).
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    async fn with_connection<T, F>(&self, f: F) -> crate::error::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        let handles = Arc::clone(&self.open_handles);
        let cancelled = Arc::new(AtomicBool::new(false));
        let _cancel = CancelOnDrop(Arc::clone(&cancelled));
        let result = tokio::task::spawn_blocking(move || {
            let conn = ScopedConnection::open(&path, &handles)?;
            conn.progress_handler(
                CANCEL_CHECK_STEPS,
                Some(move || cancelled.load(Ordering::SeqCst)),
            );
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?;
        Ok(result.map_err(StoreError::Sqlite)?)
    }
}

fn run_query(conn: &Connection, sql: &str) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let columns = stmt.column_count();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let cells = (0..columns)
            .map(|i| row.get_ref(i).map(CellValue::from))
            .collect::<rusqlite::Result<Row>>()?;
        out.push(cells);
    }
    Ok(out)
}

#[async_trait::async_trait]
impl RecordStore for SqliteRecordStore {
    async fn query(&self, sql: &str) -> crate::error::Result<Vec<Row>> {
        let sql = sql.to_string();
        let rows = self.with_connection(move |conn| run_query(conn, &sql)).await?;
        debug!(rows = rows.len(), "Store query finished");
        Ok(rows)
    }

    async fn list_outlets(&self) -> crate::error::Result<Vec<Outlet>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {OUTLET_COLUMNS} FROM {OUTLET_TABLE} ORDER BY rowid"
            ))?;
            let rows = stmt.query_map([], |row| {
                Ok(Outlet {
                    outlet_name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    address: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    opening_hours: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    waze_link: row.get(3)?,
                    gmaps_link: row.get(4)?,
                    latitude: row.get(5)?,
                    longitude: row.get(6)?,
                })
            })?;
            let outlets = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(outlets)
        })
        .await
    }
}

// ── Loading ─────────────────────────────────────────────────────────
//
// Writes happen only here, outside the `RecordStore` interface, for the
// import command and test fixtures.

/// Create the database file and outlet table if they do not exist.
pub fn create_database(path: &Path) -> crate::error::Result<()> {
    let conn = Connection::open(path).map_err(StoreError::Sqlite)?;
    conn.execute_batch(SCHEMA_SQL).map_err(StoreError::Sqlite)?;
    Ok(())
}

/// Append outlets to the table in one transaction. Returns rows inserted.
pub fn import_outlets(path: &Path, outlets: &[Outlet]) -> crate::error::Result<usize> {
    let mut conn = Connection::open(path).map_err(StoreError::Sqlite)?;
    conn.execute_batch(SCHEMA_SQL).map_err(StoreError::Sqlite)?;
    let tx = conn.transaction().map_err(StoreError::Sqlite)?;
    {
        let mut stmt = tx
            .prepare(&format!(
                "INSERT INTO {OUTLET_TABLE} ({OUTLET_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ))
            .map_err(StoreError::Sqlite)?;
        for o in outlets {
            stmt.execute(params![
                o.outlet_name,
                o.address,
                o.opening_hours,
                o.waze_link,
                o.gmaps_link,
                o.latitude,
                o.longitude,
            ])
            .map_err(StoreError::Sqlite)?;
        }
    }
    tx.commit().map_err(StoreError::Sqlite)?;
    info!(count = outlets.len(), path = %path.display(), "Imported outlets");
    Ok(outlets.len())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OutletFile {
    List(Vec<Outlet>),
    Wrapped { data: Vec<Outlet> },
}

/// Parse outlets from JSON: either a bare array or `{"data": [...]}`.
pub fn parse_outlets_json(text: &str) -> crate::error::Result<Vec<Outlet>> {
    let file: OutletFile = serde_json::from_str(text).map_err(StoreError::Serialization)?;
    Ok(match file {
        OutletFile::List(list) | OutletFile::Wrapped { data: list } => list,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outlet(name: &str, hours: &str) -> Outlet {
        Outlet {
            outlet_name: name.to_string(),
            address: format!("{name} address"),
            opening_hours: hours.to_string(),
            waze_link: None,
            gmaps_link: Some(format!("https://maps.example/{name}")),
            latitude: Some(3.1),
            longitude: Some(101.6),
        }
    }

    fn fixture() -> (tempfile::TempDir, SqliteRecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outlets.db");
        create_database(&path).unwrap();
        import_outlets(
            &path,
            &[
                outlet("Subway A", "8:00 AM - 9:00 PM"),
                outlet("Subway B", "10:00 AM - 10:00 PM"),
            ],
        )
        .unwrap();
        let store = SqliteRecordStore::open(&path).unwrap();
        (dir, store)
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = SqliteRecordStore::open(&dir.path().join("nope.db")).unwrap_err();
        assert!(err.to_string().contains("Database not found"));
    }

    #[tokio::test]
    async fn query_returns_rows_in_order() {
        let (_dir, store) = fixture();
        let rows = store
            .query("SELECT outlet_name, latitude FROM subway ORDER BY outlet_name")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], CellValue::Text("Subway A".into()));
        assert_eq!(rows[1][1], CellValue::Real(3.1));
        assert_eq!(store.open_handles(), 0);
    }

    #[tokio::test]
    async fn list_outlets_reads_whole_records() {
        let (_dir, store) = fixture();
        let outlets = store.list_outlets().await.unwrap();
        assert_eq!(outlets.len(), 2);
        assert_eq!(outlets[1].outlet_name, "Subway B");
        assert!(outlets[0].waze_link.is_none());
    }

    #[tokio::test]
    async fn connection_refuses_writes() {
        let (_dir, store) = fixture();
        let err = store.query("DELETE FROM subway").await.unwrap_err();
        assert!(err.to_string().contains("readonly"), "{err}");
        assert_eq!(store.list_outlets().await.unwrap().len(), 2);
        assert_eq!(store.open_handles(), 0);
    }

    #[tokio::test]
    async fn handles_released_after_errors() {
        let (_dir, store) = fixture();
        for _ in 0..5 {
            assert!(store.query("SELECT nope FROM subway").await.is_err());
            assert_eq!(store.open_handles(), 0);
        }
    }

    const RUNAWAY_QUERY: &str =
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT count(*) FROM c";

    async fn wait_for_release(store: &SqliteRecordStore) -> usize {
        for _ in 0..100 {
            if store.open_handles() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        store.open_handles()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandoned_query_is_interrupted_and_released() {
        let (_dir, store) = fixture();
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(200), store.query(RUNAWAY_QUERY))
                .await;
        assert!(waited.is_err(), "runaway query should outlive the deadline");
        assert_eq!(wait_for_release(&store).await, 0);

        // The store stays usable after an interrupted call.
        assert_eq!(store.list_outlets().await.unwrap().len(), 2);
        assert_eq!(store.open_handles(), 0);
    }

    #[test]
    fn parses_both_json_shapes() {
        let bare = r#"[{"outlet_name":"A","address":"x","opening_hours":"y"}]"#;
        let wrapped = r#"{"data":[{"outlet_name":"A","address":"x","opening_hours":"y","latitude":3.0}]}"#;
        assert_eq!(parse_outlets_json(bare).unwrap().len(), 1);
        assert_eq!(parse_outlets_json(wrapped).unwrap()[0].latitude, Some(3.0));
        assert!(parse_outlets_json("{}").is_err());
    }
}
