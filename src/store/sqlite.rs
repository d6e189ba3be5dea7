//! SQLite counter store (rusqlite)
//!
//! One connection behind a mutex. The mutex is held for exactly one
//! statement and never across an `.await`, so the upsert is the only
//! serialization point in the service.

use super::{CounterStore, DailyCount};
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Schema compiled into the binary, same content as `sql/01_daily_counts.sql`
pub const SCHEMA: &str = include_str!("../../sql/01_daily_counts.sql");

/// Run schema migrations from SQL files
///
/// Reads all .sql files from `schema_dir`, sorted by file name (`01_`, `02_`,
/// ...), and executes them. Every file must be idempotent (`IF NOT EXISTS`).
///
/// Returns: Ok(number of files applied), Err on the first failure
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> Result<usize> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(ServiceError::Config(format!(
            "Schema directory not found: {}",
            schema_dir
        )));
    }

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for entry in &sql_files {
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();

        log::info!("   ├─ Executing: {}", filename);

        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)?;
    }

    log::info!("✅ Applied {} schema file(s)", sql_files.len());

    Ok(sql_files.len())
}

/// `CounterStore` backed by a SQLite database
#[derive(Clone)]
pub struct SqliteCounterStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCounterStore {
    /// Open (or create) the database file and apply the embedded schema
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        log::info!("📊 Opened counter store at {} (WAL)", db_path);

        Self::from_connection(conn)
    }

    /// Private in-memory database; gone when the store is dropped
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection, applying the embedded schema
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ServiceError::Store("connection mutex poisoned".to_string()))
    }
}

#[async_trait]
impl CounterStore for SqliteCounterStore {
    async fn increment(&self, day: NaiveDate, creator_id: &str) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO daily_counts (day, creator_id, count)
            VALUES (?1, ?2, 1)
            ON CONFLICT(day, creator_id) DO UPDATE SET
                count = count + 1
            "#,
            params![day, creator_id],
        )?;

        Ok(())
    }

    async fn range_query(
        &self,
        creator_id: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyCount>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT day, creator_id, count
            FROM daily_counts
            WHERE day BETWEEN ?1 AND ?2
              AND (?3 IS NULL OR creator_id = ?3)
            ORDER BY day ASC, creator_id ASC
            "#,
        )?;

        let rows = stmt.query_map(params![start, end, creator_id], |row| {
            let count: i64 = row.get(2)?;
            Ok(DailyCount {
                day: row.get(0)?,
                creator_id: row.get(1)?,
                count: count.max(0) as u64,
            })
        })?;

        let counts = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    async fn clear(&self) -> Result<u64> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM daily_counts", [])?;

        log::warn!("🗑️  Cleared counter store ({} rows)", removed);

        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Helper to create a test database on disk
    fn create_test_store() -> (NamedTempFile, SqliteCounterStore) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let store = SqliteCounterStore::open(db_path).unwrap();
        (temp_file, store)
    }

    #[tokio::test]
    async fn test_increment_creates_then_updates() {
        let (_temp, store) = create_test_store();

        store.increment(day(2024, 1, 10), "c1").await.unwrap();
        store.increment(day(2024, 1, 10), "c1").await.unwrap();
        store.increment(day(2024, 1, 11), "c1").await.unwrap();

        let rows = store
            .range_query(Some("c1"), day(2024, 1, 1), day(2024, 1, 31))
            .await
            .unwrap();

        assert_eq!(
            rows,
            vec![
                DailyCount::new(day(2024, 1, 10), "c1", 2),
                DailyCount::new(day(2024, 1, 11), "c1", 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_range_is_inclusive_and_sparse() {
        let store = SqliteCounterStore::open_in_memory().unwrap();

        for d in [1, 5, 9, 10] {
            store.increment(day(2024, 3, d), "c1").await.unwrap();
        }

        let rows = store
            .range_query(Some("c1"), day(2024, 3, 5), day(2024, 3, 9))
            .await
            .unwrap();

        let days: Vec<_> = rows.iter().map(|r| r.day).collect();
        assert_eq!(days, vec![day(2024, 3, 5), day(2024, 3, 9)]);
    }

    #[tokio::test]
    async fn test_range_filters_by_creator() {
        let store = SqliteCounterStore::open_in_memory().unwrap();

        store.increment(day(2024, 1, 2), "alice").await.unwrap();
        store.increment(day(2024, 1, 2), "bob").await.unwrap();
        store.increment(day(2024, 1, 1), "bob").await.unwrap();

        let only_bob = store
            .range_query(Some("bob"), day(2024, 1, 1), day(2024, 1, 2))
            .await
            .unwrap();
        assert_eq!(only_bob.len(), 2);
        assert!(only_bob.iter().all(|r| r.creator_id == "bob"));

        let everyone = store
            .range_query(None, day(2024, 1, 1), day(2024, 1, 2))
            .await
            .unwrap();
        let keys: Vec<_> = everyone
            .iter()
            .map(|r| (r.day, r.creator_id.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (day(2024, 1, 1), "bob"),
                (day(2024, 1, 2), "alice"),
                (day(2024, 1, 2), "bob"),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let (_temp, store) = create_test_store();
        let target = day(2024, 1, 10);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment(target, "c1").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let rows = store.range_query(Some("c1"), target, target).await.unwrap();
        assert_eq!(rows, vec![DailyCount::new(target, "c1", 50)]);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let store = SqliteCounterStore::open_in_memory().unwrap();

        store.increment(day(2024, 1, 1), "a").await.unwrap();
        store.increment(day(2024, 6, 1), "b").await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);

        let rows = store
            .range_query(None, day(2000, 1, 1), day(2100, 1, 1))
            .await
            .unwrap();
        assert!(rows.is_empty());

        // Clearing an empty store is fine
        assert_eq!(store.clear().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reopen_keeps_counts() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();

        {
            let store = SqliteCounterStore::open(db_path).unwrap();
            store.increment(day(2024, 1, 10), "c1").await.unwrap();
        }

        let store = SqliteCounterStore::open(db_path).unwrap();
        store.increment(day(2024, 1, 10), "c1").await.unwrap();

        let rows = store
            .range_query(Some("c1"), day(2024, 1, 10), day(2024, 1, 10))
            .await
            .unwrap();
        assert_eq!(rows[0].count, 2);
    }

    #[test]
    fn test_run_schema_migrations_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("01_daily_counts.sql"), SCHEMA).unwrap();
        fs::write(
            dir.path().join("02_extra.sql"),
            "CREATE TABLE IF NOT EXISTS extra (id INTEGER PRIMARY KEY);",
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "not sql").unwrap();

        let mut conn = Connection::open_in_memory().unwrap();
        let schema_dir = dir.path().to_str().unwrap();

        assert_eq!(run_schema_migrations(&mut conn, schema_dir).unwrap(), 2);
        // Idempotent
        assert_eq!(run_schema_migrations(&mut conn, schema_dir).unwrap(), 2);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('daily_counts', 'extra')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn test_missing_schema_dir_is_config_error() {
        let mut conn = Connection::open_in_memory().unwrap();
        let result = run_schema_migrations(&mut conn, "/definitely/not/here");
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }
}
