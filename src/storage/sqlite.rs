//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{CarRecord, RunRecord, RunStatus, RunTotals};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status, pages_processed, \
     items_processed, records_saved, items_failed, abort_reason";

const CAR_COLUMNS: &str = "url, title, price_usd, odometer, username, phone_number, image_url, \
     images_count, car_number, car_vin, datetime_found";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = init_database(path)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
        pages_processed: row.get(5)?,
        items_processed: row.get(6)?,
        records_saved: row.get(7)?,
        items_failed: row.get(8)?,
        abort_reason: row.get(9)?,
    })
}

fn car_from_row(row: &Row<'_>) -> rusqlite::Result<CarRecord> {
    let found: String = row.get(10)?;
    let datetime_found = DateTime::parse_from_rfc3339(&found)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;

    Ok(CarRecord {
        url: row.get(0)?,
        title: row.get(1)?,
        price_usd: row.get(2)?,
        odometer: row.get(3)?,
        username: row.get(4)?,
        phone_number: row.get(5)?,
        image_url: row.get(6)?,
        images_count: row.get(7)?,
        car_number: row.get(8)?,
        car_vin: row.get(9)?,
        datetime_found,
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, pages_processed = ?3,
             items_processed = ?4, records_saved = ?5, items_failed = ?6, abort_reason = ?7
             WHERE id = ?8",
            params![
                status.to_db_string(),
                now,
                totals.pages_processed,
                totals.items_processed,
                totals.records_saved,
                totals.items_failed,
                totals.abort_reason,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        let run = self.conn.query_row(&sql, [], run_from_row).optional()?;
        Ok(run)
    }

    // ===== Records =====

    fn record_exists(&self, url: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM cars WHERE url = ?1", params![url], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    fn upsert_record(&mut self, record: &CarRecord) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO cars (url, title, price_usd, odometer, username, phone_number,
             image_url, images_count, car_number, car_vin, datetime_found)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(url) DO NOTHING",
            params![
                record.url,
                record.title,
                record.price_usd,
                record.odometer,
                record.username,
                record.phone_number,
                record.image_url,
                record.images_count,
                record.car_number,
                record.car_vin,
                record.datetime_found.to_rfc3339()
            ],
        )?;
        Ok(inserted == 1)
    }

    fn get_record(&self, url: &str) -> StorageResult<Option<CarRecord>> {
        let sql = format!("SELECT {} FROM cars WHERE url = ?1", CAR_COLUMNS);
        let record = self.conn.query_row(&sql, params![url], car_from_row).optional()?;
        Ok(record)
    }

    fn recent_records(&self, limit: usize) -> StorageResult<Vec<CarRecord>> {
        let sql = format!(
            "SELECT {} FROM cars ORDER BY datetime_found DESC, id DESC LIMIT ?1",
            CAR_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![limit as i64], car_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ===== Statistics =====

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cars", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_records_with_phone(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cars WHERE phone_number IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_records_with_vin(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cars WHERE car_vin IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_runs_by_status(&self, status: RunStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Opens a database file, applies connection pragmas and creates the schema
pub fn init_database(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
    ",
    )?;

    initialize_schema(&conn)?;

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str) -> CarRecord {
        let mut record = CarRecord::new(url);
        record.title = "BMW X5 2019".to_string();
        record.price_usd = Some(41500.0);
        record.odometer = Some(87000);
        record.phone_number = Some("+380671234567".to_string());
        record.images_count = 14;
        record
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_create_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("test_hash").unwrap();
        assert!(run_id > 0);

        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn test_finish_run_records_totals() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("test_hash").unwrap();

        let totals = RunTotals {
            pages_processed: 2,
            items_processed: 6,
            records_saved: 5,
            items_failed: 1,
            abort_reason: None,
        };
        storage
            .finish_run(run_id, RunStatus::Completed, &totals)
            .unwrap();

        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.pages_processed, 2);
        assert_eq!(run.records_saved, 5);
        assert!(run.finished_at.is_some());
        assert_eq!(storage.count_runs_by_status(RunStatus::Completed).unwrap(), 1);
    }

    #[test]
    fn test_finish_unknown_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.finish_run(42, RunStatus::Aborted, &RunTotals::default());
        assert!(matches!(result, Err(StorageError::RunNotFound(42))));
    }

    #[test]
    fn test_get_missing_run() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.get_run(7),
            Err(StorageError::RunNotFound(7))
        ));
        assert!(storage.get_latest_run().unwrap().is_none());
    }

    #[test]
    fn test_upsert_inserts_once() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let url = "https://auto.ria.com/uk/auto_bmw_x5_35012345.html";

        assert!(!storage.record_exists(url).unwrap());
        assert!(storage.upsert_record(&record(url)).unwrap());
        assert!(storage.record_exists(url).unwrap());

        let mut changed = record(url);
        changed.title = "Something else".to_string();
        assert!(!storage.upsert_record(&changed).unwrap());

        assert_eq!(storage.count_records().unwrap(), 1);
        let stored = storage.get_record(url).unwrap().unwrap();
        assert_eq!(stored.title, "BMW X5 2019");
    }

    #[test]
    fn test_record_fields_roundtrip() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let mut original = record("https://auto.ria.com/uk/auto_audi_a6_1.html");
        original.car_vin = Some("WAUZZZ4G7DN123456".to_string());
        original.car_number = None;
        storage.upsert_record(&original).unwrap();

        let stored = storage.get_record(&original.url).unwrap().unwrap();
        assert_eq!(stored.price_usd, Some(41500.0));
        assert_eq!(stored.odometer, Some(87000));
        assert_eq!(stored.car_vin.as_deref(), Some("WAUZZZ4G7DN123456"));
        assert!(stored.car_number.is_none());
        assert_eq!(
            stored.datetime_found.timestamp(),
            original.datetime_found.timestamp()
        );
    }

    #[test]
    fn test_counts() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let mut with_vin = record("https://auto.ria.com/uk/auto_a_1.html");
        with_vin.car_vin = Some("WBA0000000000000A".to_string());
        let mut without_phone = record("https://auto.ria.com/uk/auto_a_2.html");
        without_phone.phone_number = None;

        storage.upsert_record(&with_vin).unwrap();
        storage.upsert_record(&without_phone).unwrap();

        assert_eq!(storage.count_records().unwrap(), 2);
        assert_eq!(storage.count_records_with_phone().unwrap(), 1);
        assert_eq!(storage.count_records_with_vin().unwrap(), 1);
    }

    #[test]
    fn test_recent_records_limit() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        for i in 0..5 {
            storage
                .upsert_record(&record(&format!("https://auto.ria.com/uk/auto_a_{}.html", i)))
                .unwrap();
        }
        assert_eq!(storage.recent_records(3).unwrap().len(), 3);
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cars.db");
        let url = "https://auto.ria.com/uk/auto_a_9.html";

        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            storage.upsert_record(&record(url)).unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        assert!(storage.record_exists(url).unwrap());
    }
}
