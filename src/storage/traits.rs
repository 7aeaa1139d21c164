//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{CarRecord, RunRecord, RunStatus, RunTotals};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The only consistency the crawler relies on is the record upsert: two
/// concurrent inserts of the same URL must leave exactly one row, and the
/// losing caller must learn that it did not insert.
pub trait Storage: Send {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Marks a run as finished, recording its final status and totals
    fn finish_run(&mut self, run_id: i64, status: RunStatus, totals: &RunTotals)
        -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Records =====

    /// Returns true if a record with this canonical URL is already stored
    fn record_exists(&self, url: &str) -> StorageResult<bool>;

    /// Inserts a record unless one with the same URL exists
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The record was inserted
    /// * `Ok(false)` - A record with this URL already existed; nothing changed
    fn upsert_record(&mut self, record: &CarRecord) -> StorageResult<bool>;

    /// Gets a record by canonical URL
    fn get_record(&self, url: &str) -> StorageResult<Option<CarRecord>>;

    /// Gets the most recently found records, newest first
    fn recent_records(&self, limit: usize) -> StorageResult<Vec<CarRecord>>;

    // ===== Statistics =====

    /// Gets total record count
    fn count_records(&self) -> StorageResult<u64>;

    /// Counts records that carry a phone number
    fn count_records_with_phone(&self) -> StorageResult<u64>;

    /// Counts records that carry a VIN
    fn count_records_with_vin(&self) -> StorageResult<u64>;

    /// Counts runs per final status
    fn count_runs_by_status(&self, status: RunStatus) -> StorageResult<u64>;
}
