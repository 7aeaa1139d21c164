//! Storage module for persisting crawl results
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Insert-if-absent persistence of car records keyed by canonical URL
//! - Run tracking with per-run totals

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{init_database, SqliteStorage};
pub use traits::{Storage, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// One advertisement as extracted from the site
///
/// Only `url` is guaranteed; every other field is best effort. Missing values
/// stay `None` rather than being replaced by a placeholder, except `title`
/// (`"Unknown"`) and `images_count` (0).
#[derive(Debug, Clone, PartialEq)]
pub struct CarRecord {
    /// Canonical URL of the advertisement, the uniqueness key
    pub url: String,
    pub title: String,
    pub price_usd: Option<f64>,
    /// Odometer reading in kilometres
    pub odometer: Option<u32>,
    /// Seller display name
    pub username: Option<String>,
    /// Phone in `+38...` form
    pub phone_number: Option<String>,
    pub image_url: Option<String>,
    pub images_count: u32,
    /// Licence plate as printed on the page
    pub car_number: Option<String>,
    pub car_vin: Option<String>,
    /// When the record was first created; never updated afterwards
    pub datetime_found: DateTime<Utc>,
}

impl CarRecord {
    pub const UNKNOWN_TITLE: &'static str = "Unknown";

    /// Creates an empty record for `url`, stamped with the current time
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: Self::UNKNOWN_TITLE.to_string(),
            price_usd: None,
            odometer: None,
            username: None,
            phone_number: None,
            image_url: None,
            images_count: 0,
            car_number: None,
            car_vin: None,
            datetime_found: Utc::now(),
        }
    }
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub pages_processed: u32,
    pub items_processed: u32,
    pub records_saved: u32,
    pub items_failed: u32,
    pub abort_reason: Option<String>,
}

/// Totals written when a run finishes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub pages_processed: u32,
    pub items_processed: u32,
    pub records_saved: u32,
    pub items_failed: u32,
    pub abort_reason: Option<String>,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Aborted,
    Cancelled,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "aborted" => Some(Self::Aborted),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}
