//! Statistics generation from the record database
//!
//! This module provides functionality for extracting and displaying
//! record and run statistics from the storage layer.

use crate::storage::{CarRecord, RunRecord, RunStatus, Storage, StorageResult};

/// How many recent records `--stats` lists
pub const RECENT_RECORDS_SHOWN: usize = 5;

/// Record store statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Total number of stored advertisements
    pub total_records: u64,

    /// Records that carry a phone number
    pub with_phone: u64,

    /// Records that carry a VIN
    pub with_vin: u64,

    /// Run counts per final status, in status order
    pub runs_by_status: Vec<(RunStatus, u64)>,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,

    /// Newest records first
    pub recent: Vec<CarRecord>,
}

impl CrawlStatistics {
    /// Share of records with a phone, in percent
    pub fn phone_coverage(&self) -> f64 {
        percentage(self.with_phone, self.total_records)
    }

    /// Share of records with a VIN, in percent
    pub fn vin_coverage(&self) -> f64 {
        percentage(self.with_vin, self.total_records)
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<CrawlStatistics> {
    let mut runs_by_status = Vec::new();
    for status in [
        RunStatus::Running,
        RunStatus::Completed,
        RunStatus::Aborted,
        RunStatus::Cancelled,
    ] {
        let count = storage.count_runs_by_status(status)?;
        if count > 0 {
            runs_by_status.push((status, count));
        }
    }

    Ok(CrawlStatistics {
        total_records: storage.count_records()?,
        with_phone: storage.count_records_with_phone()?,
        with_vin: storage.count_records_with_vin()?,
        runs_by_status,
        latest_run: storage.get_latest_run()?,
        recent: storage.recent_records(RECENT_RECORDS_SHOWN)?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Record Statistics ===\n");

    println!("Overview:");
    println!("  Stored advertisements: {}", stats.total_records);
    println!(
        "  With phone: {} ({:.1}%)",
        stats.with_phone,
        stats.phone_coverage()
    );
    println!("  With VIN: {} ({:.1}%)", stats.with_vin, stats.vin_coverage());
    println!();

    if !stats.runs_by_status.is_empty() {
        println!("Runs by Status:");
        for (status, count) in &stats.runs_by_status {
            println!("  {}: {}", status.to_db_string(), count);
        }
        println!();
    }

    if let Some(run) = &stats.latest_run {
        println!("Latest Run (#{}):", run.id);
        println!("  Started: {}", run.started_at);
        println!(
            "  Finished: {}",
            run.finished_at.as_deref().unwrap_or("still running")
        );
        println!("  Status: {}", run.status.to_db_string());
        println!(
            "  Pages: {}, items: {}, new records: {}, failed: {}",
            run.pages_processed, run.items_processed, run.records_saved, run.items_failed
        );
        if let Some(reason) = &run.abort_reason {
            println!("  Abort reason: {}", reason);
        }
        println!();
    }

    if !stats.recent.is_empty() {
        println!("Most Recent Records:");
        for record in &stats.recent {
            let price = record
                .price_usd
                .map(|p| format!("${:.0}", p))
                .unwrap_or_else(|| "no price".to_string());
            println!("  - {} ({}) {}", record.title, price, record.url);
        }
    }
}
