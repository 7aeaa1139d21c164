//! Output module for run summaries and record statistics
//!
//! This module handles:
//! - Printing the outcome of a crawl run
//! - Loading and printing statistics about the stored records

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};

use crate::crawler::CrawlReport;
use crate::state::CrawlPhase;

/// Human-readable one-paragraph summary of a finished run
pub fn format_report(report: &CrawlReport) -> String {
    let outcome = match (report.phase, report.cancelled) {
        (CrawlPhase::Aborted, _) => "aborted",
        (_, true) => "cancelled",
        _ => "completed",
    };

    let mut summary = format!(
        "Run #{} {}: {} listing pages, {} advertisements processed, {} new records saved, {} failed",
        report.run_id,
        outcome,
        report.pages_processed,
        report.items_processed,
        report.records_saved,
        report.items_failed
    );

    if let Some(reason) = &report.abort_reason {
        summary.push_str(&format!("\nAbort reason: {}", reason));
    }

    summary
}

/// Prints the run summary to stdout
pub fn print_report(report: &CrawlReport) {
    println!("{}", format_report(report));
}
