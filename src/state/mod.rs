//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlPhase`: The phases of the crawl state machine and its legal transitions
//! - `CrawlState`: Shared per-run progress (current page, seen set, counters)
//! - `RetryState`: Per-URL attempt and backoff bookkeeping

mod crawl_phase;
mod crawl_state;
mod retry_state;

// Re-export main types
pub use crawl_phase::CrawlPhase;
pub use crawl_state::CrawlState;
pub use retry_state::RetryState;
