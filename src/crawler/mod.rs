//! Crawler module for listing traversal and advertisement fetching
//!
//! This module contains the core crawling logic, including:
//! - The HTTP and headless-browser fetch strategies
//! - Page classification and the phone reveal
//! - Request pacing, concurrency limiting and retries
//! - Overall crawl coordination

mod browser_fetcher;
mod classifier;
mod coordinator;
mod fetcher;
mod http_fetcher;
mod phone;
mod scheduler;
mod stealth;

pub use browser_fetcher::BrowserFetcher;
pub use classifier::{classify, PageClass};
pub use coordinator::{run_crawl, Coordinator, CrawlReport};
pub use fetcher::{DetailFetch, FetchStrategy, PageFetchResult};
pub use http_fetcher::{build_http_client, HttpFetcher};
pub use phone::{looks_like_phone, lookup_phone, normalize_phone, parse_phone_response};
pub use scheduler::{fetch_with_retry, jittered, RetryPolicy, Scheduler};
pub use stealth::InteractionPlan;
