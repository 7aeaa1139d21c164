//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Walking listing pages one after another
//! - Dispatching advertisement fetches under the concurrency limit
//! - Enforcing the page and item quotas
//! - Handling blocks, retries and cancellation
//! - Recording the run and its totals in storage

use crate::config::{Config, CrawlConfig, StrategyKind};
use crate::crawler::browser_fetcher::BrowserFetcher;
use crate::crawler::fetcher::FetchStrategy;
use crate::crawler::http_fetcher::HttpFetcher;
use crate::crawler::scheduler::{fetch_with_retry, RetryPolicy, Scheduler};
use crate::extract::{extract_listing, extract_record};
use crate::state::{CrawlPhase, CrawlState};
use crate::storage::{open_storage, RunStatus, RunTotals, SqliteStorage, Storage};
use crate::url::canonicalize;
use crate::CrawlError;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Outcome of one crawl run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub run_id: i64,

    /// Terminal phase, either `Done` or `Aborted`
    pub phase: CrawlPhase,

    /// Why the run stopped early, when it was aborted
    pub abort_reason: Option<String>,

    pub pages_processed: u32,
    pub items_processed: u32,
    pub records_saved: u32,
    pub items_failed: u32,

    /// True when the run was stopped from outside
    pub cancelled: bool,
}

impl CrawlReport {
    /// Run status persisted for this outcome
    pub fn status(&self) -> RunStatus {
        match (self.phase, self.cancelled) {
            (CrawlPhase::Aborted, _) => RunStatus::Aborted,
            (_, true) => RunStatus::Cancelled,
            _ => RunStatus::Completed,
        }
    }
}

/// Everything an item task needs, shared across tasks
struct ItemContext {
    config: Arc<CrawlConfig>,
    storage: Arc<Mutex<SqliteStorage>>,
    fetcher: Arc<dyn FetchStrategy>,
    scheduler: Scheduler,
    retry: RetryPolicy,
    state: Arc<CrawlState>,
    cancel: CancellationToken,
}

impl ItemContext {
    /// Fetches, extracts and stores one advertisement
    async fn process(self: Arc<Self>, url: String, _permit: OwnedSemaphorePermit) {
        tokio::time::sleep(self.scheduler.item_delay()).await;

        let fetcher = Arc::clone(&self.fetcher);
        let (detail, retry) = fetch_with_retry(&self.retry, &url, &self.cancel, || {
            fetcher.fetch_detail(&url)
        })
        .await;

        if !detail.page.is_valid() {
            tracing::warn!(
                "Giving up on {} after {} attempts ({}, {:?} spent in backoff)",
                url,
                retry.attempts(),
                detail.page.class,
                retry.total_backoff()
            );
            self.state.record_item_failed();
            return;
        }

        let mut record = extract_record(&detail.page.content, &url, &self.config.base_origin);
        if record.phone_number.is_none() {
            record.phone_number = detail.revealed_phone;
        }

        let upserted = self
            .storage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .upsert_record(&record);

        match upserted {
            Ok(true) => {
                tracing::info!("Saved {} ({})", record.title, url);
                self.state.record_item_done(true);
            }
            Ok(false) => {
                tracing::debug!("{} was stored by another task", url);
                self.state.record_item_done(false);
            }
            Err(e) => {
                tracing::error!("Failed to store {}: {}", url, e);
                self.state.record_item_failed();
            }
        }
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    items: Arc<ItemContext>,
    run_id: i64,
}

impl Coordinator {
    /// Creates a new coordinator and records the start of a run
    ///
    /// # Arguments
    ///
    /// * `config` - Settings for this run
    /// * `storage` - Record store; the run is recorded here too
    /// * `fetcher` - Fetch strategy used for every page
    /// * `config_hash` - Hash of the config file the run was started from
    /// * `cancel` - Token that stops the run from outside
    pub fn new(
        config: CrawlConfig,
        mut storage: SqliteStorage,
        fetcher: Arc<dyn FetchStrategy>,
        config_hash: &str,
        cancel: CancellationToken,
    ) -> Result<Self, CrawlError> {
        let run_id = storage.create_run(config_hash)?;
        let state = Arc::new(CrawlState::new(config.start_url.as_str()));

        let items = ItemContext {
            scheduler: Scheduler::new(&config),
            retry: RetryPolicy::from_config(&config),
            config: Arc::new(config),
            storage: Arc::new(Mutex::new(storage)),
            fetcher,
            state,
            cancel,
        };

        Ok(Self {
            items: Arc::new(items),
            run_id,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Runs the crawl to completion
    ///
    /// Fetch strategy sessions are released and the run is finalized in
    /// storage whatever the outcome. Blocked or exhausted listing pages end
    /// the run as `Aborted` and are reported, not returned as errors.
    pub async fn run(&self) -> Result<CrawlReport, CrawlError> {
        let started = Instant::now();
        tracing::info!(
            "Starting crawl run {} from {} using {} strategy",
            self.run_id,
            self.items.config.start_url,
            self.items.fetcher.kind()
        );

        let outcome = self.crawl().await;
        self.items.fetcher.shutdown().await;

        let abort_reason = match &outcome {
            Ok(reason) => reason.clone(),
            Err(e) => {
                tracing::error!("Crawl run {} failed: {}", self.run_id, e);
                Some(e.to_string())
            }
        };

        let state = &self.items.state;
        let mut phase = state.phase();
        if abort_reason.is_some() && phase != CrawlPhase::Aborted {
            phase = CrawlPhase::Aborted;
        }

        let report = CrawlReport {
            run_id: self.run_id,
            phase,
            abort_reason,
            pages_processed: state.pages_processed(),
            items_processed: state.items_processed(),
            records_saved: state.records_saved(),
            items_failed: state.items_failed(),
            cancelled: self.items.cancel.is_cancelled() && phase == CrawlPhase::Done,
        };

        let totals = RunTotals {
            pages_processed: report.pages_processed,
            items_processed: report.items_processed,
            records_saved: report.records_saved,
            items_failed: report.items_failed,
            abort_reason: report.abort_reason.clone(),
        };
        self.items
            .storage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .finish_run(self.run_id, report.status(), &totals)?;

        tracing::info!(
            "Crawl run {} finished ({}) in {:?}: {} pages, {} distinct advertisements seen, {} items, {} new records, {} failed",
            self.run_id,
            report.status().to_db_string(),
            started.elapsed(),
            report.pages_processed,
            state.seen_count(),
            report.items_processed,
            report.records_saved,
            report.items_failed
        );

        outcome?;
        Ok(report)
    }

    /// Drives the phase machine; returns the abort reason if the run was aborted
    async fn crawl(&self) -> Result<Option<String>, CrawlError> {
        let ctx = &self.items;
        let state = &ctx.state;
        let max_pages = ctx.config.effective_max_pages();
        let max_items = ctx.config.max_items;

        if max_pages == 0 || max_items == 0 {
            tracing::info!("Nothing to do: page quota {}, item quota {}", max_pages, max_items);
            state.transition(CrawlPhase::Done)?;
            return Ok(None);
        }

        loop {
            state.transition(CrawlPhase::FetchingListing)?;
            if ctx.cancel.is_cancelled() {
                state.transition(CrawlPhase::Done)?;
                return Ok(None);
            }

            let url = state.current_url();
            tracing::info!("Fetching listing page {}: {}", state.pages_processed() + 1, url);

            let fetcher = Arc::clone(&ctx.fetcher);
            let (page, retry) =
                fetch_with_retry(&ctx.retry, &url, &ctx.cancel, || fetcher.fetch(&url)).await;

            if !page.is_valid() {
                if ctx.cancel.is_cancelled() {
                    state.transition(CrawlPhase::Done)?;
                    return Ok(None);
                }

                let error = if page.class.is_hostile() {
                    CrawlError::Blocked {
                        url: url.clone(),
                        attempts: retry.attempts(),
                    }
                } else {
                    CrawlError::FetchExhausted {
                        url: url.clone(),
                        attempts: retry.attempts(),
                    }
                };
                tracing::warn!("Aborting crawl: {}", error);
                state.transition(CrawlPhase::Aborted)?;
                return Ok(Some(error.to_string()));
            }

            state.transition(CrawlPhase::ExtractingListing)?;
            let listing = extract_listing(&page.content, &url, &ctx.config.base_origin);
            tracing::info!("Found {} advertisements on {}", listing.item_urls.len(), url);

            state.transition(CrawlPhase::DispatchingItems)?;
            self.dispatch(listing.item_urls).await?;

            let pages = state.record_page();
            state.transition(CrawlPhase::AdvancingPage)?;

            let next = match listing.next_page {
                _ if ctx.cancel.is_cancelled() => None,
                Some(next) if is_same_page(&next, &url) => {
                    tracing::info!("Next page link points back at {}, stopping", url);
                    None
                }
                Some(_) if pages >= max_pages => {
                    tracing::info!("Page quota of {} reached", max_pages);
                    None
                }
                Some(_) if state.quota_reached(max_items) => {
                    tracing::info!("Item quota of {} reached", max_items);
                    None
                }
                Some(next) => Some(next),
                None => {
                    tracing::info!("No next page after {}", url);
                    None
                }
            };

            let Some(next) = next else {
                state.transition(CrawlPhase::Done)?;
                return Ok(None);
            };

            let delay = ctx.scheduler.page_delay();
            tracing::debug!("Waiting {:?} before {}", delay, next);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.cancel.cancelled() => {
                    state.transition(CrawlPhase::Done)?;
                    return Ok(None);
                }
            }

            state.set_current_url(next);
        }
    }

    /// Dispatches the items of one listing page and waits for all of them
    async fn dispatch(&self, item_urls: Vec<String>) -> Result<(), CrawlError> {
        let ctx = &self.items;
        let state = &ctx.state;
        let max_items = ctx.config.max_items;
        let per_page_cap = ctx.config.per_page_item_cap();

        let mut tasks = JoinSet::new();
        let mut taken = 0usize;

        for raw in item_urls {
            if ctx.cancel.is_cancelled() {
                tracing::info!("Cancelled, no further items will be dispatched");
                break;
            }
            if state.quota_reached(max_items) {
                break;
            }
            if per_page_cap.is_some_and(|cap| taken >= cap) {
                tracing::debug!("Test mode item cap reached for this page");
                break;
            }

            let url = match canonicalize(&raw) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!("Skipping unusable item URL {}: {}", raw, e);
                    continue;
                }
            };

            if !state.mark_seen(&url) {
                tracing::debug!("Already handled {} in this run", url);
                continue;
            }
            taken += 1;

            let known = ctx
                .storage
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .record_exists(&url);
            let known = match known {
                Ok(known) => known,
                Err(e) => {
                    tracing::error!("Could not look up {} in the store: {}", url, e);
                    if state.try_reserve_item(max_items) {
                        state.record_item_failed();
                    }
                    continue;
                }
            };
            if known {
                if state.try_reserve_item(max_items) {
                    tracing::debug!("{} is already stored", url);
                    state.record_item_done(false);
                }
                continue;
            }

            tracing::trace!("{} item slots free", ctx.scheduler.available_slots());
            let permit = tokio::select! {
                permit = ctx.scheduler.acquire() => permit,
                _ = ctx.cancel.cancelled() => None,
            };
            let Some(permit) = permit else {
                break;
            };

            if !state.try_reserve_item(max_items) {
                break;
            }

            tasks.spawn(Arc::clone(ctx).process(url, permit));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Item task did not complete: {}", e);
                state.record_item_failed();
            }
        }

        Ok(())
    }
}

/// True when two URLs name the same page after canonicalization
fn is_same_page(a: &str, b: &str) -> bool {
    match (canonicalize(a), canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Build the run settings from the file config
/// 2. Open the record store
/// 3. Start the configured fetch strategy
/// 4. Walk listing pages and store new advertisements
///
/// # Arguments
///
/// * `config` - The loaded file configuration
/// * `config_hash` - Hash of the config file, recorded with the run
/// * `max_items_override` - Replaces the configured item quota when set
/// * `cancel` - Token that stops the run from outside
pub async fn run_crawl(
    config: &Config,
    config_hash: &str,
    max_items_override: Option<u32>,
    cancel: CancellationToken,
) -> Result<CrawlReport, CrawlError> {
    let crawl_config = CrawlConfig::from_config(config, max_items_override)?;
    if let Some(proxy) = &crawl_config.proxy {
        tracing::info!("Using proxy {}", proxy.server);
    }

    let storage = open_storage(Path::new(&config.output.database_path))?;

    let fetcher: Arc<dyn FetchStrategy> = match crawl_config.strategy {
        StrategyKind::Http => Arc::new(HttpFetcher::new(&crawl_config)?),
        StrategyKind::Browser => Arc::new(BrowserFetcher::launch(&crawl_config).await?),
    };

    let coordinator = match Coordinator::new(
        crawl_config,
        storage,
        Arc::clone(&fetcher),
        config_hash,
        cancel,
    ) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            fetcher.shutdown().await;
            return Err(e);
        }
    };

    coordinator.run().await
}
