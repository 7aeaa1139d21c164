//! Pacing, concurrency limiting and retries
//!
//! This module handles:
//! - The global concurrency limit for item fetches via a semaphore
//! - Jittered delays before item requests and between listing pages
//! - Exponential retry backoff, stretched further for blocked pages

use crate::config::CrawlConfig;
use crate::crawler::classifier::PageClass;
use crate::crawler::fetcher::{DetailFetch, PageFetchResult};
use crate::state::RetryState;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// How often and how patiently a URL is re-fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub blocked_multiplier: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            base_backoff: config.retry_backoff,
            blocked_multiplier: config.blocked_backoff_multiplier.max(1),
        }
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based)
    ///
    /// The delay doubles with every attempt. Blocked and challenge pages wait
    /// `blocked_multiplier` times longer than other failures.
    pub fn backoff(&self, attempt: u32, class: PageClass) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_backoff.saturating_mul(factor);
        if class.is_hostile() {
            delay.saturating_mul(self.blocked_multiplier)
        } else {
            delay
        }
    }
}

/// Anything carrying the class of a fetch attempt
pub trait Classified {
    fn class(&self) -> PageClass;
}

impl Classified for PageFetchResult {
    fn class(&self) -> PageClass {
        self.class
    }
}

impl Classified for DetailFetch {
    fn class(&self) -> PageClass {
        self.page.class
    }
}

/// Repeats `attempt` until it yields a valid page, the policy is exhausted
/// or the run is cancelled
///
/// Returns the last result together with the retry bookkeeping. The caller
/// decides what a non-valid final result means.
pub async fn fetch_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    url: &str,
    cancel: &CancellationToken,
    mut attempt: F,
) -> (T, RetryState)
where
    T: Classified,
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
{
    let mut retry = RetryState::new();

    loop {
        retry.record_attempt();
        let result = attempt().await;
        let class = result.class();

        if class.is_valid() || retry.is_exhausted(policy.max_attempts) || cancel.is_cancelled() {
            return (result, retry);
        }

        let delay = policy.backoff(retry.attempts(), class);
        tracing::warn!(
            "{} was {} (attempt {}/{}), retrying in {:?}",
            url,
            class,
            retry.attempts(),
            policy.max_attempts,
            delay
        );
        retry.record_backoff(delay);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return (result, retry),
        }
    }
}

/// `base × (1 + sample × jitter)`, with `sample` in `[0, 1)`
pub fn jittered(base: Duration, jitter: f64, sample: f64) -> Duration {
    let factor = 1.0 + sample.clamp(0.0, 1.0) * jitter.max(0.0);
    base.mul_f64(factor)
}

/// Scheduler paces requests and bounds item concurrency
///
/// The scheduler coordinates:
/// - The global concurrency limit (max item fetches in flight)
/// - The per-request delay taken before every item fetch
/// - The longer delay taken before moving to the next listing page
#[derive(Debug, Clone)]
pub struct Scheduler {
    /// Global semaphore for limiting concurrent item fetches
    semaphore: Arc<Semaphore>,
    request_delay: Duration,
    jitter: f64,
    page_delay_multiplier: f64,
}

impl Scheduler {
    pub fn new(config: &CrawlConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.concurrency.max(1))),
            request_delay: config.request_delay,
            jitter: config.jitter,
            page_delay_multiplier: config.page_delay_multiplier,
        }
    }

    /// Waits for a free item slot
    ///
    /// Returns None only if the semaphore was closed.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.ok()
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Delay taken before each item request
    pub fn item_delay(&self) -> Duration {
        let sample = rand::rng().random::<f64>();
        jittered(self.request_delay, self.jitter, sample)
    }

    /// Delay taken before fetching the next listing page
    pub fn page_delay(&self) -> Duration {
        self.item_delay().mul_f64(self.page_delay_multiplier.max(0.0))
    }
}
