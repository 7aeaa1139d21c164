//! Fetch strategies
//!
//! A fetch strategy turns a URL into a classified [`PageFetchResult`]. Two
//! implementations exist: a plain HTTP client and a headless browser. The
//! coordinator only ever sees the [`FetchStrategy`] trait object.
//!
//! Transient failures are never returned as errors. A timeout or a refused
//! connection becomes a `Failed` result so the retry policy can decide.

use crate::config::StrategyKind;
use crate::crawler::classifier::PageClass;
use async_trait::async_trait;

/// Result of one fetch attempt
#[derive(Debug, Clone)]
pub struct PageFetchResult {
    /// URL that was requested
    pub url: String,

    /// URL the fetch ended on after redirects
    pub final_url: String,

    /// Page content, possibly empty
    pub content: String,

    pub class: PageClass,

    /// Strategy that produced this result
    pub source: StrategyKind,
}

impl PageFetchResult {
    /// A `Failed` result with no content
    pub fn failed(url: &str, source: StrategyKind) -> Self {
        Self {
            url: url.to_string(),
            final_url: url.to_string(),
            content: String::new(),
            class: PageClass::Failed,
            source,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.class.is_valid()
    }
}

/// A fetched detail page together with a phone revealed while it was open
#[derive(Debug, Clone)]
pub struct DetailFetch {
    pub page: PageFetchResult,
    pub revealed_phone: Option<String>,
}

/// Interface shared by the HTTP and browser fetchers
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Which strategy this is
    fn kind(&self) -> StrategyKind;

    /// Fetches and classifies one page
    async fn fetch(&self, url: &str) -> PageFetchResult;

    /// Fetches a detail page, revealing the seller phone when it is not in the markup
    ///
    /// The default does no reveal.
    async fn fetch_detail(&self, url: &str) -> DetailFetch {
        DetailFetch {
            page: self.fetch(url).await,
            revealed_phone: None,
        }
    }

    /// Releases sessions held by the strategy
    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFetcher;

    #[async_trait]
    impl FetchStrategy for FixedFetcher {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Http
        }

        async fn fetch(&self, url: &str) -> PageFetchResult {
            PageFetchResult {
                url: url.to_string(),
                final_url: url.to_string(),
                content: "<html></html>".to_string(),
                class: PageClass::Valid,
                source: StrategyKind::Http,
            }
        }
    }

    #[test]
    fn test_failed_result() {
        let result = PageFetchResult::failed("https://auto.ria.com/", StrategyKind::Browser);
        assert_eq!(result.class, PageClass::Failed);
        assert_eq!(result.final_url, "https://auto.ria.com/");
        assert!(result.content.is_empty());
        assert!(!result.is_valid());
    }

    #[tokio::test]
    async fn test_default_fetch_detail_reveals_nothing() {
        let fetcher = FixedFetcher;
        let detail = fetcher.fetch_detail("https://auto.ria.com/uk/auto_a_1.html").await;
        assert!(detail.page.is_valid());
        assert_eq!(detail.revealed_phone, None);
    }
}
