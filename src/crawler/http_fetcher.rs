//! Plain HTTP fetch strategy
//!
//! Sends requests with a rotating browser-like header set, follows
//! redirects and classifies what comes back. No JavaScript runs, so phones
//! can only come from static markup or the phone endpoint.

use crate::config::{CrawlConfig, StrategyKind};
use crate::crawler::classifier::{classify, PageClass};
use crate::crawler::fetcher::{DetailFetch, FetchStrategy, PageFetchResult};
use crate::crawler::phone::lookup_phone;
use crate::extract::{extract_static_phone, find_ad_id};
use crate::url::redirected_off_shape;
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{redirect::Policy, Client, Proxy, StatusCode};
use std::time::Duration;

/// Desktop user agents rotated per request
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

pub const ACCEPT_LANGUAGE_VALUE: &str = "uk-UA,uk;q=0.9,en-US;q=0.8,en;q=0.7";

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

const MAX_REDIRECTS: usize = 10;

/// Picks a user agent for the next request
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Builds the HTTP client for a run
///
/// # Arguments
///
/// * `config` - Run settings; the timeout and the chosen proxy are applied
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - The proxy URL was rejected or TLS setup failed
pub fn build_http_client(config: &CrawlConfig) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    default_headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));

    let mut builder = Client::builder()
        .default_headers(default_headers)
        .timeout(config.request_timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &config.proxy {
        let mut upstream = Proxy::all(&proxy.server)?;
        if let (Some(username), Some(password)) = (&proxy.username, &proxy.password) {
            upstream = upstream.basic_auth(username, password);
        }
        builder = builder.proxy(upstream);
    }

    builder.build()
}

/// Fetch strategy backed by `reqwest`
pub struct HttpFetcher {
    client: Client,
    base_origin: String,
    min_content_length: usize,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            base_origin: config.base_origin.clone(),
            min_content_length: config.min_content_length,
        })
    }

    /// Maps an HTTP status to a class, or None when the body should be inspected
    fn status_class(status: StatusCode) -> Option<PageClass> {
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            Some(PageClass::Blocked)
        } else if !status.is_success() {
            Some(PageClass::Failed)
        } else {
            None
        }
    }
}

#[async_trait]
impl FetchStrategy for HttpFetcher {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Http
    }

    async fn fetch(&self, url: &str) -> PageFetchResult {
        let user_agent = random_user_agent();

        let response = match self.client.get(url).header(USER_AGENT, user_agent).send().await {
            Ok(response) => response,
            Err(e) => {
                if e.is_timeout() {
                    tracing::warn!("Timed out fetching {}", url);
                } else {
                    tracing::warn!("Request to {} failed: {}", url, e);
                }
                return PageFetchResult::failed(url, StrategyKind::Http);
            }
        };

        let status = response.status();
        let final_url = response.url().to_string();

        let status_class = Self::status_class(status);
        if let Some(class) = status_class {
            tracing::warn!("{} answered {} ({})", url, status.as_u16(), class);
        }

        let content = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Failed to read body of {}: {}", url, e);
                return PageFetchResult::failed(url, StrategyKind::Http);
            }
        };

        let class = match status_class {
            Some(class) => class,
            None if redirected_off_shape(url, &final_url) => {
                tracing::warn!("{} redirected to {}, treating as blocked", url, final_url);
                PageClass::Blocked
            }
            None => classify(&content, &final_url, self.min_content_length),
        };

        PageFetchResult {
            url: url.to_string(),
            final_url,
            content,
            class,
            source: StrategyKind::Http,
        }
    }

    async fn fetch_detail(&self, url: &str) -> DetailFetch {
        let page = self.fetch(url).await;
        if !page.is_valid() || extract_static_phone(&page.content).is_some() {
            return DetailFetch {
                page,
                revealed_phone: None,
            };
        }

        let revealed_phone = match find_ad_id(&page.content, url) {
            Some(ad_id) => lookup_phone(&self.client, &self.base_origin, &ad_id, url).await,
            None => {
                tracing::debug!("No advertisement id for {}, skipping phone lookup", url);
                None
            }
        };

        DetailFetch {
            page,
            revealed_phone,
        }
    }
}
