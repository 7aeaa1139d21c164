//! Headless browser fetch strategy
//!
//! One Chromium process is launched per run and shared by all item tasks;
//! every fetch opens its own tab. Each tab gets the stealth script before
//! navigation, waits for the DOM rather than network idle, and plays a short
//! randomized interaction plan before the content is read.

use crate::config::{CrawlConfig, StrategyKind};
use crate::crawler::classifier::{classify, PageClass};
use crate::crawler::fetcher::{DetailFetch, FetchStrategy, PageFetchResult};
use crate::crawler::http_fetcher::random_user_agent;
use crate::crawler::phone::{
    looks_like_phone, normalize_phone, parse_phone_response, REVEALED_PHONE_SELECTORS,
    REVEAL_TRIGGERS, VISIBLE_PHONE_SELECTORS,
};
use crate::crawler::stealth::{
    scroll_script, InteractionPlan, INCIDENTAL_CLICK_SCRIPT, READY_STATE_SCRIPT, STEALTH_SCRIPT,
};
use crate::extract::{extract_static_phone, find_ad_id};
use crate::url::redirected_off_shape;
use crate::CrawlError;
use async_trait::async_trait;
use chromiumoxide::auth::Credentials;
use chromiumoxide::layout::Point;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Time the reveal control needs to swap in the number
const REVEAL_SETTLE: Duration = Duration::from_millis(1500);

const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);

const PAGE_HEIGHT_SCRIPT: &str = "document.body ? document.body.scrollHeight : 0";

/// Fetch strategy backed by a headless Chromium
pub struct BrowserFetcher {
    browser: RwLock<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    credentials: Option<Credentials>,
    base_origin: String,
    request_timeout: Duration,
    min_content_length: usize,
}

impl BrowserFetcher {
    /// Launches Chromium for a run
    ///
    /// The proxy picked for the run, if any, is passed as a launch argument;
    /// its credentials are answered per tab.
    pub async fn launch(config: &CrawlConfig) -> Result<Self, CrawlError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(config.request_timeout)
            .window_size(1920, 1080)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--lang=uk-UA")
            .arg("--window-size=1920,1080")
            .arg("--disable-dev-shm-usage");

        let mut credentials = None;
        if let Some(proxy) = &config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy.server));
            if let (Some(username), Some(password)) = (&proxy.username, &proxy.password) {
                credentials = Some(Credentials {
                    username: username.clone(),
                    password: password.clone(),
                });
            }
        }

        let browser_config = builder.build().map_err(CrawlError::Browser)?;
        let (browser, mut handler) = Browser::launch(browser_config).await?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        tracing::info!("Launched headless browser");

        Ok(Self {
            browser: RwLock::new(Some(browser)),
            handler: Mutex::new(Some(handler_task)),
            credentials,
            base_origin: config.base_origin.clone(),
            request_timeout: config.request_timeout,
            min_content_length: config.min_content_length,
        })
    }

    /// Opens a blank tab with the stealth setup applied
    async fn open_page(&self) -> Result<Page, CrawlError> {
        let page = {
            let guard = self.browser.read().await;
            let browser = guard
                .as_ref()
                .ok_or_else(|| CrawlError::Browser("browser already shut down".to_string()))?;
            browser.new_page("about:blank").await?
        };

        page.evaluate_on_new_document(STEALTH_SCRIPT).await?;
        page.set_user_agent(random_user_agent()).await?;
        if let Some(credentials) = &self.credentials {
            page.authenticate(credentials.clone()).await?;
        }

        Ok(page)
    }

    /// Navigates and waits until the document is no longer loading
    async fn navigate(&self, page: &Page, url: &str) -> Result<(), CrawlError> {
        page.goto(url).await?;

        let deadline = Instant::now() + self.request_timeout;
        loop {
            let state: String = page
                .evaluate(READY_STATE_SCRIPT)
                .await?
                .into_value()
                .unwrap_or_default();
            if state != "loading" {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CrawlError::Browser(format!("{} never finished loading", url)));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Plays a randomized scroll/mouse sequence; failures only cost realism
    async fn interact(&self, page: &Page) {
        let height: i64 = match page.evaluate(PAGE_HEIGHT_SCRIPT).await {
            Ok(result) => result.into_value().unwrap_or(0),
            Err(_) => 0,
        };
        let plan = InteractionPlan::random(height);
        tracing::debug!(
            "Interacting: {} scrolls, {} mouse moves, about {:?} of pauses",
            plan.scrolls.len(),
            plan.mouse_moves.len(),
            plan.total_pause()
        );

        for (y, pause) in &plan.scrolls {
            if let Err(e) = page.evaluate(scroll_script(*y)).await {
                tracing::debug!("Scroll failed: {}", e);
                break;
            }
            tokio::time::sleep(*pause).await;
        }

        for (x, y) in &plan.mouse_moves {
            if let Err(e) = page.move_mouse(Point::new(*x, *y)).await {
                tracing::debug!("Mouse move failed: {}", e);
                break;
            }
        }

        if plan.incidental_click {
            if let Err(e) = page.evaluate(INCIDENTAL_CLICK_SCRIPT).await {
                tracing::debug!("Incidental click failed: {}", e);
            }
        }

        tokio::time::sleep(plan.reading_pause).await;
    }

    /// Loads `url` in `page` and classifies the result
    async fn load(&self, page: &Page, url: &str) -> Result<PageFetchResult, CrawlError> {
        self.navigate(page, url).await?;

        let landed = page.url().await?.unwrap_or_else(|| url.to_string());
        if redirected_off_shape(url, &landed) {
            tracing::warn!("{} landed on {}, treating as blocked", url, landed);
            return Ok(PageFetchResult {
                url: url.to_string(),
                final_url: landed,
                content: page.content().await.unwrap_or_default(),
                class: PageClass::Blocked,
                source: StrategyKind::Browser,
            });
        }

        self.interact(page).await;

        let final_url = page.url().await?.unwrap_or(landed);
        let content = page.content().await?;
        let class = classify(&content, &final_url, self.min_content_length);

        Ok(PageFetchResult {
            url: url.to_string(),
            final_url,
            content,
            class,
            source: StrategyKind::Browser,
        })
    }

    /// Runs a whole fetch inside one tab, closing the tab afterwards
    async fn with_page(&self, url: &str, reveal: bool) -> DetailFetch {
        let page = match self.open_page().await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Could not open a tab for {}: {}", url, e);
                return DetailFetch {
                    page: PageFetchResult::failed(url, StrategyKind::Browser),
                    revealed_phone: None,
                };
            }
        };

        let loaded = match tokio::time::timeout(self.request_timeout * 2, self.load(&page, url)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!("Browser fetch of {} failed: {}", url, e);
                PageFetchResult::failed(url, StrategyKind::Browser)
            }
            Err(_) => {
                tracing::warn!("Browser fetch of {} timed out", url);
                PageFetchResult::failed(url, StrategyKind::Browser)
            }
        };

        let revealed_phone = if reveal
            && loaded.is_valid()
            && extract_static_phone(&loaded.content).is_none()
        {
            self.reveal_phone(&page, &loaded).await
        } else {
            None
        };

        if let Err(e) = page.close().await {
            tracing::debug!("Failed to close tab for {}: {}", url, e);
        }

        DetailFetch {
            page: loaded,
            revealed_phone,
        }
    }

    /// Walks the reveal steps in order until one yields a phone
    async fn reveal_phone(&self, page: &Page, loaded: &PageFetchResult) -> Option<String> {
        if self.click_reveal(page).await {
            tokio::time::sleep(REVEAL_SETTLE).await;
            if let Some(phone) = self.read_revealed(page).await {
                return Some(phone);
            }
        }

        if let Some(ad_id) = find_ad_id(&loaded.content, &loaded.url) {
            if let Some(phone) = self.ask_phone_endpoint(page, &ad_id).await {
                return Some(phone);
            }
        } else {
            tracing::debug!("No advertisement id for {}", loaded.url);
        }

        let phone = self.read_visible(page).await;
        if phone.is_none() {
            tracing::debug!("No phone revealed for {}", loaded.url);
        }
        phone
    }

    async fn click_reveal(&self, page: &Page) -> bool {
        for trigger in REVEAL_TRIGGERS {
            let Ok(element) = page.find_element(*trigger).await else {
                continue;
            };
            match element.click().await {
                Ok(_) => return true,
                Err(e) => tracing::warn!("Clicking phone trigger {} failed: {}", trigger, e),
            }
        }
        false
    }

    async fn read_revealed(&self, page: &Page) -> Option<String> {
        if let Ok(link) = page.find_element(".phone_show_link[data-phone-number]").await {
            if let Ok(Some(raw)) = link.attribute("data-phone-number").await {
                if let Some(phone) = normalize_phone(&raw) {
                    return Some(phone);
                }
            }
        }

        for selector in REVEALED_PHONE_SELECTORS {
            let Ok(element) = page.find_element(*selector).await else {
                continue;
            };
            if let Ok(Some(text)) = element.inner_text().await {
                if let Some(phone) = normalize_phone(&text) {
                    return Some(phone);
                }
            }
        }
        None
    }

    /// Calls the phone endpoint from inside the tab so the site's cookies travel with it
    async fn ask_phone_endpoint(&self, page: &Page, ad_id: &str) -> Option<String> {
        let script = format!(
            "fetch('{}/users/phones/{}', {{ headers: {{ 'X-Requested-With': 'XMLHttpRequest', 'Accept': 'application/json' }}, credentials: 'include' }}).then((r) => r.ok ? r.json() : null).catch(() => null)",
            self.base_origin, ad_id
        );

        match page.evaluate(script).await {
            Ok(result) => result
                .into_value::<serde_json::Value>()
                .ok()
                .and_then(|body| parse_phone_response(&body))
                .and_then(|raw| normalize_phone(&raw)),
            Err(e) => {
                tracing::warn!("Phone endpoint call for {} failed: {}", ad_id, e);
                None
            }
        }
    }

    async fn read_visible(&self, page: &Page) -> Option<String> {
        for selector in VISIBLE_PHONE_SELECTORS {
            let Ok(element) = page.find_element(*selector).await else {
                continue;
            };
            if let Ok(Some(text)) = element.inner_text().await {
                if looks_like_phone(text.trim()) {
                    return normalize_phone(&text);
                }
            }
        }
        None
    }
}

#[async_trait]
impl FetchStrategy for BrowserFetcher {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Browser
    }

    async fn fetch(&self, url: &str) -> PageFetchResult {
        self.with_page(url, false).await.page
    }

    async fn fetch_detail(&self, url: &str) -> DetailFetch {
        self.with_page(url, true).await
    }

    async fn shutdown(&self) {
        if let Some(mut browser) = self.browser.write().await.take() {
            if let Err(e) = browser.close().await {
                tracing::warn!("Failed to close browser: {}", e);
            }
            if let Err(e) = browser.wait().await {
                tracing::debug!("Browser process did not exit cleanly: {}", e);
            }
        }

        let handler = self
            .handler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handler) = handler {
            handler.abort();
        }

        tracing::info!("Browser shut down");
    }
}
