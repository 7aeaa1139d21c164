use serde::Deserialize;

/// Main configuration structure, mirroring the TOML file layout
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub delay: DelayConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    pub output: OutputConfig,
}

/// Which fetch strategy drives the crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Plain HTTP client with rotated headers
    Http,
    /// Automated Chromium session with the stealth payload installed
    Browser,
}

impl Default for StrategyKind {
    fn default() -> Self {
        StrategyKind::Browser
    }
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Http => "http",
            StrategyKind::Browser => "browser",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(StrategyKind::Http),
            "browser" => Ok(StrategyKind::Browser),
            other => Err(format!("unknown strategy '{}', expected http or browser", other)),
        }
    }
}

/// Crawl scope and bounds
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// First listing page to fetch
    #[serde(rename = "start-url")]
    pub start_url: String,

    /// Maximum number of listing pages to walk
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Maximum number of detail items to process across the run
    #[serde(rename = "max-items")]
    pub max_items: u32,

    /// Number of detail pages fetched at the same time
    #[serde(rename = "concurrency", default = "default_concurrency")]
    pub concurrency: u32,

    #[serde(default)]
    pub strategy: StrategyKind,

    /// Restricts the run to one page and a handful of items
    #[serde(rename = "test-mode", default)]
    pub test_mode: bool,

    #[serde(rename = "test-item-cap", default = "default_test_item_cap")]
    pub test_item_cap: u32,

    /// Pages with less trimmed content than this are treated as failed loads
    #[serde(rename = "min-content-length", default = "default_min_content_length")]
    pub min_content_length: usize,

    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Pacing and retry behavior
#[derive(Debug, Clone, Deserialize)]
pub struct DelayConfig {
    /// Base pause before each detail request (milliseconds)
    #[serde(rename = "request-delay-ms", default = "default_request_delay")]
    pub request_delay_ms: u64,

    /// Random extra fraction applied on top of the base delay
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Listing pages wait this many times the per-request delay
    #[serde(rename = "page-delay-multiplier", default = "default_page_multiplier")]
    pub page_delay_multiplier: f64,

    #[serde(rename = "retry-attempts", default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base backoff, doubled on every failed attempt (milliseconds)
    #[serde(rename = "retry-backoff-ms", default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Extra factor applied to backoff when the site blocks or challenges us
    #[serde(rename = "blocked-backoff-multiplier", default = "default_blocked_multiplier")]
    pub blocked_backoff_multiplier: u32,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: default_request_delay(),
            jitter: default_jitter(),
            page_delay_multiplier: default_page_multiplier(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff(),
            blocked_backoff_multiplier: default_blocked_multiplier(),
        }
    }
}

/// Outbound proxy pool
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub servers: Vec<String>,

    pub username: Option<String>,

    pub password: Option<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_concurrency() -> u32 {
    3
}

fn default_test_item_cap() -> u32 {
    3
}

fn default_min_content_length() -> usize {
    1000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_request_delay() -> u64 {
    1000
}

fn default_jitter() -> f64 {
    0.5
}

fn default_page_multiplier() -> f64 {
    2.0
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    2000
}

fn default_blocked_multiplier() -> u32 {
    2
}
