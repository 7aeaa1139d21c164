use crate::config::types::{Config, StrategyKind};
use crate::url::origin_of;
use crate::ConfigError;
use rand::seq::IndexedRandom;
use std::time::Duration;
use url::Url;

/// Proxy endpoint chosen for a single run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Immutable settings for one crawl run
///
/// Built once from the file [`Config`] when a run starts and threaded down to
/// every component. Nothing below the coordinator reads the file config.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub start_url: Url,
    /// Scheme and host of the start URL, used to absolutize extracted links
    pub base_origin: String,
    pub max_pages: u32,
    pub max_items: u32,
    pub concurrency: usize,
    pub strategy: StrategyKind,
    pub request_delay: Duration,
    pub jitter: f64,
    pub page_delay_multiplier: f64,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub blocked_backoff_multiplier: u32,
    pub request_timeout: Duration,
    pub min_content_length: usize,
    pub proxy: Option<ProxySettings>,
    pub test_mode: bool,
    pub test_item_cap: u32,
}

impl CrawlConfig {
    /// Builds run settings from a validated file config
    ///
    /// `max_items_override` replaces the configured item quota when given. When
    /// the proxy pool is enabled one server is picked at random for the run.
    pub fn from_config(config: &Config, max_items_override: Option<u32>) -> Result<Self, ConfigError> {
        let start_url = Url::parse(&config.crawler.start_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid start-url: {}", e)))?;
        let base_origin = origin_of(&start_url)
            .map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;

        let proxy = if config.proxy.enabled {
            config
                .proxy
                .servers
                .choose(&mut rand::rng())
                .map(|server| ProxySettings {
                    server: server.clone(),
                    username: config.proxy.username.clone(),
                    password: config.proxy.password.clone(),
                })
        } else {
            None
        };

        Ok(Self {
            start_url,
            base_origin,
            max_pages: config.crawler.max_pages,
            max_items: max_items_override.unwrap_or(config.crawler.max_items),
            concurrency: config.crawler.concurrency.max(1) as usize,
            strategy: config.crawler.strategy,
            request_delay: Duration::from_millis(config.delay.request_delay_ms),
            jitter: config.delay.jitter,
            page_delay_multiplier: config.delay.page_delay_multiplier,
            retry_attempts: config.delay.retry_attempts.max(1),
            retry_backoff: Duration::from_millis(config.delay.retry_backoff_ms),
            blocked_backoff_multiplier: config.delay.blocked_backoff_multiplier.max(1),
            request_timeout: Duration::from_secs(config.crawler.request_timeout_secs),
            min_content_length: config.crawler.min_content_length,
            proxy,
            test_mode: config.crawler.test_mode,
            test_item_cap: config.crawler.test_item_cap,
        })
    }

    /// Page quota after test mode is applied
    pub fn effective_max_pages(&self) -> u32 {
        if self.test_mode {
            self.max_pages.min(1)
        } else {
            self.max_pages
        }
    }

    /// Per-page item cap, only present in test mode
    pub fn per_page_item_cap(&self) -> Option<usize> {
        self.test_mode.then_some(self.test_item_cap as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{CrawlerConfig, DelayConfig, OutputConfig, ProxyConfig};

    fn file_config() -> Config {
        Config {
            crawler: CrawlerConfig {
                start_url: "https://auto.ria.com/uk/car/used/?page=1".to_string(),
                max_pages: 4,
                max_items: 20,
                concurrency: 2,
                strategy: StrategyKind::Http,
                test_mode: false,
                test_item_cap: 3,
                min_content_length: 1000,
                request_timeout_secs: 30,
            },
            delay: DelayConfig::default(),
            proxy: ProxyConfig::default(),
            output: OutputConfig {
                database_path: "cars.db".to_string(),
            },
        }
    }

    #[test]
    fn test_base_origin_from_start_url() {
        let config = CrawlConfig::from_config(&file_config(), None).unwrap();
        assert_eq!(config.base_origin, "https://auto.ria.com");
        assert_eq!(config.max_items, 20);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.proxy.is_none());
    }

    #[test]
    fn test_max_items_override() {
        let config = CrawlConfig::from_config(&file_config(), Some(5)).unwrap();
        assert_eq!(config.max_items, 5);
    }

    #[test]
    fn test_proxy_picked_from_pool() {
        let mut file = file_config();
        file.proxy = ProxyConfig {
            enabled: true,
            servers: vec![
                "http://10.0.0.1:3128".to_string(),
                "http://10.0.0.2:3128".to_string(),
            ],
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
        };

        let config = CrawlConfig::from_config(&file, None).unwrap();
        let proxy = config.proxy.unwrap();
        assert!(file.proxy.servers.contains(&proxy.server));
        assert_eq!(proxy.username.as_deref(), Some("user"));
    }

    #[test]
    fn test_test_mode_limits() {
        let mut file = file_config();
        file.crawler.test_mode = true;
        let config = CrawlConfig::from_config(&file, None).unwrap();
        assert_eq!(config.effective_max_pages(), 1);
        assert_eq!(config.per_page_item_cap(), Some(3));

        file.crawler.test_mode = false;
        let config = CrawlConfig::from_config(&file, None).unwrap();
        assert_eq!(config.effective_max_pages(), 4);
        assert_eq!(config.per_page_item_cap(), None);
    }
}
