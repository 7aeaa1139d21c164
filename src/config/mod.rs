//! Configuration module
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and turning them into the immutable [`CrawlConfig`] a run uses.
//!
//! # Example
//!
//! ```no_run
//! use ria_harvest::config::{load_config, CrawlConfig};
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! let run = CrawlConfig::from_config(&config, None).unwrap();
//! println!("Crawl starts at {}", run.start_url);
//! ```

mod parser;
mod runtime;
mod types;
mod validation;

// Re-export types
pub use runtime::{CrawlConfig, ProxySettings};
pub use types::{Config, CrawlerConfig, DelayConfig, OutputConfig, ProxyConfig, StrategyKind};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
