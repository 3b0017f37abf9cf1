//! Configuration module for Sumi-Glean
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and validating the per-job crawl requests built from them.
//!
//! # Example
//!
//! ```no_run
//! use sumi_glean::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Default page budget: {}", config.crawler.max_pages);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, OutputConfig, RetryConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{
    validate_request, MAX_PAGES_LIMIT, MAX_TIMEOUT_MS, MIN_TIMEOUT_MS,
};
