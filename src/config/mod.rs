//! Configuration module for Scrapedex
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use scrapedex::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Crawling {} fields", config.fields.len());
//! ```

mod cleanup;
mod parser;
mod types;
mod validation;

// Re-export types
pub use cleanup::CleanupRules;
pub use types::{
    Config, CrawlerConfig, FieldConfig, IndexerConfig, OutputConfig, SelectorKind,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
