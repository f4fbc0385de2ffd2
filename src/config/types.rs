use serde::Deserialize;
use std::collections::HashMap;

use crate::crawler::actions::Action;
use crate::crawler::level_queue::TraversalOrder;

/// Main configuration structure for Scrapedex
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    /// Field definitions (inspectors), one per extracted column
    #[serde(default, rename = "field")]
    pub fields: Vec<FieldConfig>,
    /// Actions run on every page before extraction
    #[serde(default, rename = "action")]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub indexer: Option<IndexerConfig>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Start URL given to every worker
    #[serde(rename = "seed-url")]
    pub seed_url: String,

    /// Number of crawl workers, each with its own page session
    #[serde(default = "default_threads")]
    pub threads: u32,

    /// Maximum depth to crawl from the seed URL
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Cap on the number of links admitted to the link table
    #[serde(rename = "max-pages")]
    pub max_pages: usize,

    /// Stop extracting once this many documents were collected
    #[serde(rename = "max-collected-docs", default = "default_max_collected_docs")]
    pub max_collected_docs: u64,

    #[serde(default)]
    pub traversal: TraversalOrder,

    /// Keep every element a field selector matches instead of only the first
    #[serde(rename = "allow-multi-elements", default)]
    pub allow_multi_elements: bool,

    /// Idle sleep before asking for donated work (milliseconds)
    #[serde(rename = "idle-backoff-ms", default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,

    /// Randomize the idle sleep between 0 and `idle-backoff-ms`
    #[serde(rename = "idle-jitter", default)]
    pub idle_jitter: bool,

    /// Regions of the page searched for links and fields
    #[serde(rename = "scope-selectors", default = "default_scope_selectors")]
    pub scope_selectors: Vec<String>,

    #[serde(rename = "scope-selector-kind", default)]
    pub scope_selector_kind: SelectorKind,

    /// Exact URLs that are never queued
    #[serde(rename = "excluded-urls", default)]
    pub excluded_urls: Vec<String>,

    /// Location of robots.txt; derived from the seed host when absent
    #[serde(rename = "robots-url", default)]
    pub robots_url: Option<String>,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Whether a selector string is CSS or XPath
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorKind {
    #[default]
    Xpath,
    Css,
}

/// One extractable field (an "inspector")
#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    pub name: String,

    pub selector: String,

    #[serde(rename = "selector-kind", default)]
    pub selector_kind: SelectorKind,

    /// Attribute to read instead of the element text
    #[serde(default)]
    pub attribute: Option<String>,

    /// Pipe-delimited `pattern=replacement` rules applied in order
    #[serde(rename = "clean-up", default)]
    pub clean_up: Option<String>,

    /// Name under which the cleaned value is visible to the boosting formula
    #[serde(rename = "variable-name", default)]
    pub variable_name: Option<String>,
}

/// Search index configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    pub name: String,

    /// Field names whose values are indexed
    pub fields: Vec<String>,

    #[serde(default = "default_k")]
    pub k: f64,

    #[serde(default = "default_b")]
    pub b: f64,

    /// Tokens with this many characters or fewer are dropped
    #[serde(rename = "small-words-threshold", default)]
    pub small_words_threshold: usize,

    #[serde(rename = "skip-words", default)]
    pub skip_words: Vec<String>,

    /// Additive score bonus per word
    #[serde(rename = "weight-words", default)]
    pub weight_words: HashMap<String, f64>,

    #[serde(rename = "boosting-formula", default)]
    pub boosting_formula: Option<String>,

    /// Tab-separated entity dictionary for suggestions
    #[serde(default)]
    pub dictionary: Option<String>,

    #[serde(default = "default_q")]
    pub q: usize,

    #[serde(rename = "use-synonyms", default)]
    pub use_synonyms: bool,

    #[serde(rename = "suggest-delta", default = "default_suggest_delta")]
    pub suggest_delta: usize,
}

fn default_threads() -> u32 {
    1
}

fn default_max_collected_docs() -> u64 {
    u64::MAX
}

fn default_idle_backoff_ms() -> u64 {
    5000
}

fn default_scope_selectors() -> Vec<String> {
    vec!["//body".to_string()]
}

fn default_k() -> f64 {
    1.75
}

fn default_b() -> f64 {
    0.75
}

fn default_q() -> usize {
    3
}

fn default_suggest_delta() -> usize {
    1
}
