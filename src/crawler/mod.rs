//! Crawler module for page fetching and record extraction
//!
//! This module contains the core crawling logic, including:
//! - Per-depth level queues and the work-stealing scheduler
//! - The crawl engine that drives one task per worker
//! - Page fetching behind the `PageFetcher` / `PageSession` traits
//! - Selector compilation, link discovery and field extraction
//! - Before-extraction actions and crawl statistics

pub mod actions;
mod engine;
pub mod extract;
mod fetcher;
pub mod level_queue;
pub mod scheduler;
pub mod selector;
pub mod stats;

pub use actions::{Action, ActionExecutor, ScrollDirection, SequentialActionExecutor};
pub use engine::{CrawlEngine, CrawlOutcome};
pub use fetcher::{
    build_http_client, fetch_page, user_agent_string, Element, FetchError, HttpPageFetcher,
    PageFetcher, PageSession, RenderedPage,
};
pub use level_queue::{LevelQueue, TraversalOrder};
pub use scheduler::{Admission, WorkStealingScheduler, MIN_STEAL_BATCH};
pub use stats::{print_statistics, CrawlStatistics};
