//! Robots.txt handling module
//!
//! The crawl engine asks a `RobotsPolicy` once per run for the disallow
//! patterns that apply to it, then tests every discovered link's path
//! against them.

mod parser;

pub use parser::{disallow_to_regex, ParsedRobots};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use url::Url;

/// Source of robots.txt disallow patterns
#[async_trait]
pub trait RobotsPolicy: Send + Sync {
    /// Returns the disallow patterns published at `robots_url`
    ///
    /// Failures are not errors: an unreachable or missing robots.txt
    /// yields no patterns.
    async fn disallowed_patterns(&self, robots_url: &Url) -> Vec<Regex>;
}

/// Fetches robots.txt over HTTP
#[derive(Debug, Clone)]
pub struct HttpRobotsPolicy {
    client: Client,
    crawler_name: String,
}

impl HttpRobotsPolicy {
    /// # Arguments
    ///
    /// * `client` - HTTP client carrying the crawler's user agent
    /// * `crawler_name` - Product token used to select the robots.txt group
    pub fn new(client: Client, crawler_name: impl Into<String>) -> Self {
        Self {
            client,
            crawler_name: crawler_name.into(),
        }
    }

    async fn fetch_content(&self, robots_url: &Url) -> Option<String> {
        let response = match self.client.get(robots_url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Failed to fetch {}: {}", robots_url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::info!(
                "No robots.txt at {} (HTTP {})",
                robots_url,
                response.status().as_u16()
            );
            return None;
        }

        match response.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", robots_url, e);
                None
            }
        }
    }
}

#[async_trait]
impl RobotsPolicy for HttpRobotsPolicy {
    async fn disallowed_patterns(&self, robots_url: &Url) -> Vec<Regex> {
        match self.fetch_content(robots_url).await {
            Some(content) => {
                ParsedRobots::from_content(&content, &self.crawler_name).into_patterns()
            }
            None => Vec::new(),
        }
    }
}

/// A policy that never disallows anything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl RobotsPolicy for AllowAll {
    async fn disallowed_patterns(&self, _robots_url: &Url) -> Vec<Regex> {
        Vec::new()
    }
}

/// `/robots.txt` on the seed's origin
pub fn default_robots_url(seed: &Url) -> Option<Url> {
    seed.join("/robots.txt").ok()
}

/// The part of a URL robots rules are matched against: path plus query
pub fn robots_target(url: &Url) -> &str {
    &url[url::Position::BeforePath..url::Position::AfterQuery]
}
