//! Page fetching
//!
//! This module defines the page-fetcher capability the crawl engine
//! drives, plus an HTTP implementation of it:
//! - `PageFetcher` opens one `PageSession` per worker; sessions are never shared
//! - `PageSession` loads pages and performs the click/scroll steps of actions
//! - `RenderedPage` answers element queries by CSS or XPath selector
//! - `HttpPageFetcher` is a plain `reqwest` client without a script engine

use crate::config::{SelectorKind, UserAgentConfig};
use crate::crawler::actions::ScrollDirection;
use crate::crawler::selector;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use scraper::{ElementRef, Html};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Errors raised while loading or querying a page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Not an HTML page ({content_type}): {url}")]
    ContentMismatch { url: String, content_type: String },

    #[error("Unsupported by this page session: {0}")]
    Unsupported(String),

    #[error("Selector error: {0}")]
    Selector(String),

    #[error("No page loaded")]
    NoPage,
}

impl FetchError {
    /// HTTP status code carried by the error, if the server answered at all
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A DOM element detached from its document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Text content with whitespace runs collapsed to single spaces
    pub text: String,
    pub attributes: HashMap<String, String>,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub(crate) fn from_ref(element: ElementRef<'_>) -> Self {
        let text = element
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ");

        let attributes = element
            .value()
            .attrs()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        Self { text, attributes }
    }
}

/// A loaded page as seen after any before-extraction actions
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: Url,
    pub status_code: u16,
    pub body: String,
    pub load_time: Duration,
}

impl RenderedPage {
    pub fn new(url: Url, status_code: u16, body: impl Into<String>, load_time: Duration) -> Self {
        Self {
            url,
            status_code,
            body: body.into(),
            load_time,
        }
    }

    /// Page size in bytes
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Parses the body into a DOM
    ///
    /// The returned document is not `Send`; keep it inside synchronous code.
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }

    /// Finds every element matching `selector`, in document order
    pub fn find_elements(
        &self,
        selector: &str,
        kind: SelectorKind,
    ) -> Result<Vec<Element>, FetchError> {
        let compiled = selector::compile(selector, kind)?;
        let document = self.document();
        Ok(document.select(&compiled).map(Element::from_ref).collect())
    }
}

/// One worker's exclusive browsing session
#[async_trait]
pub trait PageSession: Send {
    /// Loads `url` and makes it the current page
    async fn fetch(&mut self, url: &Url) -> Result<RenderedPage, FetchError>;

    /// Clicks the first element matching `selector` on the current page
    async fn click(&mut self, selector: &str) -> Result<(), FetchError>;

    /// Scrolls the current page by one screen
    async fn scroll(&mut self, direction: ScrollDirection) -> Result<(), FetchError>;

    /// The current page, reflecting any actions run since the last fetch
    fn current_page(&self) -> Option<&RenderedPage>;
}

/// Opens page sessions for crawl workers
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn PageSession>, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use scrapedex::config::UserAgentConfig;
/// use scrapedex::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "Scrapedex".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(config))
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Format: CrawlerName/Version (+ContactURL; ContactEmail)
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// `PageFetcher` over plain HTTP
///
/// All sessions share one connection pool; each session keeps its own
/// current page. Pages are not scripted, so click and scroll actions
/// report `Unsupported`.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn open_session(&self) -> Result<Box<dyn PageSession>, FetchError> {
        Ok(Box::new(HttpPageSession {
            client: self.client.clone(),
            current: None,
        }))
    }
}

struct HttpPageSession {
    client: Client,
    current: Option<RenderedPage>,
}

#[async_trait]
impl PageSession for HttpPageSession {
    async fn fetch(&mut self, url: &Url) -> Result<RenderedPage, FetchError> {
        self.current = None;
        let page = fetch_page(&self.client, url).await?;
        self.current = Some(page.clone());
        Ok(page)
    }

    async fn click(&mut self, selector: &str) -> Result<(), FetchError> {
        Err(FetchError::Unsupported(format!("click on '{}'", selector)))
    }

    async fn scroll(&mut self, direction: ScrollDirection) -> Result<(), FetchError> {
        Err(FetchError::Unsupported(format!("scroll {:?}", direction)))
    }

    fn current_page(&self) -> Option<&RenderedPage> {
        self.current.as_ref()
    }
}

/// Fetches one page with a GET request
///
/// Redirects are followed by the client; the page keeps the final URL.
/// Non-success statuses and non-HTML bodies are errors, so the caller
/// never extracts from an error page.
pub async fn fetch_page(client: &Client, url: &Url) -> Result<RenderedPage, FetchError> {
    let started = Instant::now();

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| classify_reqwest_error(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !content_type.is_empty() && !content_type.contains("html") {
        return Err(FetchError::ContentMismatch {
            url: url.to_string(),
            content_type,
        });
    }

    let final_url = response.url().clone();
    let body = response
        .text()
        .await
        .map_err(|e| classify_reqwest_error(url, e))?;

    Ok(RenderedPage::new(
        final_url,
        status.as_u16(),
        body,
        started.elapsed(),
    ))
}

fn classify_reqwest_error(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
