//! Integration tests for the crawler
//!
//! The HTTP tests run full crawls against a wiremock site; the rest use
//! an in-memory site graph to exercise many workers at once.

use async_trait::async_trait;
use scrapedex::config::load_config;
use scrapedex::crawler::{FetchError, PageFetcher, PageSession, RenderedPage, ScrollDirection};
use scrapedex::storage::{
    open_storage, CrawlRecordStore, DocumentStore, FieldValueSource, RunStatusStore, SqliteStorage,
};
use scrapedex::{CrawlEngine, RunStatus};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Writes a config crawling `seed` into `dir` and loads it
fn write_config(dir: &TempDir, seed: &str, max_depth: u32) -> scrapedex::Config {
    let db_path = dir.path().join("scrapedex.db");
    let toml = format!(
        r#"
[crawler]
seed-url = "{seed}"
threads = 2
max-depth = {max_depth}
max-pages = 10
idle-backoff-ms = 20

[user-agent]
crawler-name = "ScrapedexTest"
crawler-version = "0.1"
contact-url = "https://example.com/bot"
contact-email = "bot@example.com"

[output]
database-path = '{db}'

[[field]]
name = "title"
selector = "h1"
selector-kind = "css"
"#,
        db = db_path.display()
    );

    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, toml).expect("Failed to write config");
    load_config(&config_path).expect("Config should be valid")
}

fn html(title: &str, links: &[&str]) -> ResponseTemplate {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">{}</a>"#, href, href))
        .collect();
    let body = format!(
        "<html><head><title>{title}</title></head><body><h1>{title}</h1>{anchors}</body></html>"
    );
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

async fn mount_page(server: &MockServer, route: &str, title: &str, links: &[&str]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(title, links))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_seed_with_three_links_yields_four_documents() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "Home", &["/a", "/b", "/c"]).await;
    mount_page(&server, "/a", "Page A", &["/"]).await;
    mount_page(&server, "/b", "Page B", &["/a"]).await;
    mount_page(&server, "/c", "Page C", &[]).await;

    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(&dir, &format!("{}/", server.uri()), 1);
    let storage = Arc::new(
        open_storage(Path::new(&config.output.database_path)).expect("Failed to open storage"),
    );

    let run_id = storage.create_run("hash").unwrap();
    let engine = CrawlEngine::over_http(config, Arc::clone(&storage)).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(30), engine.run(run_id))
        .await
        .expect("Crawl should terminate")
        .expect("Crawl should succeed");

    assert_eq!(outcome.state.status, RunStatus::Completed);
    assert_eq!(outcome.state.collected_documents, 4);
    assert_eq!(outcome.statistics.visited_pages, 4);
    assert_eq!(storage.count_documents().unwrap(), 4);

    let values = storage.field_values_for(&["title".to_string()]).unwrap();
    let mut titles: Vec<&str> = values.iter().map(|v| v.value.as_str()).collect();
    titles.sort();
    assert_eq!(titles, vec!["Home", "Page A", "Page B", "Page C"]);

    for value in &values {
        let of_document = storage.field_values_of_document(value.document_id).unwrap();
        assert_eq!(of_document.len(), 1);
    }

    let stored = storage.load_statistics(run_id).unwrap().expect("Statistics saved");
    assert_eq!(stored.visited_pages, 4);
    assert_eq!(stored.http_codes.get(&200), Some(&4));
    assert_eq!(storage.get_status(run_id).unwrap(), RunStatus::Completed);
}

#[tokio::test]
async fn test_robots_disallowed_links_are_never_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .mount(&server)
        .await;
    mount_page(&server, "/", "Home", &["/public", "/private/page"]).await;
    mount_page(&server, "/public", "Public", &[]).await;
    Mock::given(method("GET"))
        .and(path("/private/page"))
        .respond_with(html("Private", &[]))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(&dir, &format!("{}/", server.uri()), 2);
    let storage = Arc::new(
        open_storage(Path::new(&config.output.database_path)).expect("Failed to open storage"),
    );

    let run_id = storage.create_run("hash").unwrap();
    let engine = CrawlEngine::over_http(config, Arc::clone(&storage)).unwrap();
    let outcome = engine.run(run_id).await.unwrap();

    assert_eq!(outcome.state.status, RunStatus::Completed);
    assert_eq!(outcome.state.collected_documents, 2);
    assert_eq!(
        outcome.statistics.skip_reasons.get("Robots disallowed"),
        Some(&1)
    );
}

#[tokio::test]
async fn test_http_errors_are_counted_not_fatal() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "Home", &["/missing", "/ok"]).await;
    mount_page(&server, "/ok", "Ok", &[]).await;

    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(&dir, &format!("{}/", server.uri()), 1);
    let storage = Arc::new(
        open_storage(Path::new(&config.output.database_path)).expect("Failed to open storage"),
    );

    let run_id = storage.create_run("hash").unwrap();
    let engine = CrawlEngine::over_http(config, Arc::clone(&storage)).unwrap();
    let outcome = engine.run(run_id).await.unwrap();

    assert_eq!(outcome.state.status, RunStatus::Completed);
    assert_eq!(outcome.statistics.failed_pages, 1);
    assert_eq!(outcome.statistics.http_codes.get(&404), Some(&1));
    assert_eq!(outcome.state.collected_documents, 2);
}

/// Synthetic site of pages `/p0`, `/p1`, ... whose links come from `edges`.
/// Pages at or above `size` do not exist.
struct GraphFetcher {
    size: usize,
    edges: fn(usize) -> Vec<usize>,
    delay: Duration,
    fetches: Arc<Mutex<HashMap<String, usize>>>,
}

impl GraphFetcher {
    fn new(size: usize, edges: fn(usize) -> Vec<usize>) -> Self {
        Self {
            size,
            edges,
            delay: Duration::from_millis(1),
            fetches: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Binary heap: page `i` links to its children, its parent and the root
fn heap_edges(i: usize) -> Vec<usize> {
    vec![2 * i + 1, 2 * i + 2, i.saturating_sub(1) / 2, 0]
}

const STAR_LEAVES: usize = 12;

/// The root links to every leaf; leaves only link back
fn star_edges(i: usize) -> Vec<usize> {
    if i == 0 {
        (1..=STAR_LEAVES).collect()
    } else {
        vec![0]
    }
}

struct GraphSession {
    size: usize,
    edges: fn(usize) -> Vec<usize>,
    delay: Duration,
    fetches: Arc<Mutex<HashMap<String, usize>>>,
    current: Option<RenderedPage>,
}

#[async_trait]
impl PageFetcher for GraphFetcher {
    async fn open_session(&self) -> Result<Box<dyn PageSession>, FetchError> {
        Ok(Box::new(GraphSession {
            size: self.size,
            edges: self.edges,
            delay: self.delay,
            fetches: Arc::clone(&self.fetches),
            current: None,
        }))
    }
}

#[async_trait]
impl PageSession for GraphSession {
    async fn fetch(&mut self, url: &Url) -> Result<RenderedPage, FetchError> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;
        tokio::time::sleep(self.delay).await;

        let page: Option<usize> = url
            .path()
            .strip_prefix("/p")
            .and_then(|n| n.parse().ok())
            .filter(|n| *n < self.size);
        let Some(i) = page else {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: 404,
            });
        };

        let anchors: String = (self.edges)(i)
            .iter()
            .map(|n| format!(r#"<a href="/p{n}">{n}</a>"#))
            .collect();
        let body = format!("<html><body><h1>Page {i}</h1>{anchors}</body></html>");
        let page = RenderedPage::new(url.clone(), 200, body, self.delay);
        self.current = Some(page.clone());
        Ok(page)
    }

    async fn click(&mut self, _selector: &str) -> Result<(), FetchError> {
        Ok(())
    }

    async fn scroll(&mut self, _direction: ScrollDirection) -> Result<(), FetchError> {
        Ok(())
    }

    fn current_page(&self) -> Option<&RenderedPage> {
        self.current.as_ref()
    }
}

fn graph_config(dir: &TempDir, threads: u32) -> scrapedex::Config {
    let mut config = write_config(dir, "https://graph.test/p0", 10);
    config.crawler.threads = threads;
    config.crawler.max_pages = 200;
    config.crawler.idle_backoff_ms = 5;
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_workers_terminate_and_fetch_each_url_once() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = graph_config(&dir, 6);
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let fetcher = GraphFetcher::new(30, heap_edges);
    let fetches = Arc::clone(&fetcher.fetches);
    let fetcher = Arc::new(fetcher);

    let run_id = storage.create_run("graph").unwrap();
    let engine = CrawlEngine::new(config, fetcher, Arc::clone(&storage)).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(30), engine.run(run_id))
        .await
        .expect("Workers should terminate")
        .expect("Crawl should succeed");

    assert_eq!(outcome.state.status, RunStatus::Completed);

    let fetches = fetches.lock().unwrap();
    for (url, count) in fetches.iter() {
        assert_eq!(*count, 1, "{} fetched {} times", url, count);
    }
    for i in 0..30 {
        assert!(
            fetches.contains_key(&format!("https://graph.test/p{}", i)),
            "page {} never fetched",
            i
        );
    }

    assert_eq!(outcome.statistics.visited_pages, 30);
    assert_eq!(storage.count_documents().unwrap(), 30);
}

#[tokio::test]
async fn test_single_worker_crawls_whole_graph() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = graph_config(&dir, 1);
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let fetcher = Arc::new(GraphFetcher::new(12, heap_edges));

    let run_id = storage.create_run("graph").unwrap();
    let engine = CrawlEngine::new(config, fetcher, Arc::clone(&storage)).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(30), engine.run(run_id))
        .await
        .expect("Worker should terminate")
        .expect("Crawl should succeed");

    assert_eq!(outcome.state.collected_documents, 12);
    assert_eq!(outcome.statistics.visited_pages, 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_idle_worker_takes_over_part_of_a_wide_level() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = graph_config(&dir, 2);
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    // Slow pages keep the seed owner busy while its level-1 queue is long
    let mut fetcher = GraphFetcher::new(STAR_LEAVES + 1, star_edges);
    fetcher.delay = Duration::from_millis(20);
    let fetches = Arc::clone(&fetcher.fetches);

    let run_id = storage.create_run("star").unwrap();
    let engine = CrawlEngine::new(config, Arc::new(fetcher), Arc::clone(&storage)).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(30), engine.run(run_id))
        .await
        .expect("Workers should terminate")
        .expect("Crawl should succeed");

    assert!(outcome.donations >= 1, "no links were ever redistributed");

    let fetches = fetches.lock().unwrap();
    assert_eq!(fetches.len(), STAR_LEAVES + 1);
    for (url, count) in fetches.iter() {
        assert_eq!(*count, 1, "{} fetched {} times", url, count);
    }
    assert_eq!(outcome.statistics.visited_pages, STAR_LEAVES as u64 + 1);
    assert_eq!(storage.count_documents().unwrap(), STAR_LEAVES as u64 + 1);
}
