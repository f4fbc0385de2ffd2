//! Crawl engine - run lifecycle and the per-link state machine
//!
//! A run spawns one task per configured thread. Every task owns a page
//! session and loops over its own level queues; when they run dry it
//! backs off, asks the scheduler for donated work, and leaves only once
//! no worker is running any more (or the run was told to exit).

use crate::config::Config;
use crate::crawler::actions::{ActionExecutor, SequentialActionExecutor};
use crate::crawler::extract::{content_hash, extract_page, ExtractedValue, ExtractionPlan, FieldOutcome};
use crate::crawler::fetcher::{HttpPageFetcher, PageFetcher, PageSession};
use crate::crawler::scheduler::{Admission, WorkStealingScheduler};
use crate::crawler::stats::{CrawlStatistics, PageSample, StatsRecorder};
use crate::robots::{default_robots_url, robots_target, AllowAll, HttpRobotsPolicy, RobotsPolicy};
use crate::state::{Link, LinkState, RunState, RunStatus, SkipReason};
use crate::storage::{CrawlRecordStore, DocumentStore, NewFieldValue, RunStatusStore, StorageResult};
use crate::url::{is_excluded, link_path, parse_crawl_url, same_host};
use rand::Rng;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use url::Url;

/// Result of a finished run
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub run_id: i64,
    pub state: RunState,
    pub statistics: CrawlStatistics,
    /// Links that ended up in the link table
    pub discovered_links: usize,
    /// Times an idle worker received links from a busy one
    pub donations: usize,
}

/// Drives crawl runs for one configuration
pub struct CrawlEngine {
    config: Arc<Config>,
    plan: Arc<ExtractionPlan>,
    fetcher: Arc<dyn PageFetcher>,
    actions: Arc<dyn ActionExecutor>,
    robots: Arc<dyn RobotsPolicy>,
    documents: Arc<dyn DocumentStore>,
    runs: Arc<dyn RunStatusStore>,
    records: Arc<dyn CrawlRecordStore>,
}

impl CrawlEngine {
    /// Creates an engine with the given fetcher and storage backend
    ///
    /// Actions come from the configuration; robots.txt is ignored until a
    /// policy is set with [`CrawlEngine::with_robots`].
    ///
    /// # Arguments
    ///
    /// * `config` - A validated configuration
    /// * `fetcher` - Opens one page session per worker
    /// * `storage` - Document, run status and crawl record store
    pub fn new<S>(
        config: Config,
        fetcher: Arc<dyn PageFetcher>,
        storage: Arc<S>,
    ) -> crate::Result<Self>
    where
        S: DocumentStore + RunStatusStore + CrawlRecordStore + 'static,
    {
        let plan = ExtractionPlan::from_config(&config)?;
        let actions = SequentialActionExecutor::new(config.actions.clone());

        Ok(Self {
            plan: Arc::new(plan),
            fetcher,
            actions: Arc::new(actions),
            robots: Arc::new(AllowAll),
            documents: storage.clone(),
            runs: storage.clone(),
            records: storage,
            config: Arc::new(config),
        })
    }

    /// Creates an engine that fetches over HTTP and honours robots.txt
    pub fn over_http<S>(config: Config, storage: Arc<S>) -> crate::Result<Self>
    where
        S: DocumentStore + RunStatusStore + CrawlRecordStore + 'static,
    {
        let fetcher = HttpPageFetcher::from_config(&config.user_agent)?;
        let robots = HttpRobotsPolicy::new(
            crate::crawler::build_http_client(&config.user_agent)?,
            config.user_agent.crawler_name.clone(),
        );
        Ok(Self::new(config, Arc::new(fetcher), storage)?.with_robots(Arc::new(robots)))
    }

    pub fn with_robots(mut self, robots: Arc<dyn RobotsPolicy>) -> Self {
        self.robots = robots;
        self
    }

    pub fn with_actions(mut self, actions: Arc<dyn ActionExecutor>) -> Self {
        self.actions = actions;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs a crawl to completion (or until its status becomes `Exit`)
    ///
    /// The run must already exist in the run status store. Per-link
    /// failures never abort the run; only storage failures around the
    /// run lifecycle itself are returned.
    pub async fn run(&self, run_id: i64) -> crate::Result<CrawlOutcome> {
        let started = Instant::now();
        let crawler = &self.config.crawler;

        let seed = parse_crawl_url(&crawler.seed_url)?;
        let stored = self.runs.get_run(run_id)?.state;
        let collected = stored.collected_documents;
        match stored.status {
            RunStatus::New | RunStatus::Paused => {
                self.runs.set_status(run_id, RunStatus::Running)?
            }
            // An Exit set before the start must survive; workers stop on it
            status => tracing::info!(run_id, %status, "Keeping stored run status"),
        }

        tracing::info!(
            run_id,
            seed = %seed,
            threads = crawler.threads,
            max_depth = crawler.max_depth,
            "Starting crawl run"
        );

        let robots_url = match &crawler.robots_url {
            Some(raw) => Some(Url::parse(raw)?),
            None => default_robots_url(&seed),
        };
        let robots = match robots_url {
            Some(url) => self.robots.disallowed_patterns(&url).await,
            None => Vec::new(),
        };
        tracing::debug!("{} robots disallow patterns", robots.len());

        let scheduler = Arc::new(WorkStealingScheduler::new(
            crawler.traversal,
            crawler.max_pages,
        ));
        // Everyone must be registered before anyone can see "all idle"
        for worker_id in 0..crawler.threads as usize {
            scheduler.register_worker(worker_id, seed.as_str());
        }

        let ctx = Arc::new(RunContext {
            run_id,
            config: self.config.clone(),
            plan: self.plan.clone(),
            actions: self.actions.clone(),
            documents: self.documents.clone(),
            runs: self.runs.clone(),
            scheduler: scheduler.clone(),
            stats: StatsRecorder::new(),
            robots,
            variable_names: variable_names(&self.config),
            collected: AtomicU64::new(collected),
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..crawler.threads as usize {
            let ctx = ctx.clone();
            let fetcher = self.fetcher.clone();
            workers.spawn(async move { ctx.worker_loop(worker_id, fetcher).await });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                // Its guard already retired it, so the others can still finish
                tracing::error!("Crawl worker panicked: {}", e);
            }
        }

        let final_status = match self.runs.get_status(run_id)? {
            RunStatus::Exit => RunStatus::Exit,
            _ => RunStatus::Completed,
        };

        ctx.stats.set_duration(started.elapsed());
        let statistics = ctx.stats.snapshot();
        let links = scheduler.links_snapshot();

        self.records.save_links(run_id, &links)?;
        self.records.save_statistics(run_id, &statistics)?;
        let state = self.runs.finish_run(run_id, final_status)?;

        tracing::info!(
            run_id,
            status = %state.status,
            documents = state.collected_documents,
            visited = statistics.visited_pages,
            donations = scheduler.donations(),
            "Crawl finished in {:.1}s",
            statistics.duration_secs
        );

        Ok(CrawlOutcome {
            run_id,
            state,
            statistics,
            discovered_links: links.len(),
            donations: scheduler.donations(),
        })
    }
}

fn variable_names(config: &Config) -> HashMap<String, String> {
    config
        .fields
        .iter()
        .filter_map(|f| {
            let var = f.variable_name.as_deref()?.trim();
            (!var.is_empty()).then(|| (f.name.clone(), var.to_string()))
        })
        .collect()
}

/// Retires a worker however its loop ends, including by panic
///
/// Without this a worker that dies mid-link stays `running` forever and
/// the remaining workers never observe global completion.
struct RetireOnDrop {
    scheduler: Arc<WorkStealingScheduler>,
    worker_id: usize,
}

impl Drop for RetireOnDrop {
    fn drop(&mut self) {
        self.scheduler.retire(self.worker_id);
    }
}

/// State shared by the workers of one run
struct RunContext {
    run_id: i64,
    config: Arc<Config>,
    plan: Arc<ExtractionPlan>,
    actions: Arc<dyn ActionExecutor>,
    documents: Arc<dyn DocumentStore>,
    runs: Arc<dyn RunStatusStore>,
    scheduler: Arc<WorkStealingScheduler>,
    stats: StatsRecorder,
    robots: Vec<Regex>,
    /// field name → boosting variable name
    variable_names: HashMap<String, String>,
    collected: AtomicU64,
}

impl RunContext {
    async fn worker_loop(self: Arc<Self>, worker_id: usize, fetcher: Arc<dyn PageFetcher>) {
        let _retire = RetireOnDrop {
            scheduler: self.scheduler.clone(),
            worker_id,
        };

        let mut session = match fetcher.open_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(worker_id, "Could not open a page session: {}", e);
                return;
            }
        };

        loop {
            if let Some(link) = self.scheduler.next_link(worker_id) {
                let state = self.process_link(worker_id, session.as_mut(), &link).await;
                tracing::debug!(worker_id, url = %link.url, depth = link.depth, %state, "Link done");

                if state == LinkState::Skipped(SkipReason::RunStopped) {
                    break;
                }
                continue;
            }

            if self.is_stopped() || self.scheduler.all_completed() {
                break;
            }

            tokio::time::sleep(self.idle_backoff()).await;
            if self.scheduler.steal_work(worker_id) {
                tracing::trace!(worker_id, "Resuming with donated links");
            }
        }

        tracing::debug!(worker_id, "Worker finished");
    }

    fn idle_backoff(&self) -> Duration {
        let ms = self.config.crawler.idle_backoff_ms;
        if self.config.crawler.idle_jitter && ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=ms))
        } else {
            Duration::from_millis(ms)
        }
    }

    fn is_stopped(&self) -> bool {
        match self.runs.get_status(self.run_id) {
            Ok(status) => status == RunStatus::Exit,
            Err(e) => {
                tracing::warn!("Could not read run status: {}", e);
                false
            }
        }
    }

    fn skip(&self, reason: SkipReason) -> LinkState {
        self.stats.record_skip(reason);
        LinkState::Skipped(reason)
    }

    fn advance(&self, link: &Link, state: LinkState) {
        tracing::trace!(url = %link.url, %state, "Link state");
    }

    async fn process_link(
        &self,
        worker_id: usize,
        session: &mut dyn PageSession,
        link: &Link,
    ) -> LinkState {
        if self.is_stopped() {
            return self.skip(SkipReason::RunStopped);
        }

        if self.collected.load(Ordering::SeqCst) >= self.config.crawler.max_collected_docs {
            return self.skip(SkipReason::QuotaLimit);
        }

        if !self.scheduler.claim_visit(&link.url) {
            return self.skip(SkipReason::AlreadyVisited);
        }
        self.advance(link, LinkState::Pending);

        let url = match Url::parse(&link.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Unparsable link {}: {}", link.url, e);
                self.stats.record_failure(None);
                return LinkState::Failed;
            }
        };

        let started = Instant::now();
        if let Err(e) = session.fetch(&url).await {
            tracing::warn!("Failed to fetch {}: {}", url, e);
            self.stats.record_failure(e.status_code());
            return LinkState::Failed;
        }
        self.advance(link, LinkState::Fetched);

        self.actions.run_before(session).await;

        let Some(page) = session.current_page() else {
            tracing::warn!("No page after actions on {}", url);
            self.stats.record_failure(None);
            return LinkState::Failed;
        };

        let discover = link.depth < self.config.crawler.max_depth;
        let extraction = extract_page(page, &self.plan, discover);
        if !discover {
            self.stats.record_skip(SkipReason::DepthLimit);
        }

        self.admit_links(worker_id, link, &extraction.links);
        self.advance(link, LinkState::LinksExtracted);

        let (state, documents) = match extraction.fields {
            FieldOutcome::NoMatch { field } => {
                tracing::debug!("Field '{}' matched nothing on {}", field, page.url);
                (LinkState::FieldsExtracted, 0)
            }
            FieldOutcome::Mismatch { lengths } => {
                tracing::warn!("Field counts differ on {}: {:?}", page.url, lengths);
                (LinkState::FieldsExtracted, 0)
            }
            FieldOutcome::Aligned(rows) => {
                self.advance(link, LinkState::FieldsExtracted);
                let created = self.persist_rows(&page.url, rows);
                (LinkState::DocumentsPersisted, created)
            }
        };

        self.stats.record_page(PageSample {
            status_code: page.status_code,
            load_time: page.load_time,
            processing_time: started.elapsed(),
            page_size: page.size(),
            documents,
        });

        state
    }

    /// Runs discovered links through the filters and queues the survivors
    fn admit_links(&self, worker_id: usize, link: &Link, candidates: &[Url]) {
        let current = match Url::parse(&link.url) {
            Ok(url) => url,
            Err(_) => return,
        };
        let excluded = &self.config.crawler.excluded_urls;
        let mut admitted = 0usize;

        for candidate in candidates {
            if self
                .robots
                .iter()
                .any(|pattern| pattern.is_match(robots_target(candidate)))
            {
                self.stats.record_skip(SkipReason::RobotsDisallowed);
                continue;
            }
            if is_excluded(candidate.as_str(), excluded) {
                self.stats.record_skip(SkipReason::Excluded);
                continue;
            }
            if !same_host(candidate, &current) {
                self.stats.record_skip(SkipReason::CrossSite);
                continue;
            }
            if candidate.as_str() == link.url {
                continue;
            }

            match self
                .scheduler
                .admit_link(worker_id, candidate.as_str(), link.depth + 1)
            {
                Admission::Admitted => admitted += 1,
                Admission::Known => {}
                Admission::CapReached => self.stats.record_skip(SkipReason::LinkCap),
            }
        }

        if admitted > 0 {
            tracing::debug!(worker_id, "Queued {} links from {}", admitted, link.url);
        }
    }

    /// Persists every new row; returns how many documents were created
    fn persist_rows(&self, page_url: &Url, rows: Vec<Vec<ExtractedValue>>) -> u64 {
        let path = link_path(page_url).unwrap_or_else(|| page_url.to_string());
        let mut created = 0u64;

        for row in rows {
            match self.persist_document(page_url, &path, &row) {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!("Failed to store a record from {}: {}", page_url, e),
            }
        }

        if created > 0 {
            match self.runs.add_collected(self.run_id, created) {
                Ok(total) => {
                    self.collected.fetch_max(total, Ordering::SeqCst);
                }
                Err(e) => {
                    tracing::warn!("Failed to update collected count: {}", e);
                    self.collected.fetch_add(created, Ordering::SeqCst);
                }
            }
        }

        created
    }

    /// Stores one row as a document unless its content hash is known
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - A new document was created
    /// * `Ok(false)` - The content was already stored
    ///
    /// The document and its values are written together; on error
    /// neither is stored, so the row is retried the next time it is seen.
    fn persist_document(
        &self,
        page_url: &Url,
        path: &str,
        row: &[ExtractedValue],
    ) -> StorageResult<bool> {
        let hash = content_hash(row);
        if self.documents.find_document_by_hash(&hash)?.is_some() {
            return Ok(false);
        }

        let values: Vec<NewFieldValue<'_>> = row
            .iter()
            .map(|value| NewFieldValue {
                document_id: 0,
                run_id: self.run_id,
                field_name: &value.field,
                variable_name: self.variable_names.get(&value.field).map(String::as_str),
                url: page_url.as_str(),
                link_path: path,
                attribute: &value.attribute,
                value: &value.value,
            })
            .collect();

        match self
            .documents
            .create_document_with_values(&hash, self.run_id, &values)
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_constraint_violation() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlerConfig, FieldConfig, OutputConfig, SelectorKind, UserAgentConfig};
    use crate::crawler::fetcher::{FetchError, RenderedPage};
    use crate::crawler::level_queue::TraversalOrder;
    use crate::crawler::ScrollDirection;
    use crate::storage::SqliteStorage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves pages from a map; unknown URLs are 404s
    struct MapFetcher {
        pages: HashMap<String, String>,
        fetches: Arc<Mutex<Vec<String>>>,
    }

    struct MapSession {
        pages: HashMap<String, String>,
        fetches: Arc<Mutex<Vec<String>>>,
        current: Option<RenderedPage>,
    }

    #[async_trait]
    impl PageFetcher for MapFetcher {
        async fn open_session(&self) -> Result<Box<dyn PageSession>, FetchError> {
            Ok(Box::new(MapSession {
                pages: self.pages.clone(),
                fetches: self.fetches.clone(),
                current: None,
            }))
        }
    }

    #[async_trait]
    impl PageSession for MapSession {
        async fn fetch(&mut self, url: &Url) -> Result<RenderedPage, FetchError> {
            self.fetches.lock().unwrap().push(url.to_string());
            match self.pages.get(url.as_str()) {
                Some(body) => {
                    let page = RenderedPage::new(url.clone(), 200, body.clone(), Duration::ZERO);
                    self.current = Some(page.clone());
                    Ok(page)
                }
                None => Err(FetchError::Http {
                    url: url.to_string(),
                    status: 404,
                }),
            }
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

    fn config(max_depth: u32, max_docs: u64) -> Config {
        Config {
            crawler: CrawlerConfig {
                seed_url: "https://site.test/".to_string(),
                threads: 2,
                max_depth,
                max_pages: 100,
                max_collected_docs: max_docs,
                traversal: TraversalOrder::BottomUp,
                allow_multi_elements: true,
                idle_backoff_ms: 5,
                idle_jitter: false,
                scope_selectors: vec!["//body".to_string()],
                scope_selector_kind: SelectorKind::Xpath,
                excluded_urls: vec!["https://site.test/private".to_string()],
                robots_url: None,
            },
            user_agent: UserAgentConfig {
                crawler_name: "TestBot".to_string(),
                crawler_version: "0.1".to_string(),
                contact_url: "https://site.test/bot".to_string(),
                contact_email: "bot@site.test".to_string(),
            },
            output: OutputConfig {
                database_path: ":memory:".to_string(),
            },
            fields: vec![FieldConfig {
                name: "item".to_string(),
                selector: "li".to_string(),
                selector_kind: SelectorKind::Css,
                attribute: None,
                clean_up: None,
                variable_name: None,
            }],
            actions: Vec::new(),
            indexer: None,
        }
    }

    fn site() -> HashMap<String, String> {
        let mut pages = HashMap::new();
        pages.insert(
            "https://site.test/".to_string(),
            r#"<html><body><ul><li>one</li><li>two</li></ul>
               <a href="/a">a</a><a href="/private">p</a><a href="https://other.test/x">x</a>
               <a href="/">self</a></body></html>"#
                .to_string(),
        );
        pages.insert(
            "https://site.test/a".to_string(),
            r#"<html><body><ul><li>two</li><li>three</li></ul><a href="/b">b</a></body></html>"#
                .to_string(),
        );
        pages.insert(
            "https://site.test/b".to_string(),
            r#"<html><body><ul><li>four</li></ul></body></html>"#.to_string(),
        );
        pages
    }

    async fn run_engine(config: Config) -> (CrawlOutcome, Vec<String>, Arc<SqliteStorage>) {
        let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
        let fetches = Arc::new(Mutex::new(Vec::new()));
        let fetcher = Arc::new(MapFetcher {
            pages: site(),
            fetches: fetches.clone(),
        });

        let engine = CrawlEngine::new(config, fetcher, storage.clone()).unwrap();
        let run_id = storage.create_run("test").unwrap();
        let outcome = engine.run(run_id).await.unwrap();
        let fetched = fetches.lock().unwrap().clone();
        (outcome, fetched, storage)
    }

    #[tokio::test]
    async fn test_crawl_deduplicates_and_filters() {
        let (outcome, mut fetched, storage) = run_engine(config(2, u64::MAX)).await;

        fetched.sort();
        assert_eq!(
            fetched,
            vec![
                "https://site.test/",
                "https://site.test/a",
                "https://site.test/b"
            ]
        );

        // one, two, three, four: rows are deduplicated by content
        assert_eq!(outcome.state.status, RunStatus::Completed);
        assert_eq!(outcome.state.collected_documents, 4);
        assert_eq!(storage.count_documents().unwrap(), 4);

        let skips = &outcome.statistics.skip_reasons;
        assert_eq!(skips.get("Excluded"), Some(&1));
        assert_eq!(skips.get("Cross site"), Some(&1));
        assert_eq!(outcome.statistics.visited_pages, 3);
    }

    #[tokio::test]
    async fn test_depth_limit_stops_discovery() {
        let (outcome, fetched, _) = run_engine(config(0, u64::MAX)).await;
        assert_eq!(fetched, vec!["https://site.test/"]);
        assert_eq!(outcome.statistics.skip_reasons.get("Depth limit"), Some(&1));
    }

    #[tokio::test]
    async fn test_quota_skips_remaining_links() {
        let (outcome, fetched, _) = run_engine(config(2, 1)).await;
        assert_eq!(fetched, vec!["https://site.test/"]);
        assert_eq!(outcome.state.collected_documents, 2);
        assert!(outcome.statistics.skip_reasons.get("Quota limit").is_some());
    }

    #[tokio::test]
    async fn test_exit_status_stops_workers() {
        let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
        let fetcher = Arc::new(MapFetcher {
            pages: site(),
            fetches: Arc::new(Mutex::new(Vec::new())),
        });
        let engine = CrawlEngine::new(config(2, u64::MAX), fetcher, storage.clone()).unwrap();

        let run_id = storage.create_run("test").unwrap();
        // Running → Exit happens before the first link is processed
        let runs: Arc<dyn RunStatusStore> = storage.clone();
        let stopper = tokio::spawn(async move {
            while runs.get_status(run_id).unwrap() != RunStatus::Running {
                tokio::task::yield_now().await;
            }
            runs.set_status(run_id, RunStatus::Exit).unwrap();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(10), engine.run(run_id))
            .await
            .unwrap()
            .unwrap();
        stopper.await.unwrap();

        assert_eq!(outcome.state.status, RunStatus::Exit);
    }

    /// Panics right after one particular page is fetched
    struct PanicOn(&'static str);

    #[async_trait]
    impl ActionExecutor for PanicOn {
        async fn run_before(&self, session: &mut dyn PageSession) {
            let url = session.current_page().map(|page| page.url.to_string());
            if url.as_deref() == Some(self.0) {
                panic!("action blew up on {}", self.0);
            }
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_does_not_hang_the_run() {
        let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
        let fetches = Arc::new(Mutex::new(Vec::new()));
        let fetcher = Arc::new(MapFetcher {
            pages: site(),
            fetches: fetches.clone(),
        });
        let engine = CrawlEngine::new(config(2, u64::MAX), fetcher, storage.clone())
            .unwrap()
            .with_actions(Arc::new(PanicOn("https://site.test/a")));

        let run_id = storage.create_run("test").unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(10), engine.run(run_id))
            .await
            .expect("Run should finish after a worker panicked")
            .unwrap();

        assert_eq!(outcome.state.status, RunStatus::Completed);
        assert_eq!(outcome.state.collected_documents, 2);

        // /b is only linked from /a, whose worker died before extraction
        let fetched = fetches.lock().unwrap().clone();
        assert!(fetched.contains(&"https://site.test/a".to_string()));
        assert!(!fetched.contains(&"https://site.test/b".to_string()));
    }

    #[tokio::test]
    async fn test_exit_before_start_is_kept() {
        let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
        let fetches = Arc::new(Mutex::new(Vec::new()));
        let fetcher = Arc::new(MapFetcher {
            pages: site(),
            fetches: fetches.clone(),
        });
        let engine = CrawlEngine::new(config(2, u64::MAX), fetcher, storage.clone()).unwrap();

        let run_id = storage.create_run("test").unwrap();
        storage.set_status(run_id, RunStatus::Exit).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(10), engine.run(run_id))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.state.status, RunStatus::Exit);
        assert_eq!(storage.get_status(run_id).unwrap(), RunStatus::Exit);
        assert!(fetches.lock().unwrap().is_empty());
        assert_eq!(storage.count_documents().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_page_without_rows_ends_at_fields_extracted() {
        let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
        let run_id = storage.create_run("test").unwrap();
        let config = Arc::new(config(2, u64::MAX));
        let scheduler = Arc::new(WorkStealingScheduler::new(TraversalOrder::BottomUp, 100));
        scheduler.register_worker(0, "https://site.test/");

        let ctx = RunContext {
            run_id,
            plan: Arc::new(ExtractionPlan::from_config(&config).unwrap()),
            actions: Arc::new(SequentialActionExecutor::new(Vec::new())),
            documents: storage.clone(),
            runs: storage.clone(),
            scheduler,
            stats: StatsRecorder::new(),
            robots: Vec::new(),
            variable_names: HashMap::new(),
            collected: AtomicU64::new(0),
            config,
        };

        let mut pages = site();
        pages.insert(
            "https://site.test/empty".to_string(),
            "<html><body><p>no list here</p></body></html>".to_string(),
        );
        let mut session = MapSession {
            pages,
            fetches: Arc::new(Mutex::new(Vec::new())),
            current: None,
        };

        let empty = Link::new("https://site.test/empty", 1);
        assert_eq!(
            ctx.process_link(0, &mut session, &empty).await,
            LinkState::FieldsExtracted
        );

        let listed = Link::new("https://site.test/b", 1);
        assert_eq!(
            ctx.process_link(0, &mut session, &listed).await,
            LinkState::DocumentsPersisted
        );
        assert_eq!(
            ctx.process_link(0, &mut session, &listed).await,
            LinkState::Skipped(SkipReason::AlreadyVisited)
        );
        assert_eq!(storage.count_documents().unwrap(), 1);
    }
}
