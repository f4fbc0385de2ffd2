//! Crawl statistics
//!
//! Workers report every page they process; the recorder keeps running
//! averages and histograms so no per-page samples have to be stored.

use crate::state::SkipReason;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Per-run crawl statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlStatistics {
    /// Pages whose fetch succeeded
    pub visited_pages: u64,

    /// Mean number of new documents per visited page
    pub average_docs_per_page: f64,

    /// Mean wall time from fetch start to the end of extraction (ms)
    pub average_processing_time_ms: f64,

    /// Mean page load time (ms)
    pub average_load_time_ms: f64,

    /// Mean page size (bytes)
    pub average_page_size: f64,

    /// HTTP status code → number of responses
    pub http_codes: BTreeMap<u16, u64>,

    /// Skip reason label → number of skipped links
    pub skip_reasons: BTreeMap<String, u64>,

    /// Failed fetches (network errors, HTTP errors, non-HTML)
    pub failed_pages: u64,

    /// Total run duration (seconds), set when the run finishes
    pub duration_secs: f64,
}

/// Measurements of one processed page
#[derive(Debug, Clone, Copy)]
pub struct PageSample {
    pub status_code: u16,
    pub load_time: Duration,
    pub processing_time: Duration,
    pub page_size: usize,
    pub documents: u64,
}

fn running_mean(mean: f64, sample: f64, n: u64) -> f64 {
    mean + (sample - mean) / n as f64
}

impl CrawlStatistics {
    /// Folds one page into the running averages
    pub fn record_page(&mut self, sample: PageSample) {
        self.visited_pages += 1;
        let n = self.visited_pages;

        self.average_docs_per_page =
            running_mean(self.average_docs_per_page, sample.documents as f64, n);
        self.average_processing_time_ms = running_mean(
            self.average_processing_time_ms,
            sample.processing_time.as_secs_f64() * 1000.0,
            n,
        );
        self.average_load_time_ms = running_mean(
            self.average_load_time_ms,
            sample.load_time.as_secs_f64() * 1000.0,
            n,
        );
        self.average_page_size = running_mean(self.average_page_size, sample.page_size as f64, n);

        *self.http_codes.entry(sample.status_code).or_insert(0) += 1;
    }

    pub fn record_skip(&mut self, reason: SkipReason) {
        *self
            .skip_reasons
            .entry(reason.label().to_string())
            .or_insert(0) += 1;
    }

    /// Records a failed fetch, with its status code when the server answered
    pub fn record_failure(&mut self, status_code: Option<u16>) {
        self.failed_pages += 1;
        if let Some(code) = status_code {
            *self.http_codes.entry(code).or_insert(0) += 1;
        }
    }
}

/// Thread-safe wrapper shared by all workers
#[derive(Debug, Default)]
pub struct StatsRecorder {
    inner: Mutex<CrawlStatistics>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut CrawlStatistics) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn record_page(&self, sample: PageSample) {
        self.with(|s| s.record_page(sample));
    }

    pub fn record_skip(&self, reason: SkipReason) {
        self.with(|s| s.record_skip(reason));
    }

    pub fn record_failure(&self, status_code: Option<u16>) {
        self.with(|s| s.record_failure(status_code));
    }

    pub fn set_duration(&self, duration: Duration) {
        self.with(|s| s.duration_secs = duration.as_secs_f64());
    }

    pub fn snapshot(&self) -> CrawlStatistics {
        self.with(|s| s.clone())
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Visited pages: {}", stats.visited_pages);
    println!("  Failed pages: {}", stats.failed_pages);
    println!("  Duration: {:.1}s", stats.duration_secs);
    println!("  Average documents per page: {:.2}", stats.average_docs_per_page);
    println!(
        "  Average processing time: {:.1}ms",
        stats.average_processing_time_ms
    );
    println!("  Average load time: {:.1}ms", stats.average_load_time_ms);
    println!("  Average page size: {:.0} bytes", stats.average_page_size);
    println!();

    if !stats.http_codes.is_empty() {
        println!("HTTP Status Codes:");
        for (code, count) in &stats.http_codes {
            println!("  {}: {}", code, count);
        }
        println!();
    }

    if !stats.skip_reasons.is_empty() {
        println!("Skipped Links:");
        let mut reasons: Vec<_> = stats.skip_reasons.iter().collect();
        reasons.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (reason, count) in reasons {
            println!("  {}: {}", reason, count);
        }
        println!();
    }
}
