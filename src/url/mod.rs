//! URL handling module for Scrapedex
//!
//! This module provides link resolution (with fragment stripping), host
//! extraction for the cross-host filter, link paths and the exclusion
//! list check.

mod domain;
mod resolve;

pub use domain::{extract_host, link_path, same_host};
pub use resolve::{parse_crawl_url, resolve_link};

/// Returns true if `url` is on the exclusion list
///
/// Exclusions are exact URLs, compared after trailing whitespace is
/// trimmed from the configured entry. `https://example.com/admin` does not
/// exclude `https://example.com/admin/users`.
///
/// # Arguments
///
/// * `url` - Absolute URL to check
/// * `excluded` - Configured exclusion list
pub fn is_excluded(url: &str, excluded: &[String]) -> bool {
    excluded.iter().any(|entry| {
        let entry = entry.trim();
        !entry.is_empty() && entry == url
    })
}
