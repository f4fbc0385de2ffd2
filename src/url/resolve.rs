use crate::UrlError;
use url::Url;

/// Resolves an anchor `href` against the page it was found on
///
/// The fragment is always stripped, since `#section` variants of a page
/// carry no additional records. Links that cannot lead to another HTTP
/// page are dropped:
/// - empty and fragment-only hrefs
/// - `javascript:`, `mailto:`, `tel:` and `data:` links
/// - anything that is not HTTP(S) after resolution
///
/// # Arguments
///
/// * `href` - Raw attribute value
/// * `base_url` - URL of the page the anchor lives on
///
/// # Returns
///
/// The absolute, fragment-free URL, or `None` if the link should be ignored
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let mut resolved = base_url.join(href).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }

    resolved.set_fragment(None);
    Some(resolved)
}

/// Parses a crawl URL, rejecting non-HTTP(S) schemes and host-less URLs
///
/// The fragment is stripped so the result can be used directly as a
/// link-table key.
pub fn parse_crawl_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);
    Ok(url)
}
