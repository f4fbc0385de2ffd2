use url::Url;

/// Extracts the lowercase host of a URL
///
/// Used by the cross-host link filter, which compares hostnames only
/// (scheme and port are ignored).
///
/// # Examples
///
/// ```
/// use url::Url;
/// use scrapedex::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns true when both URLs point at the same host
pub fn same_host(a: &Url, b: &Url) -> bool {
    match (extract_host(a), extract_host(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Builds the link path of a URL: the host followed by its non-empty path segments
///
/// The link path groups field values by site section, e.g.
/// `https://shop.example.com/books/fiction/` becomes `shop.example.com/books/fiction`.
///
/// # Returns
///
/// * `Some(String)` - The slash-joined path
/// * `None` - If the URL has no host
pub fn link_path(url: &Url) -> Option<String> {
    let host = extract_host(url)?;
    let mut parts = vec![host];
    parts.extend(
        url.path()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string),
    );
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_with_port() {
        let url = Url::parse("https://example.com:8080/").unwrap();
        assert_eq!(extract_host(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_mixed_case() {
        let url = Url::parse("https://Blog.Example.COM/post").unwrap();
        assert_eq!(extract_host(&url), Some("blog.example.com".to_string()));
    }

    #[test]
    fn test_same_host_ignores_scheme_and_port() {
        let a = Url::parse("http://example.com:8080/a").unwrap();
        let b = Url::parse("https://example.com/b").unwrap();
        assert!(same_host(&a, &b));

        let c = Url::parse("https://other.com/").unwrap();
        assert!(!same_host(&a, &c));
    }

    #[test]
    fn test_link_path_skips_empty_segments() {
        let url = Url::parse("https://shop.example.com/books//fiction/?page=2").unwrap();
        assert_eq!(
            link_path(&url),
            Some("shop.example.com/books/fiction".to_string())
        );
    }

    #[test]
    fn test_link_path_root() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(link_path(&url), Some("example.com".to_string()));
    }
}
