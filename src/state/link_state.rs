/// Link state definitions for the per-link processing pipeline
///
/// A link moves `Pending → Fetched → LinksExtracted → FieldsExtracted →
/// DocumentsPersisted`, or short-circuits to `Skipped` or `Failed`. A page
/// whose fields produced no rows ends at `FieldsExtracted`.
use std::fmt;

/// An entry of the global link table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub visited: bool,
    /// Hops from the seed URL (the seed has depth 0)
    pub depth: u32,
}

impl Link {
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            visited: false,
            depth,
        }
    }
}

/// Why a link was not (fully) processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    /// Another worker (or this one) already fetched the URL
    AlreadyVisited,
    /// The collected-document cap was reached
    QuotaLimit,
    /// A discovered link would exceed the maximum depth
    DepthLimit,
    /// A discovered link points to another host
    CrossSite,
    /// A discovered link is on the exclusion list
    Excluded,
    /// A discovered link matches a robots.txt disallow rule
    RobotsDisallowed,
    /// The link table is full
    LinkCap,
    /// The run was told to exit
    RunStopped,
}

impl SkipReason {
    /// Human-readable label used as the statistics key
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadyVisited => "Already visited",
            Self::QuotaLimit => "Quota limit",
            Self::DepthLimit => "Depth limit",
            Self::CrossSite => "Cross site",
            Self::Excluded => "Excluded",
            Self::RobotsDisallowed => "Robots disallowed",
            Self::LinkCap => "Link cap",
            Self::RunStopped => "Run stopped",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a link ended up in the processing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Pending,
    Fetched,
    LinksExtracted,
    FieldsExtracted,
    DocumentsPersisted,
    Skipped(SkipReason),
    Failed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Fetched => f.write_str("fetched"),
            Self::LinksExtracted => f.write_str("links_extracted"),
            Self::FieldsExtracted => f.write_str("fields_extracted"),
            Self::DocumentsPersisted => f.write_str("documents_persisted"),
            Self::Skipped(reason) => write!(f, "skipped ({})", reason),
            Self::Failed => f.write_str("failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_link_is_unvisited() {
        let link = Link::new("https://example.com/", 0);
        assert!(!link.visited);
        assert_eq!(link.depth, 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            LinkState::Skipped(SkipReason::QuotaLimit).to_string(),
            "skipped (Quota limit)"
        );
        assert_eq!(LinkState::Failed.to_string(), "failed");
        assert_eq!(LinkState::FieldsExtracted.to_string(), "fields_extracted");
    }
}
