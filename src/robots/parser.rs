//! Robots.txt parser
//!
//! Line parsing is done by the robotstxt crate; this module only collects
//! the `Disallow` rules that apply to the crawler. Each one becomes an
//! anchored regex over the URL path (plus query). `*` matches any run of
//! characters and a trailing `$` pins the end of the path. `Allow` lines
//! are ignored: a rule is either a disallow pattern or nothing.

use regex::Regex;
use robotstxt::{parse_robotstxt, RobotsParseHandler};

/// Disallow rules that apply to one crawler
#[derive(Debug, Clone, Default)]
pub struct ParsedRobots {
    patterns: Vec<Regex>,
}

impl ParsedRobots {
    /// Parses robots.txt content for the given crawler name
    ///
    /// A group naming the crawler (case-insensitive product token) takes
    /// precedence; if none does, the `*` group applies. Rules that fail to
    /// compile are skipped with a warning.
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file content
    /// * `crawler_name` - Product token to look for in `User-agent` lines
    pub fn from_content(content: &str, crawler_name: &str) -> Self {
        let mut collector = DisallowCollector::new(crawler_name);
        parse_robotstxt(content, &mut collector);

        let patterns = collector
            .into_rules()
            .into_iter()
            .filter_map(|rule| match disallow_to_regex(&rule) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::warn!("Skipping robots rule '{}': {}", rule, e);
                    None
                }
            })
            .collect();

        Self { patterns }
    }

    /// A policy with no rules
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }

    pub fn into_patterns(self) -> Vec<Regex> {
        self.patterns
    }

    /// Checks a path (with optional query) against every rule
    pub fn is_disallowed(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(path))
    }
}

/// Parse callbacks that keep the `*` group's and the crawler's own rules
///
/// Consecutive `User-agent` lines share one group; the first one after a
/// rule line opens a new group.
#[derive(Debug, Default)]
struct DisallowCollector {
    crawler_name: String,
    in_global_group: bool,
    in_own_group: bool,
    rules_started: bool,
    own_group_seen: bool,
    global_rules: Vec<String>,
    own_rules: Vec<String>,
}

impl DisallowCollector {
    fn new(crawler_name: &str) -> Self {
        Self {
            crawler_name: crawler_name.to_string(),
            ..Default::default()
        }
    }

    /// The crawler's own rules if it has a group, else the `*` rules
    fn into_rules(self) -> Vec<String> {
        if self.own_group_seen {
            self.own_rules
        } else {
            self.global_rules
        }
    }
}

/// Leading product token of a `User-agent` value (`Bot/2.1` → `Bot`)
fn product_token(user_agent: &str) -> &str {
    let end = user_agent
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(user_agent.len());
    &user_agent[..end]
}

impl RobotsParseHandler for DisallowCollector {
    fn handle_robots_start(&mut self) {}

    fn handle_robots_end(&mut self) {}

    fn handle_user_agent(&mut self, _line_num: u32, user_agent: &str) {
        if self.rules_started {
            self.in_global_group = false;
            self.in_own_group = false;
            self.rules_started = false;
        }

        let user_agent = user_agent.trim();
        if user_agent.starts_with('*') {
            self.in_global_group = true;
            return;
        }

        let token = product_token(user_agent);
        if !token.is_empty() && token.eq_ignore_ascii_case(&self.crawler_name) {
            self.in_own_group = true;
            self.own_group_seen = true;
        }
    }

    fn handle_allow(&mut self, _line_num: u32, _value: &str) {
        self.rules_started = true;
    }

    fn handle_disallow(&mut self, _line_num: u32, value: &str) {
        self.rules_started = true;
        if value.is_empty() {
            return;
        }

        if self.in_own_group {
            self.own_rules.push(value.to_string());
        } else if self.in_global_group {
            self.global_rules.push(value.to_string());
        }
    }

    fn handle_sitemap(&mut self, _line_num: u32, _value: &str) {}

    fn handle_unknown_action(&mut self, _line_num: u32, _action: &str, _value: &str) {}
}

/// Converts a `Disallow` value to an anchored regex
pub fn disallow_to_regex(rule: &str) -> Result<Regex, regex::Error> {
    let (body, anchored_end) = match rule.strip_suffix('$') {
        Some(body) => (body, true),
        None => (rule, false),
    };

    let pattern = body
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    let mut full = format!("^{}", pattern);
    if anchored_end {
        full.push('$');
    }
    Regex::new(&full)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = "\
# comment line
User-agent: *
Disallow: /private/
Disallow: /*.pdf$
Disallow:

User-agent: Scrapedex
User-agent: other-bot
Disallow: /checkout
Allow: /checkout/help
";

    #[test]
    fn test_wildcard_group_for_unknown_agent() {
        let robots = ParsedRobots::from_content(ROBOTS, "SomeBot");
        assert_eq!(robots.patterns().len(), 2);
        assert!(robots.is_disallowed("/private/area"));
        assert!(robots.is_disallowed("/docs/file.pdf"));
        assert!(!robots.is_disallowed("/docs/file.pdf?x=1"));
        assert!(!robots.is_disallowed("/checkout"));
    }

    #[test]
    fn test_specific_group_overrides_wildcard() {
        let robots = ParsedRobots::from_content(ROBOTS, "Scrapedex");
        assert!(robots.is_disallowed("/checkout"));
        assert!(robots.is_disallowed("/checkout/help"));
        assert!(!robots.is_disallowed("/private/area"));
    }

    #[test]
    fn test_rules_are_anchored_at_start() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /admin", "x");
        assert!(robots.is_disallowed("/admin/users"));
        assert!(!robots.is_disallowed("/shop/admin"));
    }

    #[test]
    fn test_regex_metacharacters_escaped() {
        let regex = disallow_to_regex("/a+b?").unwrap();
        assert!(regex.is_match("/a+b?c"));
        assert!(!regex.is_match("/aab"));
    }

    #[test]
    fn test_user_agent_after_rules_starts_new_group() {
        let content = "\
User-agent: Scrapedex
Disallow: /mine

User-agent: *
Disallow: /everyone
";
        let robots = ParsedRobots::from_content(content, "scrapedex");
        assert!(robots.is_disallowed("/mine"));
        assert!(!robots.is_disallowed("/everyone"));

        let other = ParsedRobots::from_content(content, "OtherBot");
        assert!(other.is_disallowed("/everyone"));
        assert!(!other.is_disallowed("/mine"));
    }

    #[test]
    fn test_product_token_matching() {
        let robots = ParsedRobots::from_content(
            "User-agent: Scrapedex/2.0 (+https://example.com)\nDisallow: /versioned\n",
            "Scrapedex",
        );
        assert!(robots.is_disallowed("/versioned"));

        // A longer token is a different crawler
        let robots = ParsedRobots::from_content(
            "User-agent: ScrapedexPro\nDisallow: /pro\n",
            "Scrapedex",
        );
        assert!(robots.patterns().is_empty());
    }

    #[test]
    fn test_empty_content_allows_all() {
        let robots = ParsedRobots::from_content("", "x");
        assert!(robots.patterns().is_empty());
        assert!(!robots.is_disallowed("/anything"));
    }
}
