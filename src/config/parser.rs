use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Reads, parses and validates a configuration file
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use scrapedex::config::load_config;
///
/// let config = load_config(Path::new("config.toml")).unwrap();
/// println!("Seed: {}", config.crawler.seed_url);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    parse_config(&std::fs::read_to_string(path)?)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Hex SHA-256 of a configuration file, stored on every run record
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(hash_content(&std::fs::read_to_string(path)?))
}

fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Loads a configuration together with the hash of the exact text parsed
///
/// # Returns
///
/// * `Ok((Config, String))` - The validated configuration and its hash
/// * `Err(ConfigError)` - The file could not be read, parsed or validated
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(&content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::SelectorKind;
    use crate::crawler::level_queue::TraversalOrder;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
[crawler]
seed-url = "https://example.com/"
threads = 4
max-depth = 2
max-pages = 100
traversal = "top-down"

[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = "./test.db"

[[field]]
name = "title"
selector = "//h1"

[[field]]
name = "price"
selector = ".price"
selector-kind = "css"
clean-up = "\\$="
variable-name = "price"

[[action]]
type = "wait"
seconds = 1

[[action]]
type = "scroll"
times = 2
direction = "down"

[indexer]
name = "products"
fields = ["title"]
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.threads, 4);
        assert_eq!(config.crawler.max_depth, 2);
        assert_eq!(config.crawler.traversal, TraversalOrder::TopDown);
        assert_eq!(config.crawler.idle_backoff_ms, 5000);
        assert_eq!(config.crawler.scope_selectors, vec!["//body".to_string()]);
        assert_eq!(config.user_agent.crawler_name, "TestCrawler");
        assert_eq!(config.fields.len(), 2);
        assert_eq!(config.fields[0].selector_kind, SelectorKind::Xpath);
        assert_eq!(config.fields[1].selector_kind, SelectorKind::Css);
        assert_eq!(config.actions.len(), 2);

        let indexer = config.indexer.unwrap();
        assert_eq!(indexer.k, 1.75);
        assert_eq!(indexer.b, 0.75);
        assert_eq!(indexer.q, 3);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/scrapedex.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = parse_config("[crawler\nseed-url = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let err = parse_config(&VALID_CONFIG.replace("threads = 4", "threads = 0")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_oversized_wait_rejected() {
        let err = parse_config(&VALID_CONFIG.replace("seconds = 1", "seconds = 1e20")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_hash_tracks_file_content() {
        let file = create_temp_config(VALID_CONFIG);
        let (_, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(hash, compute_config_hash(file.path()).unwrap());
        assert_eq!(hash.len(), 64);

        let edited = create_temp_config(&VALID_CONFIG.replace("max-pages = 100", "max-pages = 50"));
        assert_ne!(hash, compute_config_hash(edited.path()).unwrap());
    }
}
