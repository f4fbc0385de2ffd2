use crate::config::cleanup::CleanupRules;
use crate::config::types::{
    Config, CrawlerConfig, FieldConfig, IndexerConfig, OutputConfig, UserAgentConfig,
};
use crate::crawler::actions::{Action, MAX_WAIT_SECS};
use crate::crawler::selector;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_fields(&config.fields)?;
    validate_actions(&config.actions)?;
    if let Some(indexer) = &config.indexer {
        validate_indexer(indexer, &config.fields)?;
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.threads < 1 || config.threads > 64 {
        return Err(ConfigError::Validation(format!(
            "threads must be between 1 and 64, got {}",
            config.threads
        )));
    }

    let seed = Url::parse(&config.seed_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", config.seed_url, e))
    })?;

    if seed.scheme() != "http" && seed.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "Seed URL '{}' must use HTTP or HTTPS",
            config.seed_url
        )));
    }

    if seed.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' has no host",
            config.seed_url
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1".to_string(),
        ));
    }

    if config.scope_selectors.is_empty() {
        return Err(ConfigError::Validation(
            "scope_selectors cannot be empty".to_string(),
        ));
    }

    for scope in &config.scope_selectors {
        selector::compile(scope, config.scope_selector_kind)
            .map_err(|e| ConfigError::InvalidPattern(format!("scope selector: {}", e)))?;
    }

    if let Some(robots) = &config.robots_url {
        Url::parse(robots)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid robots_url: {}", e)))?;
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates field definitions: unique names, compilable selectors and clean-up rules
fn validate_fields(fields: &[FieldConfig]) -> Result<(), ConfigError> {
    if fields.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[field]] must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for field in fields {
        if field.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "field name cannot be empty".to_string(),
            ));
        }

        if !seen.insert(field.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate field name '{}'",
                field.name
            )));
        }

        selector::compile(&field.selector, field.selector_kind).map_err(|e| {
            ConfigError::InvalidPattern(format!("field '{}': {}", field.name, e))
        })?;

        CleanupRules::from_option(field.clean_up.as_deref())?;
    }

    Ok(())
}

/// Validates `[[action]]` entries: bounded waits, at least one scroll step
fn validate_actions(actions: &[Action]) -> Result<(), ConfigError> {
    for (i, action) in actions.iter().enumerate() {
        match action {
            Action::Click { selector } => {
                if selector.trim().is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "action {}: click selector cannot be empty",
                        i + 1
                    )));
                }
            }
            Action::Wait { seconds } => {
                if !(0.0..=MAX_WAIT_SECS).contains(seconds) {
                    return Err(ConfigError::Validation(format!(
                        "action {}: wait must be between 0 and {} seconds, got {}",
                        i + 1,
                        MAX_WAIT_SECS,
                        seconds
                    )));
                }
            }
            Action::Scroll { times, .. } => {
                if *times < 1 {
                    return Err(ConfigError::Validation(format!(
                        "action {}: scroll times must be >= 1",
                        i + 1
                    )));
                }
            }
        }
    }

    Ok(())
}

fn validate_indexer(indexer: &IndexerConfig, fields: &[FieldConfig]) -> Result<(), ConfigError> {
    if indexer.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "indexer name cannot be empty".to_string(),
        ));
    }

    if indexer.fields.is_empty() {
        return Err(ConfigError::Validation(format!(
            "indexer '{}' must index at least one field",
            indexer.name
        )));
    }

    for name in &indexer.fields {
        if !fields.iter().any(|f| &f.name == name) {
            return Err(ConfigError::Validation(format!(
                "indexer '{}' references unknown field '{}'",
                indexer.name, name
            )));
        }
    }

    if !indexer.k.is_finite() || indexer.k < 0.0 {
        return Err(ConfigError::Validation(format!(
            "k must be a non-negative number, got {}",
            indexer.k
        )));
    }

    if !indexer.b.is_finite() || !(0.0..=1.0).contains(&indexer.b) {
        return Err(ConfigError::Validation(format!(
            "b must be between 0 and 1, got {}",
            indexer.b
        )));
    }

    if indexer.q == 0 {
        return Err(ConfigError::Validation("q must be >= 1".to_string()));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let (local, domain) = email.split_once('@').ok_or_else(|| {
        ConfigError::Validation(format!("Invalid email format: '{}'", email))
    })?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
