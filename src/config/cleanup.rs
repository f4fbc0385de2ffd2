use crate::ConfigError;
use regex::Regex;

/// An ordered list of regex replace rules applied to extracted values
///
/// Rules are written as `pattern=replacement` and separated by `|`. The
/// first `=` splits pattern from replacement, so a replacement may itself
/// contain `=`. An empty specification yields no rules.
#[derive(Debug, Clone, Default)]
pub struct CleanupRules {
    rules: Vec<(Regex, String)>,
}

impl CleanupRules {
    /// Compiles a pipe-delimited rule specification
    ///
    /// # Arguments
    ///
    /// * `spec` - Rules such as `\$=|,=.`
    ///
    /// # Returns
    ///
    /// * `Ok(CleanupRules)` - All rules compiled
    /// * `Err(ConfigError::InvalidPattern)` - A rule lacks `=` or its pattern is not a valid regex
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let mut rules = Vec::new();

        for raw in spec.split('|') {
            if raw.is_empty() {
                continue;
            }

            let (pattern, replacement) = raw.split_once('=').ok_or_else(|| {
                ConfigError::InvalidPattern(format!(
                    "clean-up rule '{}' must have the form pattern=replacement",
                    raw
                ))
            })?;

            let regex = Regex::new(pattern).map_err(|e| {
                ConfigError::InvalidPattern(format!("clean-up pattern '{}': {}", pattern, e))
            })?;

            rules.push((regex, replacement.to_string()));
        }

        Ok(Self { rules })
    }

    /// Compiles an optional specification; `None` means no rules
    pub fn from_option(spec: Option<&str>) -> Result<Self, ConfigError> {
        match spec {
            Some(s) => Self::parse(s),
            None => Ok(Self::default()),
        }
    }

    /// Applies every rule in order
    pub fn apply(&self, value: &str) -> String {
        let mut out = value.to_string();
        for (regex, replacement) in &self.rules {
            out = regex.replace_all(&out, replacement.as_str()).into_owned();
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_apply_in_order() {
        let rules = CleanupRules::parse(r"\$=|,=.").unwrap();
        assert_eq!(rules.apply("$1,50"), "1.50");
    }

    #[test]
    fn test_replacement_may_contain_equals() {
        let rules = CleanupRules::parse("a=b=c").unwrap();
        assert_eq!(rules.apply("xa"), "xb=c");
    }

    #[test]
    fn test_empty_spec_is_identity() {
        let rules = CleanupRules::parse("").unwrap();
        assert!(rules.is_empty());
        assert_eq!(rules.apply(" keep "), " keep ");
    }

    #[test]
    fn test_rule_without_equals_rejected() {
        assert!(matches!(
            CleanupRules::parse("nope"),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_bad_regex_rejected() {
        assert!(CleanupRules::parse("(unclosed=x").is_err());
    }
}
