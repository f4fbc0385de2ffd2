//! Selector compilation
//!
//! Field and scope selectors may be CSS or XPath. CSS goes straight to
//! `scraper`; XPath is translated to an equivalent CSS selector first.
//! Only the location-path subset that maps cleanly onto CSS is accepted:
//!
//! - `//tag` (descendant) and `/tag` (child) steps, `*` wildcards
//! - `[@attr]`, `[@attr='v']`, `[contains(@attr,'v')]`, `[starts-with(@attr,'v')]`
//!
//! Positional predicates, axes and `text()` have no CSS counterpart and
//! are rejected.

use crate::config::SelectorKind;
use crate::crawler::FetchError;
use scraper::Selector;

/// Compiles a selector of the given kind
///
/// # Returns
///
/// * `Ok(Selector)` - Ready to run against a parsed page
/// * `Err(FetchError::Selector)` - Unsupported XPath or invalid CSS
pub fn compile(selector: &str, kind: SelectorKind) -> Result<Selector, FetchError> {
    let css = match kind {
        SelectorKind::Css => selector.trim().to_string(),
        SelectorKind::Xpath => xpath_to_css(selector)?,
    };

    Selector::parse(&css)
        .map_err(|e| FetchError::Selector(format!("'{}' (as CSS '{}'): {:?}", selector, css, e)))
}

/// Translates the supported XPath subset to CSS
pub fn xpath_to_css(xpath: &str) -> Result<String, FetchError> {
    let unsupported = |why: &str| FetchError::Selector(format!("XPath '{}': {}", xpath, why));

    let mut rest = xpath.trim();
    if let Some(stripped) = rest.strip_prefix('.') {
        if stripped.starts_with('/') {
            rest = stripped;
        }
    }

    if rest.is_empty() {
        return Err(unsupported("empty expression"));
    }

    let mut css = String::new();
    let mut first = true;

    while !rest.is_empty() {
        let combinator = if let Some(r) = rest.strip_prefix("//") {
            rest = r;
            " "
        } else if let Some(r) = rest.strip_prefix('/') {
            rest = r;
            " > "
        } else if first {
            // A relative path such as `div/a` starts from any element
            " "
        } else {
            return Err(unsupported("expected '/' between steps"));
        };

        let step_end = step_length(rest).map_err(|e| unsupported(&e))?;
        let step = &rest[..step_end];
        rest = &rest[step_end..];

        let compiled = translate_step(step).map_err(|e| unsupported(&e))?;

        if first {
            if combinator == " > " {
                // `/html` addresses the document root element
                css.push_str(&compiled);
                css.push_str(":root");
            } else {
                css.push_str(&compiled);
            }
            first = false;
        } else {
            css.push_str(combinator);
            css.push_str(&compiled);
        }
    }

    Ok(css)
}

/// Length of the step at the start of `s`, honoring brackets and quotes
fn step_length(s: &str) -> Result<usize, String> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '[' => depth += 1,
                ']' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| "unbalanced ']'".to_string())?
                }
                '/' if depth == 0 => return Ok(i),
                _ => {}
            },
        }
    }

    if depth != 0 || quote.is_some() {
        return Err("unterminated predicate".to_string());
    }
    Ok(s.len())
}

fn translate_step(step: &str) -> Result<String, String> {
    let (name, mut predicates) = match step.find('[') {
        Some(i) => (&step[..i], &step[i..]),
        None => (step, ""),
    };

    if name.is_empty() {
        return Err("missing element name".to_string());
    }
    if name == "." || name == ".." || name.contains("::") || name.ends_with("()") {
        return Err(format!("step '{}' has no CSS equivalent", name));
    }
    if name.starts_with('@') {
        return Err("attribute steps are not selectable; use the field's attribute".to_string());
    }
    if name != "*"
        && !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(format!("invalid element name '{}'", name));
    }

    let mut css = name.to_string();

    while !predicates.is_empty() {
        let body_end = predicate_end(predicates)?;
        let body = predicates[1..body_end].trim();
        predicates = &predicates[body_end + 1..];
        css.push_str(&translate_predicate(body)?);
    }

    Ok(css)
}

/// Index of the `]` closing the predicate that opens at `s[0]`
fn predicate_end(s: &str) -> Result<usize, String> {
    if !s.starts_with('[') {
        return Err(format!("unexpected '{}' after step", s));
    }

    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices().skip(1) {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '[' => return Err("nested predicates are not supported".to_string()),
                ']' => return Ok(i),
                _ => {}
            },
        }
    }
    Err("unterminated predicate".to_string())
}

fn translate_predicate(body: &str) -> Result<String, String> {
    let positional = body.chars().all(|c| c.is_ascii_digit())
        || body.starts_with("last(")
        || body.starts_with("position(");
    if positional {
        return Err(format!("positional predicate [{}] is not supported", body));
    }

    for (function, operator) in [("contains(", "*="), ("starts-with(", "^=")] {
        if let Some(args) = body.strip_prefix(function) {
            let args = args
                .strip_suffix(')')
                .ok_or_else(|| format!("unterminated {}", function))?;
            let (attr, value) = args
                .split_once(',')
                .ok_or_else(|| format!("{} needs two arguments", function))?;
            let attr = attribute_name(attr.trim())?;
            let value = quoted(value.trim())?;
            return Ok(format!("[{}{}\"{}\"]", attr, operator, escape(value)));
        }
    }

    if let Some((attr, value)) = body.split_once('=') {
        let attr = attribute_name(attr.trim())?;
        let value = quoted(value.trim())?;
        return Ok(format!("[{}=\"{}\"]", attr, escape(value)));
    }

    let attr = attribute_name(body)?;
    Ok(format!("[{}]", attr))
}

fn attribute_name(s: &str) -> Result<&str, String> {
    let name = s
        .strip_prefix('@')
        .ok_or_else(|| format!("predicate '{}' must test an attribute", s))?;
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(format!("invalid attribute name '{}'", name));
    }
    Ok(name)
}

fn quoted(s: &str) -> Result<&str, String> {
    let inner = s
        .strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
        .or_else(|| s.strip_prefix('"').and_then(|r| r.strip_suffix('"')));
    inner.ok_or_else(|| format!("expected a quoted string, got '{}'", s))
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
