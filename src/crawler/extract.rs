//! Link discovery and field extraction for a single page
//!
//! Everything here is synchronous: the parsed DOM is not `Send`, so it is
//! built, queried and dropped inside one call and never lives across an
//! `.await` in the worker.

use crate::config::{CleanupRules, Config, FieldConfig};
use crate::crawler::fetcher::{Element, RenderedPage};
use crate::crawler::selector;
use crate::url::resolve_link;
use crate::ConfigError;
use scraper::Selector;
use sha1::{Digest, Sha1};
use url::Url;

/// A field definition with its selector and clean-up rules compiled
#[derive(Debug, Clone)]
pub struct CompiledField {
    pub name: String,
    selector: Selector,
    attribute: Option<String>,
    cleanup: CleanupRules,
}

impl CompiledField {
    pub fn compile(field: &FieldConfig) -> Result<Self, ConfigError> {
        let selector = selector::compile(&field.selector, field.selector_kind)
            .map_err(|e| ConfigError::InvalidPattern(format!("field '{}': {}", field.name, e)))?;

        Ok(Self {
            name: field.name.clone(),
            selector,
            attribute: field
                .attribute
                .as_ref()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            cleanup: CleanupRules::from_option(field.clean_up.as_deref())?,
        })
    }

    fn value_of(&self, element: &Element) -> ExtractedValue {
        let attribute = match &self.attribute {
            Some(name) => element.attribute(name).unwrap_or("").to_string(),
            None => String::new(),
        };

        ExtractedValue {
            field: self.name.clone(),
            value: self.cleanup.apply(&element.text),
            attribute,
        }
    }
}

/// Everything needed to process a page, compiled once per run
#[derive(Debug, Clone)]
pub struct ExtractionPlan {
    scopes: Vec<Selector>,
    anchor: Selector,
    fields: Vec<CompiledField>,
    allow_multi_elements: bool,
}

impl ExtractionPlan {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let scopes = config
            .crawler
            .scope_selectors
            .iter()
            .map(|s| {
                selector::compile(s, config.crawler.scope_selector_kind)
                    .map_err(|e| ConfigError::InvalidPattern(format!("scope selector: {}", e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let fields = config
            .fields
            .iter()
            .map(CompiledField::compile)
            .collect::<Result<Vec<_>, _>>()?;

        let anchor = Selector::parse("a")
            .map_err(|e| ConfigError::InvalidPattern(format!("anchor selector: {:?}", e)))?;

        Ok(Self {
            scopes,
            anchor,
            fields,
            allow_multi_elements: config.crawler.allow_multi_elements,
        })
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// One cleaned value of one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedValue {
    pub field: String,
    pub value: String,
    pub attribute: String,
}

/// Result of running the field selectors on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    /// A field matched nothing; the page holds no records
    NoMatch { field: String },
    /// Fields matched different numbers of elements
    Mismatch { lengths: Vec<(String, usize)> },
    /// One row per record, one value per field in configuration order
    Aligned(Vec<Vec<ExtractedValue>>),
}

/// Everything extracted from one page
#[derive(Debug, Clone)]
pub struct PageExtraction {
    /// Anchors found inside the scopes, resolved and fragment-free, in
    /// document order (duplicates included)
    pub links: Vec<Url>,
    pub fields: FieldOutcome,
}

/// Extracts candidate links and field rows from a page
///
/// # Arguments
///
/// * `page` - The page after before-extraction actions
/// * `plan` - Compiled selectors
/// * `discover_links` - False when the page sits at the maximum depth
pub fn extract_page(
    page: &RenderedPage,
    plan: &ExtractionPlan,
    discover_links: bool,
) -> PageExtraction {
    let document = page.document();

    let mut links = Vec::new();
    if discover_links {
        for scope in &plan.scopes {
            let mut matched = false;
            for scoped in document.select(scope) {
                matched = true;
                for anchor in scoped.select(&plan.anchor) {
                    if let Some(href) = anchor.value().attr("href") {
                        if let Some(url) = resolve_link(href, &page.url) {
                            links.push(url);
                        }
                    }
                }
            }
            if !matched {
                tracing::debug!("Scope not found on {}", page.url);
            }
        }
    }

    let mut columns: Vec<Vec<ExtractedValue>> = Vec::with_capacity(plan.fields.len());
    for field in &plan.fields {
        let mut elements = document.select(&field.selector).map(Element::from_ref);

        let values: Vec<ExtractedValue> = if plan.allow_multi_elements {
            elements.map(|e| field.value_of(&e)).collect()
        } else {
            elements.next().map(|e| field.value_of(&e)).into_iter().collect()
        };

        if values.is_empty() {
            return PageExtraction {
                links,
                fields: FieldOutcome::NoMatch {
                    field: field.name.clone(),
                },
            };
        }
        columns.push(values);
    }

    PageExtraction {
        links,
        fields: align_columns(&plan.fields, columns),
    }
}

/// Turns per-field value lists into rows, or reports a length mismatch
fn align_columns(fields: &[CompiledField], columns: Vec<Vec<ExtractedValue>>) -> FieldOutcome {
    let Some(expected) = columns.first().map(Vec::len) else {
        return FieldOutcome::Aligned(Vec::new());
    };

    if columns.iter().any(|c| c.len() != expected) {
        return FieldOutcome::Mismatch {
            lengths: fields
                .iter()
                .zip(&columns)
                .map(|(f, c)| (f.name.clone(), c.len()))
                .collect(),
        };
    }

    let mut iters: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
    let rows = (0..expected)
        .map(|_| iters.iter_mut().filter_map(Iterator::next).collect())
        .collect();

    FieldOutcome::Aligned(rows)
}

/// SHA-1 (hex) over the concatenated value and attribute of every field in a row
pub fn content_hash(row: &[ExtractedValue]) -> String {
    let mut hasher = Sha1::new();
    for value in row {
        hasher.update(value.value.as_bytes());
        hasher.update(value.attribute.as_bytes());
    }
    hex::encode(hasher.finalize())
}
