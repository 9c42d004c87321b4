// src/services/evaluator.rs

//! Field rule evaluation.
//!
//! Evaluates one [`ContentField`] against a fetched page. Selectors run in
//! declared order and every surviving candidate is kept, so callers can take
//! the first value or all of them.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html};

use crate::error::{AppError, Result};
use crate::models::{
    ContentField, Expression, FieldFilter, FieldSelector, FilterOutcome, FilterScope,
    SelectorSource,
};
use crate::services::dates;
use crate::utils::url::strip_parameters;

/// Elements whose boundaries separate words in collected text.
const BLOCK_TAGS: [&str; 22] = [
    "address", "article", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption", "footer",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "li", "p", "section", "td", "tr",
];

/// A fetched page with its optional channel fragment and key/value store.
#[derive(Debug)]
pub struct Page {
    pub url: String,
    pub html: Html,
    pub channel: Option<Html>,
    pub store: BTreeMap<String, String>,
}

impl Page {
    pub fn parse(url: impl Into<String>, html: &str) -> Self {
        Self {
            url: url.into(),
            html: Html::parse_document(html),
            channel: None,
            store: BTreeMap::new(),
        }
    }

    pub fn with_channel(mut self, fragment: &str) -> Self {
        self.channel = Some(Html::parse_fragment(fragment));
        self
    }

    pub fn with_store(mut self, store: BTreeMap<String, String>) -> Self {
        self.store = store;
        self
    }

    /// `<meta>` name/property values, a useful store for most pages.
    pub fn meta_store(html: &Html) -> BTreeMap<String, String> {
        let mut store = BTreeMap::new();
        if let Ok(selector) = scraper::Selector::parse("meta[content]") {
            for meta in html.select(&selector) {
                let element = meta.value();
                let key = element.attr("property").or_else(|| element.attr("name"));
                if let (Some(key), Some(content)) = (key, element.attr("content")) {
                    store
                        .entry(key.to_string())
                        .or_insert_with(|| content.trim().to_string());
                }
            }
        }
        store
    }
}

/// Where page selectors are evaluated: the whole page or one root element.
#[derive(Clone, Copy)]
pub struct DocumentContext<'a> {
    page: &'a Page,
    scope: Option<ElementRef<'a>>,
}

impl<'a> DocumentContext<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page, scope: None }
    }

    pub fn scoped(page: &'a Page, scope: ElementRef<'a>) -> Self {
        Self {
            page,
            scope: Some(scope),
        }
    }

    pub fn page(&self) -> &'a Page {
        self.page
    }

    fn elements(&self, selector: &FieldSelector) -> Vec<ElementRef<'a>> {
        let Some(css) = selector.css() else {
            return Vec::new();
        };
        match selector.source {
            SelectorSource::Page => match self.scope {
                Some(scope) => scope.select(css).collect(),
                None => self.page.html.select(css).collect(),
            },
            SelectorSource::Channel => self
                .page
                .channel
                .as_ref()
                .map(|channel| channel.select(css).collect())
                .unwrap_or_default(),
            SelectorSource::Store => Vec::new(),
        }
    }

    /// Raw value of `selector`, or `None` when nothing matched.
    pub fn select(&self, selector: &FieldSelector) -> Option<String> {
        if let Expression::Key(key) = &selector.expression {
            return self
                .page
                .store
                .get(key)
                .map(|value| normalize_whitespace(value));
        }

        let mut values = self
            .elements(selector)
            .into_iter()
            .filter(|element| !in_excluded_subtree(*element, selector))
            .map(|element| element_value(element, selector))
            .filter(|value| !value.is_empty());

        if selector.multiple {
            let values: Vec<String> = values.collect();
            if values.is_empty() {
                None
            } else {
                Some(values.join(selector.join_separator()))
            }
        } else {
            values.next()
        }
    }

    /// True when `selector` matches anything.
    pub fn matches(&self, selector: &FieldSelector) -> bool {
        match &selector.expression {
            Expression::Key(key) => self.page.store.contains_key(key),
            Expression::Css(_) => !self.elements(selector).is_empty(),
        }
    }
}

fn in_excluded_subtree(element: ElementRef<'_>, selector: &FieldSelector) -> bool {
    if selector.excludes.is_empty() {
        return false;
    }
    selector.is_excluded(element.value())
        || element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| selector.is_excluded(ancestor.value()))
}

fn element_value(element: ElementRef<'_>, selector: &FieldSelector) -> String {
    if let Some(attribute) = &selector.attribute {
        return element
            .value()
            .attr(attribute)
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
    }
    let mut text = String::new();
    collect_text(element, selector, &mut text);
    normalize_whitespace(&text)
}

fn collect_text(element: ElementRef<'_>, selector: &FieldSelector, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            if selector.is_excluded(child.value()) {
                continue;
            }
            let block = BLOCK_TAGS.contains(&child.value().name());
            if block {
                out.push(' ');
            }
            collect_text(child, selector, out);
            if block {
                out.push(' ');
            }
        }
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Result of evaluating one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    /// Surviving candidates in selector order
    Values(Vec<String>),
    /// A STOP filter matched; the owning record is excluded
    Stopped,
}

impl FieldOutcome {
    pub fn first(&self) -> Option<&str> {
        match self {
            FieldOutcome::Values(values) => values.first().map(String::as_str),
            FieldOutcome::Stopped => None,
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, FieldOutcome::Stopped)
    }
}

/// Evaluates field rules in a teaser or article scope.
#[derive(Debug, Clone, Default)]
pub struct FieldEvaluator {
    scope: FilterScope,
    default_date_pattern: Option<String>,
}

impl FieldEvaluator {
    pub fn new(scope: FilterScope) -> Self {
        Self {
            scope,
            default_date_pattern: None,
        }
    }

    /// Pattern used by date fields that declare none.
    pub fn default_date_pattern(mut self, pattern: Option<String>) -> Self {
        self.default_date_pattern = pattern;
        self
    }

    pub fn scope(&self) -> FilterScope {
        self.scope
    }

    /// Evaluate `field` against `context`.
    ///
    /// Returns `DateParse` only when a candidate failed every date pattern
    /// and no other candidate produced a value.
    pub fn evaluate(
        &self,
        field: &ContentField,
        context: &DocumentContext<'_>,
    ) -> Result<FieldOutcome> {
        if field.generate {
            return Ok(FieldOutcome::Values(Vec::new()));
        }

        let patterns = self.date_patterns(field);
        let mut values = Vec::new();
        let mut date_error = None;

        for selector in &field.selectors {
            let Some(raw) = context.select(selector) else {
                continue;
            };
            let text = field.extract(raw);
            let (text, halt) = selector.truncate_at_stop(text);

            if !text.is_empty() {
                match FieldFilter::apply(&field.filters, &text, self.scope) {
                    FilterOutcome::Stop => return Ok(FieldOutcome::Stopped),
                    FilterOutcome::Skip => {}
                    FilterOutcome::None => {
                        let text = field.case.apply(&text);
                        match self.normalize_date(&text, &patterns) {
                            Some(text) => {
                                let text = if field.remove_parameters {
                                    strip_parameters(&text)
                                } else {
                                    text
                                };
                                if !text.is_empty() {
                                    values.push(text);
                                }
                            }
                            None => {
                                date_error.get_or_insert_with(|| AppError::DateParse {
                                    field: field.name.to_string(),
                                    value: text,
                                    patterns: patterns.clone(),
                                });
                            }
                        }
                    }
                }
            }

            if halt {
                break;
            }
        }

        match date_error {
            Some(error) if values.is_empty() => Err(error),
            _ => Ok(FieldOutcome::Values(values)),
        }
    }

    fn date_patterns(&self, field: &ContentField) -> Vec<String> {
        if !field.date_patterns.is_empty() {
            return field.date_patterns.clone();
        }
        match (&self.default_date_pattern, field.name.is_date()) {
            (Some(pattern), true) => vec![pattern.clone()],
            _ => Vec::new(),
        }
    }

    fn normalize_date(&self, text: &str, patterns: &[String]) -> Option<String> {
        if patterns.is_empty() {
            return Some(text.to_string());
        }
        dates::normalize(text, patterns)
    }
}
