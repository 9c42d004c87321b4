// src/models/rules.rs

//! Field rules: selectors, extractors, filters and the `ContentField`
//! that composes them.
//!
//! Rules are compiled once when configuration is parsed and are immutable
//! afterwards. CSS expressions and regular expressions are validated at
//! construction, so evaluation never has to deal with malformed rules.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use scraper::Selector;
use scraper::node::Element;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::FieldName;

/// Field name whose selectors collect every match by default.
pub const BODY_FIELD: &str = "body";

/// Where a selector reads its input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorSource {
    /// The fetched page (or the bundle root element within it)
    #[default]
    #[serde(alias = "PAGE")]
    Page,
    /// A previously extracted channel fragment, e.g. an RSS item
    #[serde(alias = "CHANNEL")]
    Channel,
    /// A key/value store captured alongside the page
    #[serde(alias = "STORE")]
    Store,
}

/// A compiled CSS selector that remembers its source text.
#[derive(Debug, Clone)]
pub struct Css {
    source: String,
    selector: Selector,
}

impl Css {
    pub fn parse(s: &str) -> Result<Self> {
        let selector = Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))?;
        Ok(Self {
            source: s.to_string(),
            selector,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }
}

impl PartialEq for Css {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Css {}

/// A compiled regular expression compared by its source text.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(expression: &str) -> Result<Self> {
        Regex::new(expression)
            .map(Self)
            .map_err(|e| AppError::pattern(expression, e))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn regex(&self) -> &Regex {
        &self.0
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Pattern {}

/// What a selector's expression addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// CSS selector for page and channel sources
    Css(Css),
    /// Key for store sources
    Key(String),
}

impl Expression {
    fn compile(source: SelectorSource, expression: &str) -> Result<Self> {
        match source {
            SelectorSource::Store => Ok(Expression::Key(expression.trim().to_string())),
            SelectorSource::Page | SelectorSource::Channel => Css::parse(expression).map(Self::Css),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Expression::Css(css) => css.as_str(),
            Expression::Key(key) => key,
        }
    }
}

/// Suppresses DOM subtrees during selection.
///
/// Parsed from `tag.class`, `tag#id`, `tag`, `.class` or `#id`. An empty
/// part does not constrain; all non-empty parts must match. Rules naming
/// more than one class or id are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludeRule {
    pub tag: String,
    pub class: String,
    pub id: String,
}

impl ExcludeRule {
    pub fn matches(&self, element: &Element) -> bool {
        if self.tag.is_empty() && self.class.is_empty() && self.id.is_empty() {
            return false;
        }
        if !self.tag.is_empty() && !element.name().eq_ignore_ascii_case(&self.tag) {
            return false;
        }
        if !self.class.is_empty() && !element.classes().any(|c| c == self.class) {
            return false;
        }
        if !self.id.is_empty() && element.id() != Some(self.id.as_str()) {
            return false;
        }
        true
    }
}

impl FromStr for ExcludeRule {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AppError::config("empty exclude rule"));
        }
        if s.matches(['.', '#']).count() > 1 || s.ends_with(['.', '#']) {
            return Err(AppError::validation(format!(
                "exclude rule '{s}' must be tag, tag.class, tag#id, .class or #id"
            )));
        }
        let rule = if let Some((tag, id)) = s.split_once('#') {
            ExcludeRule {
                tag: tag.to_string(),
                id: id.to_string(),
                ..Default::default()
            }
        } else if let Some((tag, class)) = s.split_once('.') {
            ExcludeRule {
                tag: tag.to_string(),
                class: class.to_string(),
                ..Default::default()
            }
        } else {
            ExcludeRule {
                tag: s.to_string(),
                ..Default::default()
            }
        };
        Ok(rule)
    }
}

impl fmt::Display for ExcludeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)?;
        if !self.class.is_empty() {
            write!(f, ".{}", self.class)?;
        }
        if !self.id.is_empty() {
            write!(f, "#{}", self.id)?;
        }
        Ok(())
    }
}

/// Locates a raw value for a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector {
    pub source: SelectorSource,
    pub expression: Expression,
    /// Read this attribute instead of the element text
    pub attribute: Option<String>,
    /// Collect every match instead of the first
    pub multiple: bool,
    pub separator: Option<String>,
    pub excludes: Vec<ExcludeRule>,
    /// Truncate at the first match and stop evaluating later selectors
    pub stop: Option<Pattern>,
}

impl FieldSelector {
    /// Create a page selector for `field`.
    ///
    /// `multiple` defaults to true only for the `body` field.
    pub fn new(field: &str, expression: &str) -> Result<Self> {
        Self::with_source(field, SelectorSource::Page, expression)
    }

    pub fn with_source(field: &str, source: SelectorSource, expression: &str) -> Result<Self> {
        Ok(Self {
            source,
            expression: Expression::compile(source, expression)?,
            attribute: None,
            multiple: field == BODY_FIELD,
            separator: None,
            excludes: Vec::new(),
            stop: None,
        })
    }

    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    pub fn exclude(mut self, rule: ExcludeRule) -> Self {
        self.excludes.push(rule);
        self
    }

    pub fn stop_at(mut self, pattern: Pattern) -> Self {
        self.stop = Some(pattern);
        self
    }

    pub fn css(&self) -> Option<&Selector> {
        match &self.expression {
            Expression::Css(css) => Some(css.selector()),
            Expression::Key(_) => None,
        }
    }

    pub fn join_separator(&self) -> &str {
        self.separator.as_deref().unwrap_or(" ")
    }

    pub fn is_excluded(&self, element: &Element) -> bool {
        self.excludes.iter().any(|rule| rule.matches(element))
    }

    /// Apply the stop expression. Returns the truncated text and whether
    /// evaluation should halt.
    pub fn truncate_at_stop(&self, text: String) -> (String, bool) {
        match self.stop.as_ref().and_then(|p| p.regex().find(&text)) {
            Some(m) => (text[..m.start()].trim_end().to_string(), true),
            None => (text, false),
        }
    }
}

/// Which matches an extractor keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    #[serde(alias = "FIRST")]
    First,
    #[serde(alias = "ALL")]
    All,
}

/// Regex post-processing of selected text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldExtractor {
    pub expression: Pattern,
    /// Replacement template with `$n` backreferences
    pub format: String,
    pub mode: MatchMode,
}

impl FieldExtractor {
    /// `format` defaults to `$1` when the expression has a capture group.
    pub fn new(expression: Pattern, format: Option<String>, mode: MatchMode) -> Self {
        let format = format.unwrap_or_else(|| {
            if expression.regex().captures_len() > 1 {
                "$1".to_string()
            } else {
                "$0".to_string()
            }
        });
        Self {
            expression,
            format,
            mode,
        }
    }

    /// Returns `None` when the expression does not match.
    pub fn apply(&self, text: &str) -> Option<String> {
        let regex = self.expression.regex();
        let mut formatted = Vec::new();
        for caps in regex.captures_iter(text) {
            let mut out = String::new();
            caps.expand(&self.format, &mut out);
            formatted.push(out.trim().to_string());
            if self.mode == MatchMode::First {
                break;
            }
        }
        if formatted.is_empty() {
            None
        } else {
            Some(formatted.join(" "))
        }
    }
}

/// Context a filter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterScope {
    #[default]
    #[serde(alias = "ALL")]
    All,
    #[serde(alias = "TEASER")]
    Teaser,
    #[serde(alias = "ARTICLE")]
    Article,
}

/// Result of running filters over a candidate value.
///
/// Ordered so that `Stop > Skip > None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilterOutcome {
    None,
    Skip,
    Stop,
}

/// Regex veto over candidate values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub expression: Pattern,
    pub scope: FilterScope,
    /// A match stops the whole field instead of skipping the candidate
    pub stop: bool,
}

impl FieldFilter {
    pub fn new(expression: Pattern, scope: FilterScope, stop: bool) -> Self {
        Self {
            expression,
            scope,
            stop,
        }
    }

    pub fn applies_to(&self, scope: FilterScope) -> bool {
        self.scope == FilterScope::All || scope == FilterScope::All || self.scope == scope
    }

    pub fn check(&self, text: &str) -> FilterOutcome {
        match (self.expression.is_match(text), self.stop) {
            (false, _) => FilterOutcome::None,
            (true, false) => FilterOutcome::Skip,
            (true, true) => FilterOutcome::Stop,
        }
    }

    /// Walk `filters` in declared order and return the dominant outcome.
    pub fn apply(filters: &[FieldFilter], text: &str, scope: FilterScope) -> FilterOutcome {
        let mut outcome = FilterOutcome::None;
        for filter in filters.iter().filter(|f| f.applies_to(scope)) {
            outcome = outcome.max(filter.check(text));
            if outcome == FilterOutcome::Stop {
                break;
            }
        }
        outcome
    }
}

/// Case transform applied to the final text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextCase {
    #[default]
    #[serde(alias = "NONE")]
    None,
    #[serde(alias = "UPPER")]
    Upper,
    #[serde(alias = "LOWER")]
    Lower,
    #[serde(alias = "SENTENCE")]
    Sentence,
    #[serde(alias = "TITLE")]
    Title,
}

impl TextCase {
    pub fn apply(&self, text: &str) -> String {
        match self {
            TextCase::None => text.to_string(),
            TextCase::Upper => text.to_uppercase(),
            TextCase::Lower => text.to_lowercase(),
            TextCase::Sentence => capitalize(&text.to_lowercase()),
            TextCase::Title => text
                .split(' ')
                .map(|word| capitalize(&word.to_lowercase()))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Rules for one field of a content bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentField {
    pub name: FieldName,
    pub selectors: Vec<FieldSelector>,
    pub extractors: Vec<FieldExtractor>,
    pub filters: Vec<FieldFilter>,
    /// chrono format strings, tried in order
    pub date_patterns: Vec<String>,
    pub case: TextCase,
    /// Strip query string and fragment from URL values
    pub remove_parameters: bool,
    /// Value is synthesized, never scraped
    pub generate: bool,
}

impl ContentField {
    pub fn new(name: FieldName) -> Self {
        Self {
            name,
            selectors: Vec::new(),
            extractors: Vec::new(),
            filters: Vec::new(),
            date_patterns: Vec::new(),
            case: TextCase::None,
            remove_parameters: false,
            generate: false,
        }
    }

    pub fn selector(mut self, selector: FieldSelector) -> Self {
        self.selectors.push(selector);
        self
    }

    pub fn extractor(mut self, extractor: FieldExtractor) -> Self {
        self.extractors.push(extractor);
        self
    }

    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn date_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.date_patterns.push(pattern.into());
        self
    }

    pub fn has_selectors(&self) -> bool {
        !self.selectors.is_empty()
    }

    /// Run every extractor in order over `text`.
    pub fn extract(&self, text: String) -> String {
        self.extractors.iter().fold(text, |current, extractor| {
            extractor.apply(&current).unwrap_or(current)
        })
    }
}
