//! Per-organisation, per-content-type extraction and output configuration.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{ContentField, FieldName, FieldSelector, FieldSource, Fields, SelectorSource};

/// Reserved content-type keys of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "roundup")]
    Roundup,
    #[serde(rename = "post")]
    Post,
    #[serde(rename = "event")]
    Event,
    #[serde(rename = "white-papers")]
    WhitePaper,
    #[serde(rename = "ebooks")]
    Ebook,
    #[serde(rename = "tool")]
    Tool,
    #[serde(rename = "project")]
    Project,
    #[serde(rename = "listing")]
    Listing,
}

impl ContentType {
    pub const ALL: [ContentType; 9] = [
        ContentType::Video,
        ContentType::Roundup,
        ContentType::Post,
        ContentType::Event,
        ContentType::WhitePaper,
        ContentType::Ebook,
        ContentType::Tool,
        ContentType::Project,
        ContentType::Listing,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ContentType::Video => "video",
            ContentType::Roundup => "roundup",
            ContentType::Post => "post",
            ContentType::Event => "event",
            ContentType::WhitePaper => "white-papers",
            ContentType::Ebook => "ebooks",
            ContentType::Tool => "tool",
            ContentType::Project => "project",
            ContentType::Listing => "listing",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        ContentType::ALL.iter().copied().find(|t| t.key() == key)
    }

    pub fn is_listing(&self) -> bool {
        matches!(self, ContentType::Listing)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s).ok_or_else(|| format!("unknown content type '{s}'"))
    }
}

/// Bundle of field rules keyed by role, scoped by `root` and gated by
/// `validator`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFields {
    /// Each match becomes one record; the whole page when absent
    pub root: Option<FieldSelector>,
    /// The bundle applies only when this selector matches
    pub validator: Option<FieldSelector>,
    pub fields: BTreeMap<FieldName, ContentField>,
}

impl ContentFields {
    pub fn get(&self, name: FieldName) -> Option<&ContentField> {
        self.fields.get(&name)
    }

    pub fn insert(&mut self, field: ContentField) {
        self.fields.insert(field.name, field);
    }

    /// A bundle is configured when at least one field has selectors.
    pub fn is_configured(&self) -> bool {
        self.fields.values().any(ContentField::has_selectors)
    }
}

/// Page-loading parameters handed to the crawler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadingConfig {
    /// Milliseconds to wait after load
    pub wait_ms: u64,
    pub scroll: bool,
    /// Selectors to wait for
    pub selectors: Vec<String>,
    /// Keep only records whose title contains one of these keywords
    pub keywords: Vec<String>,
    pub anti_cache: bool,
}

impl LoadingConfig {
    pub fn accepts(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let text = text.to_lowercase();
        self.keywords
            .iter()
            .any(|keyword| text.contains(&keyword.to_lowercase()))
    }

    /// Append a cache-busting parameter when `anti_cache` is set.
    pub fn page_url(&self, url: &str, stamp: i64) -> String {
        if !self.anti_cache {
            return url.to_string();
        }
        let joiner = if url.contains('?') { '&' } else { '?' };
        format!("{url}{joiner}_={stamp}")
    }
}

/// Teaser or article extraction settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleConfig {
    pub loading: Option<LoadingConfig>,
    /// Tried in order; the first bundle whose validator matches applies
    pub fields: Vec<ContentFields>,
}

impl ArticleConfig {
    pub fn is_configured(&self) -> bool {
        self.fields.iter().any(ContentFields::is_configured)
    }
}

/// Static values contributed to every record of a content type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldsConfig {
    pub values: Fields,
}

impl FieldSource for FieldsConfig {
    fn fields(&self) -> Cow<'_, Fields> {
        Cow::Borrowed(&self.values)
    }
}

/// Summary derivation limits, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryConfig {
    /// Zero means unlimited
    pub max_length: usize,
    pub min_length: usize,
    pub min_paragraph: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_length: 250,
            min_length: 80,
            min_paragraph: 40,
        }
    }
}

/// A listing page to crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageConfig {
    pub url: String,
    pub loading: Option<LoadingConfig>,
}

/// Ordered header to template mapping of the output feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputColumns(Vec<(String, String)>);

impl OutputColumns {
    pub fn new(columns: Vec<(String, String)>) -> Self {
        Self(columns)
    }

    pub fn headers(&self) -> Vec<String> {
        self.0.iter().map(|(h, _)| h.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(h, t)| (h.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Complete configuration for one content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentConfig {
    pub content_type: ContentType,
    pub filename: String,
    pub sheet: String,
    pub source: SelectorSource,
    pub default_date_pattern: Option<String>,
    pub trailing_slash: bool,
    pub summary: SummaryConfig,
    pub output: OutputColumns,
    /// Output columns escaped as HTML instead of transliterated
    pub html_fields: Vec<String>,
    pub fields: FieldsConfig,
    pub pages: Vec<PageConfig>,
    pub loading: LoadingConfig,
    pub teasers: ArticleConfig,
    pub articles: ArticleConfig,
}

impl ContentConfig {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            filename: String::new(),
            sheet: String::new(),
            source: SelectorSource::Page,
            default_date_pattern: None,
            trailing_slash: false,
            summary: SummaryConfig::default(),
            output: OutputColumns::default(),
            html_fields: Vec::new(),
            fields: FieldsConfig::default(),
            pages: Vec::new(),
            loading: LoadingConfig::default(),
            teasers: ArticleConfig::default(),
            articles: ArticleConfig::default(),
        }
    }

    /// Loading settings for teaser pages, falling back to the shared block.
    pub fn teaser_loading(&self) -> &LoadingConfig {
        self.teasers.loading.as_ref().unwrap_or(&self.loading)
    }

    /// Loading settings for article pages, falling back to the shared block.
    pub fn article_loading(&self) -> &LoadingConfig {
        self.articles.loading.as_ref().unwrap_or(&self.loading)
    }
}

/// Parsed `content.yml`, shared by every organisation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDefaults {
    pub contents: BTreeMap<ContentType, ContentConfig>,
    /// Document the defaults were compiled from
    pub document: String,
}

impl ConfigDefaults {
    pub fn content(&self, content_type: ContentType) -> Option<&ContentConfig> {
        self.contents.get(&content_type)
    }
}

/// Defaults overlaid with one organisation's document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganisationConfig {
    pub code: String,
    pub contents: BTreeMap<ContentType, ContentConfig>,
}

impl OrganisationConfig {
    pub fn content(&self, content_type: ContentType) -> Option<&ContentConfig> {
        self.contents.get(&content_type)
    }

    pub fn content_types(&self) -> impl Iterator<Item = ContentType> + '_ {
        self.contents.keys().copied()
    }
}
