// src/config.rs

//! Content configuration loading.
//!
//! `content.yml` holds the defaults for every content type. Each
//! `<organisation>.yml` is overlaid onto a clone of those defaults:
//!
//! - scalars replace when present
//! - `output`, `pages`, `teasers` and `articles` replace wholesale
//! - static `fields` merge key by key
//! - `summary` and `loading` merge setting by setting
//!
//! Pages and bundles are compiled against their section's `source` and
//! `loading`. An organisation that changes either recompiles the pages and
//! bundles it inherits from `content.yml`, so inherited selectors pick up
//! its source and inherited per-page loading is layered on its settings.
//!
//! Legacy `teaser-fields`/`article-fields` lists (with `teaser-loading` and
//! `article-loading`) are converted into the `teasers`/`articles` form. When
//! both forms are present the canonical one wins.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::error::{AppError, Result};
use crate::feed::template;
use crate::models::{
    ArticleConfig, ConfigDefaults, ContentConfig, ContentField, ContentFields, ContentType,
    FieldExtractor, FieldFilter, FieldName, FieldSelector, FilterScope, LoadingConfig, MatchMode,
    OrganisationConfig, OutputColumns, PageConfig, Pattern, SelectorSource, SummaryConfig, TextCase,
};

/// File holding the configuration defaults.
pub const DEFAULTS_FILE: &str = "content.yml";

const YAML_EXTENSION: &str = "yml";

/// Loads `content.yml` once and caches each organisation's configuration.
pub struct ConfigRegistry {
    directory: PathBuf,
    defaults: OnceLock<Arc<ConfigDefaults>>,
    organisations: Mutex<HashMap<String, Arc<OrganisationConfig>>>,
}

impl ConfigRegistry {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            defaults: OnceLock::new(),
            organisations: Mutex::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Load `content.yml`. Later calls return the cached defaults.
    pub fn load_defaults(&self) -> Result<Arc<ConfigDefaults>> {
        if let Some(defaults) = self.defaults.get() {
            return Ok(Arc::clone(defaults));
        }
        let path = self.directory.join(DEFAULTS_FILE);
        let yaml = fs::read_to_string(&path)
            .map_err(|e| AppError::config(format!("cannot read {path:?}: {e}")))?;
        let parsed = Arc::new(parse_defaults(&yaml)?);
        log::info!(
            "Loaded configuration defaults for {} content types from {:?}",
            parsed.contents.len(),
            path
        );
        Ok(Arc::clone(self.defaults.get_or_init(|| parsed)))
    }

    /// Defaults loaded by [`ConfigRegistry::load_defaults`].
    pub fn defaults(&self) -> Result<Arc<ConfigDefaults>> {
        self.defaults
            .get()
            .cloned()
            .ok_or_else(|| AppError::DefaultsNotInitialized(DEFAULTS_FILE.to_string()))
    }

    /// Configuration for `code`, parsed on first request.
    ///
    /// An organisation without its own file gets the defaults unchanged.
    pub fn organisation(&self, code: &str) -> Result<Arc<OrganisationConfig>> {
        let defaults = self.defaults()?;
        let mut cache = self
            .organisations
            .lock()
            .map_err(|_| AppError::config("organisation cache poisoned"))?;
        if let Some(config) = cache.get(code) {
            return Ok(Arc::clone(config));
        }

        let path = self.directory.join(format!("{code}.{YAML_EXTENSION}"));
        let config = match fs::read_to_string(&path) {
            Ok(yaml) => parse_organisation(code, &yaml, &defaults)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No configuration file for '{code}', using defaults");
                OrganisationConfig {
                    code: code.to_string(),
                    contents: defaults.contents.clone(),
                }
            }
            Err(e) => return Err(AppError::Io(e)),
        };
        let config = Arc::new(config);
        cache.insert(code.to_string(), Arc::clone(&config));
        Ok(config)
    }

    /// Codes of every organisation with a configuration file.
    pub fn organisation_codes(&self) -> Result<Vec<String>> {
        let mut codes = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(YAML_EXTENSION) {
                continue;
            }
            if path.file_name().and_then(|n| n.to_str()) == Some(DEFAULTS_FILE) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                codes.push(stem.to_string());
            }
        }
        codes.sort();
        Ok(codes)
    }
}

/// Parse `content.yml`.
pub fn parse_defaults(yaml: &str) -> Result<ConfigDefaults> {
    let mut contents = BTreeMap::new();
    for (content_type, raw) in parse_document(yaml)? {
        let mut config = ContentConfig::new(content_type);
        overlay(&mut config, raw)?;
        contents.insert(content_type, config);
    }
    Ok(ConfigDefaults {
        contents,
        document: yaml.to_string(),
    })
}

/// Parse an organisation document over a copy of `defaults`.
pub fn parse_organisation(
    code: &str,
    yaml: &str,
    defaults: &ConfigDefaults,
) -> Result<OrganisationConfig> {
    let mut contents = defaults.contents.clone();
    let mut inherited: Option<BTreeMap<ContentType, RawContent>> = None;
    for (content_type, mut raw) in parse_document(yaml)? {
        if raw.source.is_some() || raw.loading.is_some() {
            if inherited.is_none() {
                inherited = Some(parse_document(&defaults.document)?.into_iter().collect());
            }
            if let Some(base) = inherited.as_mut().and_then(|s| s.remove(&content_type)) {
                raw.inherit_compiled(base);
            }
        }
        let config = contents
            .entry(content_type)
            .or_insert_with(|| ContentConfig::new(content_type));
        overlay(config, raw).map_err(|e| AppError::config(format!("{code}: {e}")))?;
    }
    Ok(OrganisationConfig {
        code: code.to_string(),
        contents,
    })
}

/// Check one content configuration for output problems.
pub fn validate(config: &ContentConfig) -> Result<()> {
    if config.output.is_empty() {
        return Ok(());
    }
    if config.filename.trim().is_empty() {
        return Err(AppError::validation(format!(
            "{}: output is configured but filename is empty",
            config.content_type
        )));
    }
    for (header, value) in config.output.iter() {
        for name in template::placeholders(value) {
            if name.parse::<FieldName>().is_err() {
                return Err(AppError::validation(format!(
                    "{}: column '{header}' uses unknown field '{name}'",
                    config.content_type
                )));
            }
        }
    }
    Ok(())
}

/// Split a document into its content-type sections.
fn parse_document(yaml: &str) -> Result<Vec<(ContentType, RawContent)>> {
    let mapping = match serde_yaml::from_str::<Value>(yaml)? {
        Value::Null => Mapping::new(),
        Value::Mapping(mapping) => mapping,
        _ => return Err(AppError::config("configuration document must be a mapping")),
    };

    let mut sections = Vec::new();
    for (key, value) in mapping {
        let Some(key) = key.as_str() else {
            continue;
        };
        let Some(content_type) = ContentType::from_key(key) else {
            log::debug!("Ignoring unknown configuration key '{key}'");
            continue;
        };
        let raw = if value.is_null() {
            RawContent::default()
        } else {
            serde_yaml::from_value(value).map_err(|e| AppError::config(format!("{key}: {e}")))?
        };
        sections.push((content_type, raw));
    }
    Ok(sections)
}

fn overlay(config: &mut ContentConfig, raw: RawContent) -> Result<()> {
    if let Some(filename) = raw.filename {
        config.filename = filename;
    }
    if let Some(sheet) = raw.sheet {
        config.sheet = sheet;
    }
    if let Some(source) = raw.source {
        config.source = source;
    }
    if let Some(pattern) = raw.date_pattern {
        config.default_date_pattern = Some(pattern);
    }
    if let Some(trailing_slash) = raw.trailing_slash {
        config.trailing_slash = trailing_slash;
    }
    if let Some(summary) = raw.summary {
        summary.apply(&mut config.summary);
    }
    if let Some(output) = raw.output {
        config.output = output_columns(output)?;
    }
    if let Some(html_fields) = raw.html_fields {
        config.html_fields = html_fields.into_vec();
    }
    if let Some(fields) = raw.fields {
        for (key, value) in fields {
            let Ok(name) = key.parse::<FieldName>() else {
                log::debug!("Ignoring unknown static field '{key}'");
                continue;
            };
            config.fields.values.set(name, scalar(&key, value)?);
        }
    }
    if let Some(loading) = raw.loading {
        loading.apply(&mut config.loading);
    }
    if let Some(pages) = raw.pages {
        config.pages = pages
            .into_iter()
            .map(|page| page.compile(&config.loading))
            .collect();
    }

    let teasers = raw.teasers.or_else(|| legacy(raw.teaser_fields, raw.teaser_loading));
    if let Some(teasers) = teasers {
        config.teasers = teasers.compile(config.source, &config.loading)?;
    }
    let articles = raw.articles.or_else(|| legacy(raw.article_fields, raw.article_loading));
    if let Some(articles) = articles {
        config.articles = articles.compile(config.source, &config.loading)?;
    }
    Ok(())
}

fn legacy(fields: Option<Vec<RawBundle>>, loading: Option<RawLoading>) -> Option<RawArticle> {
    if fields.is_none() && loading.is_none() {
        return None;
    }
    Some(RawArticle::Spec(RawArticleSpec { loading, fields }))
}

fn output_columns(mapping: Mapping) -> Result<OutputColumns> {
    let mut columns = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let header = match key {
            Value::String(s) => s,
            other => scalar("output", other)?,
        };
        let template = scalar(&header, value)?;
        columns.push((header, template));
    }
    Ok(OutputColumns::new(columns))
}

fn scalar(key: &str, value: Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s),
        _ => Err(AppError::config(format!("'{key}' must be a scalar value"))),
    }
}

// Raw document layer. Every key is optional so that an overlay can tell
// "absent" from "set".

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawContent {
    filename: Option<String>,
    sheet: Option<String>,
    source: Option<SelectorSource>,
    #[serde(alias = "default-date-pattern")]
    date_pattern: Option<String>,
    trailing_slash: Option<bool>,
    summary: Option<RawSummary>,
    output: Option<Mapping>,
    html_fields: Option<OneOrMany<String>>,
    fields: Option<BTreeMap<String, Value>>,
    pages: Option<Vec<RawPage>>,
    loading: Option<RawLoading>,
    teasers: Option<RawArticle>,
    articles: Option<RawArticle>,
    teaser_fields: Option<Vec<RawBundle>>,
    article_fields: Option<Vec<RawBundle>>,
    teaser_loading: Option<RawLoading>,
    article_loading: Option<RawLoading>,
}

impl RawContent {
    /// Take the sections compiled against `source` and `loading` from
    /// `base` where this document does not set its own.
    fn inherit_compiled(&mut self, base: RawContent) {
        if self.pages.is_none() {
            self.pages = base.pages;
        }
        let own_teasers = self.teasers.is_some()
            || self.teaser_fields.is_some()
            || self.teaser_loading.is_some();
        if !own_teasers {
            self.teasers = base.teasers;
            self.teaser_fields = base.teaser_fields;
            self.teaser_loading = base.teaser_loading;
        }
        let own_articles = self.articles.is_some()
            || self.article_fields.is_some()
            || self.article_loading.is_some();
        if !own_articles {
            self.articles = base.articles;
            self.article_fields = base.article_fields;
            self.article_loading = base.article_loading;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawSummary {
    max_length: Option<usize>,
    min_length: Option<usize>,
    min_paragraph: Option<usize>,
}

impl RawSummary {
    fn apply(self, summary: &mut SummaryConfig) {
        if let Some(v) = self.max_length {
            summary.max_length = v;
        }
        if let Some(v) = self.min_length {
            summary.min_length = v;
        }
        if let Some(v) = self.min_paragraph {
            summary.min_paragraph = v;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawLoading {
    #[serde(alias = "wait-ms")]
    wait: Option<u64>,
    scroll: Option<bool>,
    #[serde(alias = "selector")]
    selectors: Option<OneOrMany<String>>,
    #[serde(alias = "keyword")]
    keywords: Option<OneOrMany<String>>,
    anti_cache: Option<bool>,
}

impl RawLoading {
    fn apply(self, loading: &mut LoadingConfig) {
        if let Some(v) = self.wait {
            loading.wait_ms = v;
        }
        if let Some(v) = self.scroll {
            loading.scroll = v;
        }
        if let Some(v) = self.selectors {
            loading.selectors = v.into_vec();
        }
        if let Some(v) = self.keywords {
            loading.keywords = v.into_vec();
        }
        if let Some(v) = self.anti_cache {
            loading.anti_cache = v;
        }
    }

    fn over(self, base: &LoadingConfig) -> LoadingConfig {
        let mut loading = base.clone();
        self.apply(&mut loading);
        loading
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPage {
    Url(String),
    Spec {
        url: String,
        loading: Option<RawLoading>,
    },
}

impl RawPage {
    fn compile(self, shared: &LoadingConfig) -> PageConfig {
        match self {
            RawPage::Url(url) => PageConfig { url, loading: None },
            RawPage::Spec { url, loading } => PageConfig {
                url,
                loading: loading.map(|l| l.over(shared)),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawArticle {
    Bundles(Vec<RawBundle>),
    Spec(RawArticleSpec),
}

#[derive(Debug, Default, Deserialize)]
struct RawArticleSpec {
    loading: Option<RawLoading>,
    fields: Option<Vec<RawBundle>>,
}

impl RawArticle {
    fn compile(self, source: SelectorSource, shared: &LoadingConfig) -> Result<ArticleConfig> {
        let spec = match self {
            RawArticle::Bundles(fields) => RawArticleSpec {
                loading: None,
                fields: Some(fields),
            },
            RawArticle::Spec(spec) => spec,
        };
        let fields = spec
            .fields
            .unwrap_or_default()
            .into_iter()
            .map(|bundle| bundle.compile(source))
            .collect::<Result<Vec<_>>>()?;
        Ok(ArticleConfig {
            loading: spec.loading.map(|l| l.over(shared)),
            fields,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawBundle {
    root: Option<RawSelector>,
    validator: Option<RawSelector>,
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

impl RawBundle {
    fn compile(self, source: SelectorSource) -> Result<ContentFields> {
        let mut bundle = ContentFields {
            root: self
                .root
                .map(|s| s.compile("root", SelectorSource::Page))
                .transpose()?,
            validator: self
                .validator
                .map(|s| s.compile("validator", SelectorSource::Page))
                .transpose()?,
            fields: BTreeMap::new(),
        };
        for (key, value) in self.fields {
            let Ok(name) = key.parse::<FieldName>() else {
                log::debug!("Ignoring unknown field rule '{key}'");
                continue;
            };
            let raw: RawField = serde_yaml::from_value(value)
                .map_err(|e| AppError::config(format!("field '{key}': {e}")))?;
            bundle.insert(raw.compile(name, source)?);
        }
        Ok(bundle)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawField {
    Expression(String),
    Selectors(Vec<RawSelector>),
    Spec(Box<RawFieldSpec>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawFieldSpec {
    // Inline selector
    #[serde(alias = "selector", alias = "css", alias = "key")]
    expression: Option<String>,
    source: Option<SelectorSource>,
    #[serde(alias = "attr")]
    attribute: Option<String>,
    multiple: Option<bool>,
    separator: Option<String>,
    #[serde(alias = "exclude")]
    excludes: Option<OneOrMany<String>>,
    stop: Option<String>,

    selectors: Option<Vec<RawSelector>>,
    #[serde(alias = "extractor")]
    extractors: Option<OneOrMany<RawExtractor>>,
    #[serde(alias = "filter")]
    filters: Option<OneOrMany<RawFilter>>,
    #[serde(alias = "date-pattern")]
    date_patterns: Option<OneOrMany<String>>,
    case: Option<TextCase>,
    remove_parameters: Option<bool>,
    generate: Option<bool>,
}

impl RawField {
    fn compile(self, name: FieldName, source: SelectorSource) -> Result<ContentField> {
        let key = name.as_str();
        let mut field = ContentField::new(name);
        let spec = match self {
            RawField::Expression(expression) => {
                return Ok(field.selector(FieldSelector::with_source(key, source, &expression)?));
            }
            RawField::Selectors(selectors) => {
                for selector in selectors {
                    field.selectors.push(selector.compile(key, source)?);
                }
                return Ok(field);
            }
            RawField::Spec(spec) => *spec,
        };

        if let Some(expression) = spec.expression {
            let inline = RawSelectorSpec {
                source: spec.source,
                expression,
                attribute: spec.attribute,
                multiple: spec.multiple,
                separator: spec.separator,
                excludes: spec.excludes,
                stop: spec.stop,
            };
            field.selectors.push(inline.compile(key, source)?);
        }
        for selector in spec.selectors.unwrap_or_default() {
            field.selectors.push(selector.compile(key, source)?);
        }
        for extractor in spec.extractors.map(OneOrMany::into_vec).unwrap_or_default() {
            field.extractors.push(extractor.compile()?);
        }
        for filter in spec.filters.map(OneOrMany::into_vec).unwrap_or_default() {
            field.filters.push(filter.compile()?);
        }
        field.date_patterns = spec
            .date_patterns
            .map(OneOrMany::into_vec)
            .unwrap_or_default();
        field.case = spec.case.unwrap_or_default();
        field.remove_parameters = spec.remove_parameters.unwrap_or(false);
        field.generate = spec.generate.unwrap_or(false);
        Ok(field)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSelector {
    Expression(String),
    Spec(RawSelectorSpec),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawSelectorSpec {
    source: Option<SelectorSource>,
    #[serde(alias = "selector", alias = "css", alias = "key")]
    expression: String,
    #[serde(alias = "attr")]
    attribute: Option<String>,
    multiple: Option<bool>,
    separator: Option<String>,
    #[serde(alias = "exclude")]
    excludes: Option<OneOrMany<String>>,
    stop: Option<String>,
}

impl RawSelector {
    fn compile(self, field: &str, source: SelectorSource) -> Result<FieldSelector> {
        match self {
            RawSelector::Expression(expression) => {
                FieldSelector::with_source(field, source, &expression)
            }
            RawSelector::Spec(spec) => spec.compile(field, source),
        }
    }
}

impl RawSelectorSpec {
    fn compile(self, field: &str, source: SelectorSource) -> Result<FieldSelector> {
        let mut selector =
            FieldSelector::with_source(field, self.source.unwrap_or(source), &self.expression)?;
        if let Some(attribute) = self.attribute {
            selector = selector.attribute(attribute);
        }
        if let Some(multiple) = self.multiple {
            selector = selector.multiple(multiple);
        }
        if let Some(separator) = self.separator {
            selector = selector.separator(separator);
        }
        for rule in self.excludes.map(OneOrMany::into_vec).unwrap_or_default() {
            selector = selector.exclude(rule.parse()?);
        }
        if let Some(stop) = self.stop {
            selector = selector.stop_at(Pattern::new(&stop)?);
        }
        Ok(selector)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawExtractor {
    Expression(String),
    Spec {
        #[serde(alias = "regex", alias = "pattern")]
        expression: String,
        format: Option<String>,
        #[serde(rename = "match", alias = "mode")]
        mode: Option<MatchMode>,
    },
}

impl RawExtractor {
    fn compile(self) -> Result<FieldExtractor> {
        match self {
            RawExtractor::Expression(expression) => Ok(FieldExtractor::new(
                Pattern::new(&expression)?,
                None,
                MatchMode::First,
            )),
            RawExtractor::Spec {
                expression,
                format,
                mode,
            } => Ok(FieldExtractor::new(
                Pattern::new(&expression)?,
                format,
                mode.unwrap_or_default(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFilter {
    Expression(String),
    Spec {
        #[serde(alias = "regex", alias = "pattern")]
        expression: String,
        scope: Option<FilterScope>,
        stop: Option<bool>,
    },
}

impl RawFilter {
    fn compile(self) -> Result<FieldFilter> {
        match self {
            RawFilter::Expression(expression) => Ok(FieldFilter::new(
                Pattern::new(&expression)?,
                FilterScope::All,
                false,
            )),
            RawFilter::Spec {
                expression,
                scope,
                stop,
            } => Ok(FieldFilter::new(
                Pattern::new(&expression)?,
                scope.unwrap_or_default(),
                stop.unwrap_or(false),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: &str = r#"
post:
  filename: posts.csv
  sheet: Posts
  date-pattern: "%d %B %Y"
  summary:
    max-length: 200
  output:
    ID: "${id}"
    Title: "${title}"
    Date: "${pubdate}"
  fields:
    category: News
    tags: general
  loading:
    wait: 500
  articles:
    fields:
      - title: "h1"
        body:
          selector: "div.content p"
          exclude: ["div.ad", "span"]
        published-date:
          selectors: ["time"]
          date-patterns: ["%Y-%m-%d", "%d/%m/%Y"]
video:
  filename: videos.csv
unknown-section:
  anything: 1
"#;

    fn defaults() -> ConfigDefaults {
        parse_defaults(DEFAULTS).unwrap()
    }

    #[test]
    fn test_parse_defaults() {
        let defaults = defaults();
        assert_eq!(defaults.contents.len(), 2);

        let post = defaults.content(ContentType::Post).unwrap();
        assert_eq!(post.filename, "posts.csv");
        assert_eq!(post.default_date_pattern.as_deref(), Some("%d %B %Y"));
        assert_eq!(post.summary.max_length, 200);
        assert_eq!(post.summary.min_length, SummaryConfig::default().min_length);
        assert_eq!(post.output.headers(), vec!["ID", "Title", "Date"]);
        assert_eq!(post.loading.wait_ms, 500);

        let bundle = &post.articles.fields[0];
        let body = bundle.get(FieldName::Body).unwrap();
        assert!(body.selectors[0].multiple);
        assert_eq!(body.selectors[0].excludes.len(), 2);
        let date = bundle.get(FieldName::PublishedDate).unwrap();
        assert_eq!(date.date_patterns, vec!["%Y-%m-%d", "%d/%m/%Y"]);
        assert!(!bundle.get(FieldName::Title).unwrap().selectors[0].multiple);
    }

    #[test]
    fn test_overlay_semantics() {
        let org = r#"
post:
  filename: acme-posts.csv
  trailing-slash: true
  summary:
    min-length: 20
  output:
    Title: "${title}"
  fields:
    category: Tech
  loading:
    scroll: true
  pages:
    - https://acme.org/blog
    - url: https://acme.org/news
      loading:
        anti-cache: true
"#;
        let config = parse_organisation("acme", org, &defaults()).unwrap();
        let post = config.content(ContentType::Post).unwrap();

        assert_eq!(post.filename, "acme-posts.csv");
        assert_eq!(post.sheet, "Posts");
        assert!(post.trailing_slash);
        assert_eq!(post.summary.max_length, 200);
        assert_eq!(post.summary.min_length, 20);
        assert_eq!(post.output.headers(), vec!["Title"]);
        assert_eq!(post.fields.values.value(FieldName::Category), "Tech");
        assert_eq!(post.fields.values.value(FieldName::Tags), "general");
        assert_eq!(post.loading.wait_ms, 500);
        assert!(post.loading.scroll);
        assert_eq!(post.pages.len(), 2);
        let page_loading = post.pages[1].loading.as_ref().unwrap();
        assert!(page_loading.anti_cache);
        assert_eq!(page_loading.wait_ms, 500);
        // inherited untouched
        assert!(post.articles.is_configured());
        assert!(config.content(ContentType::Video).is_some());
    }

    #[test]
    fn test_inherited_sections_follow_overridden_source_and_loading() {
        let defaults = r#"
post:
  source: page
  loading:
    wait: 500
  pages:
    - url: https://example.org/news
      loading:
        scroll: true
  teasers:
    loading:
      anti-cache: true
    fields:
      - title: "h2"
        url: { source: page, selector: "a", attr: href }
"#;
        let org = r#"
post:
  source: store
  loading:
    keywords: [rust]
"#;
        let defaults = parse_defaults(defaults).unwrap();
        let config = parse_organisation("acme", org, &defaults).unwrap();
        let post = config.content(ContentType::Post).unwrap();

        let bundle = &post.teasers.fields[0];
        let title = bundle.get(FieldName::Title).unwrap();
        assert_eq!(title.selectors[0].source, SelectorSource::Store);
        let url = bundle.get(FieldName::Url).unwrap();
        assert_eq!(url.selectors[0].source, SelectorSource::Page);

        let teaser_loading = post.teaser_loading();
        assert!(teaser_loading.anti_cache);
        assert_eq!(teaser_loading.keywords, vec!["rust"]);
        assert_eq!(teaser_loading.wait_ms, 500);
        let page_loading = post.pages[0].loading.as_ref().unwrap();
        assert!(page_loading.scroll);
        assert_eq!(page_loading.keywords, vec!["rust"]);

        let default_post = defaults.content(ContentType::Post).unwrap();
        let default_title = default_post.teasers.fields[0].get(FieldName::Title).unwrap();
        assert_eq!(default_title.selectors[0].source, SelectorSource::Page);
    }

    #[test]
    fn test_overlay_does_not_touch_defaults() {
        let defaults = defaults();
        let before = defaults.clone();
        parse_organisation("acme", "post:\n  filename: other.csv\n", &defaults).unwrap();
        assert_eq!(defaults, before);
    }

    #[test]
    fn test_legacy_fields_equivalent_to_canonical() {
        let legacy = r#"
event:
  teaser-fields:
    - root: "li.event"
      title: "h3"
      url: { selector: "a", attr: href }
  teaser-loading:
    scroll: true
"#;
        let canonical = r#"
event:
  teasers:
    loading:
      scroll: true
    fields:
      - root: "li.event"
        title: "h3"
        url: { selector: "a", attr: href }
"#;
        let defaults = ConfigDefaults::default();
        let a = parse_organisation("acme", legacy, &defaults).unwrap();
        let b = parse_organisation("acme", canonical, &defaults).unwrap();
        assert_eq!(a, b);
        let event = a.content(ContentType::Event).unwrap();
        assert!(event.teasers.fields[0].root.is_some());
        assert!(event.teaser_loading().scroll);
    }

    #[test]
    fn test_canonical_wins_over_legacy() {
        let both = r#"
tool:
  articles:
    - title: "h1.canonical"
  article-fields:
    - title: "h1.legacy"
"#;
        let config = parse_organisation("acme", both, &ConfigDefaults::default()).unwrap();
        let tool = config.content(ContentType::Tool).unwrap();
        let title = tool.articles.fields[0].get(FieldName::Title).unwrap();
        assert_eq!(title.selectors[0].expression.as_str(), "h1.canonical");
    }

    #[test]
    fn test_full_field_spec() {
        let yaml = r#"
roundup:
  source: store
  articles:
    - author:
        key: "author"
        extractor: "By (.+)"
        filters:
          - "Staff"
          - { expression: "Advert", stop: true, scope: article }
        case: title
      url:
        selectors:
          - { source: page, selector: "link[rel=canonical]", attr: href }
        remove-parameters: true
      location:
        generate: true
"#;
        let config = parse_organisation("acme", yaml, &ConfigDefaults::default()).unwrap();
        let roundup = config.content(ContentType::Roundup).unwrap();
        let bundle = &roundup.articles.fields[0];

        let author = bundle.get(FieldName::Author).unwrap();
        assert_eq!(author.selectors[0].source, SelectorSource::Store);
        assert_eq!(author.extractors.len(), 1);
        assert_eq!(author.filters.len(), 2);
        assert!(author.filters[1].stop);
        assert_eq!(author.filters[1].scope, FilterScope::Article);
        assert_eq!(author.case, TextCase::Title);

        let url = bundle.get(FieldName::Url).unwrap();
        assert_eq!(url.selectors[0].source, SelectorSource::Page);
        assert_eq!(url.selectors[0].attribute.as_deref(), Some("href"));
        assert!(url.remove_parameters);

        let location = bundle.get(FieldName::Location).unwrap();
        assert!(location.generate);
        assert!(!location.has_selectors());
    }

    #[test]
    fn test_invalid_selector_is_config_error() {
        let yaml = "post:\n  articles:\n    - title: \"[[\"\n";
        assert!(parse_organisation("acme", yaml, &ConfigDefaults::default()).is_err());
    }

    #[test]
    fn test_validate_output() {
        let defaults = defaults();
        assert!(validate(defaults.content(ContentType::Post).unwrap()).is_ok());

        let mut config = defaults.content(ContentType::Post).unwrap().clone();
        config.output = OutputColumns::new(vec![("X".into(), "${nonsense}".into())]);
        assert!(validate(&config).is_err());

        config.output = OutputColumns::new(vec![("X".into(), "${title}".into())]);
        config.filename.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_registry_requires_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConfigRegistry::new(dir.path());
        assert!(matches!(
            registry.organisation("acme"),
            Err(AppError::DefaultsNotInitialized(_))
        ));
        assert!(matches!(
            registry.defaults(),
            Err(AppError::DefaultsNotInitialized(_))
        ));
    }

    #[test]
    fn test_registry_loads_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DEFAULTS_FILE), DEFAULTS).unwrap();
        fs::write(dir.path().join("acme.yml"), "post:\n  filename: acme.csv\n").unwrap();

        let registry = ConfigRegistry::new(dir.path());
        let first = registry.load_defaults().unwrap();
        let second = registry.load_defaults().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let acme = registry.organisation("acme").unwrap();
        assert_eq!(acme.content(ContentType::Post).unwrap().filename, "acme.csv");
        assert!(Arc::ptr_eq(&acme, &registry.organisation("acme").unwrap()));

        let other = registry.organisation("other").unwrap();
        assert_eq!(other.content(ContentType::Post).unwrap().filename, "posts.csv");

        assert_eq!(registry.organisation_codes().unwrap(), vec!["acme"]);
    }
}
