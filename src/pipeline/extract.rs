// src/pipeline/extract.rs

//! Extraction pipeline: fetch listing or article pages and turn them into
//! records ready for the content store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::Client;

use crate::config::ConfigRegistry;
use crate::error::{AppError, Result};
use crate::models::{ContentConfig, ContentType, FieldName, LoadingConfig, Settings};
use crate::services::{ContentExtractor, ExtractedRecord, Page, summary};
use crate::utils::http::{create_async_client, fetch_text};
use crate::utils::url::resolve;

/// Records extracted for one organisation and content type.
#[derive(Debug, Default)]
pub struct ExtractOutcome {
    pub records: Vec<ExtractedRecord>,
    pub page_total: usize,
    pub page_failures: usize,
    /// Records dropped by a STOP filter or the keyword list
    pub dropped: usize,
}

/// Build a [`Page`] from fetched HTML, with `<meta>` values as its store.
pub fn load_page(url: &str, html: &str) -> Page {
    let page = Page::parse(url, html);
    let store = Page::meta_store(&page.html);
    page.with_store(store)
}

/// Post-process an extracted record.
///
/// Returns `None` when the record was stopped or its title carries none of
/// the configured keywords.
pub fn finish_record(
    mut record: ExtractedRecord,
    config: &ContentConfig,
    loading: &LoadingConfig,
    page_url: &str,
) -> Option<ExtractedRecord> {
    if record.stopped {
        return None;
    }
    if !loading.accepts(record.title()) {
        log::debug!("Dropping '{}': no keyword matched", record.title());
        return None;
    }

    for name in [FieldName::Url, FieldName::Image] {
        let value = record.fields.value(name);
        if !value.is_empty() {
            let absolute = resolve(page_url, value);
            record.fields.set(name, absolute);
        }
    }

    if !record.fields.is_filled(FieldName::Summary) {
        let body = record.fields.value(FieldName::Body);
        if !body.is_empty() {
            let derived = summary::derive(body, &config.summary);
            record.fields.set(FieldName::Summary, derived);
        }
    }
    Some(record)
}

/// Teaser records of one listing page's HTML.
pub fn extract_teasers(
    code: &str,
    config: &ContentConfig,
    loading: &LoadingConfig,
    url: &str,
    html: &str,
) -> (Vec<ExtractedRecord>, usize) {
    let page = load_page(url, html);
    let extracted = ContentExtractor::new(code, config).teasers(&page);
    let total = extracted.len();
    let records: Vec<_> = extracted
        .into_iter()
        .filter_map(|record| finish_record(record, config, loading, url))
        .collect();
    let dropped = total - records.len();
    (records, dropped)
}

/// Article record of one detail page's HTML.
pub fn extract_article(
    code: &str,
    config: &ContentConfig,
    url: &str,
    html: &str,
) -> Option<ExtractedRecord> {
    let page = load_page(url, html);
    let record = ContentExtractor::new(code, config).article(&page)?;
    finish_record(record, config, config.article_loading(), url)
}

/// Crawls the configured listing pages of an organisation.
pub struct Extractor {
    settings: Arc<Settings>,
    client: Client,
}

impl Extractor {
    pub fn new(settings: Arc<Settings>) -> Result<Self> {
        let client = create_async_client(&settings.crawler)?;
        Ok(Self { settings, client })
    }

    async fn fetch(&self, url: &str, loading: &LoadingConfig) -> Result<String> {
        let url = loading.page_url(url, Utc::now().timestamp());
        log::debug!("Fetching {}", url);
        fetch_text(&self.client, &url).await
    }

    /// Fetch every listing page of `code`'s `content_type` configuration and
    /// extract its teasers.
    pub async fn teasers(
        &self,
        registry: &ConfigRegistry,
        code: &str,
        content_type: ContentType,
    ) -> Result<ExtractOutcome> {
        let organisation = registry.organisation(code)?;
        let config = organisation.content(content_type).ok_or_else(|| {
            AppError::config(format!("{code}: no {content_type} configuration"))
        })?;
        if !config.teasers.is_configured() {
            return Err(AppError::config(format!(
                "{code}: no teaser fields configured for {content_type}"
            )));
        }

        let delay = Duration::from_millis(self.settings.crawler.request_delay_ms);
        let concurrency = self.settings.crawler.max_concurrent.max(1);

        let mut outcome = ExtractOutcome {
            page_total: config.pages.len(),
            ..ExtractOutcome::default()
        };

        let mut pages = stream::iter(&config.pages)
            .map(|page| async move {
                let loading = page.loading.as_ref().unwrap_or(config.teaser_loading());
                let result = self.fetch(&page.url, loading).await;
                (page, loading, result)
            })
            .buffered(concurrency);

        while let Some((page, loading, result)) = pages.next().await {
            match result {
                Ok(html) => {
                    let (records, dropped) =
                        extract_teasers(code, config, loading, &page.url, &html);
                    log::info!("{}: {} teasers from {}", code, records.len(), page.url);
                    outcome.records.extend(records);
                    outcome.dropped += dropped;
                }
                Err(error) => {
                    outcome.page_failures += 1;
                    log::warn!("{}: failed to fetch {}: {}", code, page.url, error);
                }
            }

            if delay.as_millis() > 0 {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(outcome)
    }

    /// Fetch one article page and extract its record.
    pub async fn article(
        &self,
        registry: &ConfigRegistry,
        code: &str,
        content_type: ContentType,
        url: &str,
    ) -> Result<Option<ExtractedRecord>> {
        let organisation = registry.organisation(code)?;
        let config = organisation.content(content_type).ok_or_else(|| {
            AppError::config(format!("{code}: no {content_type} configuration"))
        })?;
        let html = self.fetch(url, config.article_loading()).await?;
        Ok(extract_article(code, config, url, &html))
    }
}
