//! Bundle-level extraction: validator gating, root scoping and records.

use scraper::ElementRef;

use crate::models::{ArticleConfig, ContentConfig, ContentFields, FieldName, Fields, FilterScope};
use crate::services::evaluator::{DocumentContext, FieldEvaluator, FieldOutcome, Page};

/// Fields scraped for one teaser or article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedRecord {
    pub fields: Fields,
    /// A STOP filter matched; the record must not be published
    pub stopped: bool,
    /// Recoverable extraction errors, already logged
    pub errors: Vec<String>,
}

/// Applies one content type's teaser and article rules to pages.
pub struct ContentExtractor<'a> {
    organisation: &'a str,
    config: &'a ContentConfig,
}

impl<'a> ContentExtractor<'a> {
    pub fn new(organisation: &'a str, config: &'a ContentConfig) -> Self {
        Self {
            organisation,
            config,
        }
    }

    /// One record per teaser on a listing page.
    pub fn teasers(&self, page: &Page) -> Vec<ExtractedRecord> {
        self.extract(&self.config.teasers, page, FilterScope::Teaser)
    }

    /// The article record of a detail page.
    pub fn article(&self, page: &Page) -> Option<ExtractedRecord> {
        self.extract(&self.config.articles, page, FilterScope::Article)
            .into_iter()
            .next()
    }

    fn extract(
        &self,
        rules: &ArticleConfig,
        page: &Page,
        scope: FilterScope,
    ) -> Vec<ExtractedRecord> {
        let Some(bundle) = self.select_bundle(rules, page) else {
            log::debug!(
                "{}: no {:?} bundle applies to {}",
                self.organisation,
                scope,
                page.url
            );
            return Vec::new();
        };

        let evaluator = FieldEvaluator::new(scope)
            .default_date_pattern(self.config.default_date_pattern.clone());

        match bundle.root.as_ref().and_then(|root| root.css()) {
            Some(root) => page
                .html
                .select(root)
                .map(|element: ElementRef<'_>| {
                    self.record(bundle, &evaluator, &DocumentContext::scoped(page, element))
                })
                .collect(),
            None => vec![self.record(bundle, &evaluator, &DocumentContext::new(page))],
        }
    }

    /// First configured bundle whose validator matches.
    fn select_bundle<'r>(
        &self,
        rules: &'r ArticleConfig,
        page: &Page,
    ) -> Option<&'r ContentFields> {
        let context = DocumentContext::new(page);
        rules.fields.iter().find(|bundle| {
            bundle.is_configured()
                && bundle
                    .validator
                    .as_ref()
                    .is_none_or(|validator| context.matches(validator))
        })
    }

    fn record(
        &self,
        bundle: &ContentFields,
        evaluator: &FieldEvaluator,
        context: &DocumentContext<'_>,
    ) -> ExtractedRecord {
        let mut record = ExtractedRecord::default();
        for (name, field) in &bundle.fields {
            match evaluator.evaluate(field, context) {
                Ok(FieldOutcome::Stopped) => {
                    log::debug!("{}: field '{}' stopped the record", self.organisation, name);
                    record.stopped = true;
                    break;
                }
                Ok(outcome) => {
                    if let Some(value) = outcome.first() {
                        record.fields.set(*name, value);
                    }
                }
                Err(e) => {
                    log::warn!("{}: {}", self.organisation, e);
                    record.errors.push(e.to_string());
                }
            }
        }
        record
    }
}

impl ExtractedRecord {
    pub fn title(&self) -> &str {
        self.fields.value(FieldName::Title)
    }
}
