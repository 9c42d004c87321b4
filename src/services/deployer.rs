// src/services/deployer.rs

//! Content deployment: status transitions and output record enrichment.

use crate::config::ConfigRegistry;
use crate::error::Result;
use crate::models::{
    ContentItem, ContentStatus, ContentType, Environment, FieldName, FieldSource, Fields,
    FieldsConfig,
};
use crate::storage::{ContentStore, ImageProvider, OrganisationDirectory};
use crate::utils::url::{ensure_trailing_slash, is_absolute};

/// Image fields rewritten against the environment's image base URL.
const IMAGE_FIELDS: [FieldName; 3] = [FieldName::Image, FieldName::Thumbnail, FieldName::Logo];

/// Rows produced by a deploy run.
#[derive(Debug, Default)]
pub struct DeployOutcome {
    pub rows: Vec<Fields>,
    /// Status changes saved by [`ContentDeployer::commit`]
    pub updates: Vec<(ContentItem, ContentStatus)>,
    /// Row index of the first item whose status changed
    pub first_changed: Option<usize>,
    pub changed: usize,
    pub skipped: usize,
}

/// Turns content items into feed rows for one environment.
pub struct ContentDeployer<'a> {
    environment: &'a Environment,
    registry: &'a ConfigRegistry,
    store: &'a dyn ContentStore,
    directory: &'a dyn OrganisationDirectory,
    images: &'a dyn ImageProvider,
}

impl<'a> ContentDeployer<'a> {
    pub fn new(
        environment: &'a Environment,
        registry: &'a ConfigRegistry,
        store: &'a dyn ContentStore,
        directory: &'a dyn OrganisationDirectory,
        images: &'a dyn ImageProvider,
    ) -> Self {
        Self {
            environment,
            registry,
            store,
            directory,
            images,
        }
    }

    /// Build rows for `items` and work out their next status.
    ///
    /// Nothing is persisted until the outcome is committed.
    pub async fn deploy(
        &self,
        content_type: ContentType,
        items: Vec<ContentItem>,
    ) -> Result<DeployOutcome> {
        let defaults = self.registry.defaults()?;
        let default_fields = defaults
            .content(content_type)
            .map(|c| c.fields.clone())
            .unwrap_or_default();

        let mut outcome = DeployOutcome::default();
        for item in items {
            if item.status.is_skipped() {
                outcome.skipped += 1;
                continue;
            }
            let Some(row) = self.enrich(&item, &default_fields).await? else {
                outcome.skipped += 1;
                continue;
            };

            let status = item.status.advance(self.environment.name);
            if status != item.status {
                outcome.changed += 1;
                outcome.first_changed.get_or_insert(outcome.rows.len());
                outcome.updates.push((item, status));
            }
            outcome.rows.push(row);
        }

        log::info!(
            "Deploying {} {} rows to {} ({} changed, {} skipped)",
            outcome.rows.len(),
            content_type,
            self.environment.name,
            outcome.changed,
            outcome.skipped
        );
        Ok(outcome)
    }

    /// Persist the status changes of a staged `outcome`.
    pub async fn commit(&self, outcome: &DeployOutcome) -> Result<()> {
        for (item, status) in &outcome.updates {
            self.store.update_status(item, *status).await?;
        }
        log::debug!("Saved {} status changes", outcome.updates.len());
        Ok(())
    }

    /// Merged record for `item`, or `None` when it must be excluded.
    async fn enrich(
        &self,
        item: &ContentItem,
        default_fields: &FieldsConfig,
    ) -> Result<Option<Fields>> {
        let listing = item.content_type.is_listing();

        let Some(organisation) = self.directory.organisation(&item.code).await? else {
            log::warn!(
                "Excluding {} {}: organisation '{}' not found",
                item.content_type,
                item.id,
                item.code
            );
            return Ok(None);
        };
        if listing && organisation.is_archived() {
            log::warn!(
                "Excluding listing {}: organisation '{}' is archived",
                item.id,
                item.code
            );
            return Ok(None);
        }
        let site = match &item.site {
            Some(code) => self.directory.site(code).await?,
            None => None,
        };

        let config = self.registry.organisation(&item.code)?;
        let content = config.content(item.content_type);

        let mut sources: Vec<&dyn FieldSource> = vec![item];
        if let Some(content) = content {
            sources.push(&content.fields);
        }
        sources.push(&organisation);
        if let Some(site) = &site {
            sources.push(site);
        }
        sources.push(default_fields);

        let mut row = Fields::new();
        row.add(&sources);

        let published = match &site {
            Some(site) => site.status.is_published(self.environment.name),
            None => !organisation.is_archived(),
        };
        row.set(FieldName::Published, published.to_string());

        if let Some(thumbnail) = self.images.thumbnail(item).await? {
            row.fill(FieldName::Thumbnail, &thumbnail);
        }
        if let Some(logo) = self.images.logo(&item.code).await? {
            row.fill(FieldName::Logo, &logo);
        }
        for name in [FieldName::Thumbnail, FieldName::Logo] {
            if !row.is_filled(name) {
                log::error!("No {} image for {} {}", name, item.content_type, item.id);
            }
        }

        if !listing {
            for name in IMAGE_FIELDS {
                let value = row.value(name);
                if !value.is_empty() && !is_absolute(value) {
                    let absolute = self.environment.image_url(value);
                    row.set(name, absolute);
                }
            }
            if !organisation.listing {
                for name in [
                    FieldName::Organisation,
                    FieldName::OrganisationUrl,
                    FieldName::ImageText,
                ] {
                    row.set(name, "");
                }
            }
            if content.is_some_and(|c| c.trailing_slash) && row.is_filled(FieldName::Url) {
                let url = ensure_trailing_slash(row.value(FieldName::Url));
                row.set(FieldName::Url, url);
            }
        }
        Ok(Some(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::models::{
        ContentStatus, EnvironmentName, Organisation, OrganisationSite, OrganisationStatus,
        SiteStatus,
    };

    #[derive(Default)]
    struct Fixture {
        organisations: HashMap<String, Organisation>,
        sites: HashMap<String, OrganisationSite>,
        updates: Mutex<Vec<(u64, ContentStatus)>>,
    }

    #[async_trait]
    impl ContentStore for Fixture {
        async fn items(&self, _content_type: ContentType) -> Result<Vec<ContentItem>> {
            Ok(Vec::new())
        }

        async fn update_status(&self, item: &ContentItem, status: ContentStatus) -> Result<()> {
            self.updates.lock().unwrap().push((item.id, status));
            Ok(())
        }
    }

    #[async_trait]
    impl OrganisationDirectory for Fixture {
        async fn organisation(&self, code: &str) -> Result<Option<Organisation>> {
            Ok(self.organisations.get(code).cloned())
        }

        async fn site(&self, code: &str) -> Result<Option<OrganisationSite>> {
            Ok(self.sites.get(code).cloned())
        }
    }

    #[async_trait]
    impl ImageProvider for Fixture {
        async fn thumbnail(&self, item: &ContentItem) -> Result<Option<String>> {
            Ok(Some(format!("/thumbs/{}.png", item.id)))
        }

        async fn logo(&self, code: &str) -> Result<Option<String>> {
            Ok(Some(format!("https://cdn.example.com/{code}.png")))
        }
    }

    fn fixture() -> Fixture {
        let mut fixture = Fixture::default();
        fixture.organisations.insert(
            "acme".into(),
            Organisation {
                code: "acme".into(),
                name: "Acme".into(),
                url: "https://acme.org".into(),
                status: OrganisationStatus::Active,
                listing: true,
                image_text: Some("Acme logo".into()),
            },
        );
        fixture.organisations.insert(
            "gone".into(),
            Organisation {
                code: "gone".into(),
                name: "Gone".into(),
                url: String::new(),
                status: OrganisationStatus::Archived,
                listing: false,
                image_text: None,
            },
        );
        fixture.sites.insert(
            "acme-blog".into(),
            OrganisationSite {
                code: "acme-blog".into(),
                organisation: "acme".into(),
                url: "https://blog.acme.org".into(),
                status: SiteStatus::Review,
            },
        );
        fixture
    }

    fn registry() -> (tempfile::TempDir, ConfigRegistry) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("content.yml"),
            "post:\n  filename: posts.csv\n  fields:\n    category: News\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("acme.yml"),
            "post:\n  trailing-slash: true\n  fields:\n    category: Acme News\n",
        )
        .unwrap();
        let registry = ConfigRegistry::new(dir.path());
        registry.load_defaults().unwrap();
        (dir, registry)
    }

    fn environment(name: EnvironmentName) -> Environment {
        Environment {
            name,
            images: "https://img.example.com".into(),
            feeds: HashMap::new(),
            bucket: None,
            host: None,
            directory: None,
        }
    }

    fn item(id: u64, code: &str, status: ContentStatus) -> ContentItem {
        let mut fields = Fields::new();
        fields.set(FieldName::Title, format!("Item {id}"));
        fields.set(FieldName::Url, "https://acme.org/post");
        ContentItem {
            id,
            code: code.into(),
            site: Some("acme-blog".into()),
            content_type: ContentType::Post,
            status,
            fields,
        }
    }

    #[tokio::test]
    async fn test_stage_then_prod_transitions() {
        let fixture = fixture();
        let (_dir, registry) = registry();

        let stage = environment(EnvironmentName::Stage);
        let deployer = ContentDeployer::new(&stage, &registry, &fixture, &fixture, &fixture);
        let items = vec![
            item(1, "acme", ContentStatus::Deployed),
            item(2, "acme", ContentStatus::Pending),
            item(3, "acme", ContentStatus::Skipped),
        ];
        let outcome = deployer.deploy(ContentType::Post, items).await.unwrap();
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.changed, 1);
        assert_eq!(outcome.first_changed, Some(1));
        assert_eq!(outcome.skipped, 1);
        assert!(fixture.updates.lock().unwrap().is_empty());

        deployer.commit(&outcome).await.unwrap();
        assert_eq!(*fixture.updates.lock().unwrap(), vec![(2, ContentStatus::Staged)]);

        let prod = environment(EnvironmentName::Prod);
        let deployer = ContentDeployer::new(&prod, &registry, &fixture, &fixture, &fixture);
        let outcome = deployer
            .deploy(ContentType::Post, vec![item(2, "acme", ContentStatus::Staged)])
            .await
            .unwrap();
        assert_eq!(outcome.first_changed, Some(0));
        deployer.commit(&outcome).await.unwrap();

        // Already deployed: nothing persisted again.
        let outcome = deployer
            .deploy(ContentType::Post, vec![item(2, "acme", ContentStatus::Deployed)])
            .await
            .unwrap();
        assert_eq!(outcome.changed, 0);
        assert_eq!(outcome.first_changed, None);
        deployer.commit(&outcome).await.unwrap();
        assert_eq!(fixture.updates.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_row_enrichment() {
        let fixture = fixture();
        let (_dir, registry) = registry();

        let stage = environment(EnvironmentName::Stage);
        let deployer = ContentDeployer::new(&stage, &registry, &fixture, &fixture, &fixture);
        let outcome = deployer
            .deploy(ContentType::Post, vec![item(7, "acme", ContentStatus::New)])
            .await
            .unwrap();
        let row = &outcome.rows[0];

        assert_eq!(row.value(FieldName::Id), "7");
        assert_eq!(row.value(FieldName::Category), "Acme News");
        assert_eq!(row.value(FieldName::Organisation), "Acme");
        assert_eq!(row.value(FieldName::ImageText), "Acme logo");
        assert_eq!(row.value(FieldName::Site), "https://blog.acme.org");
        assert_eq!(row.value(FieldName::Published), "true");
        assert_eq!(row.value(FieldName::Thumbnail), "https://img.example.com/thumbs/7.png");
        assert_eq!(row.value(FieldName::Logo), "https://cdn.example.com/acme.png");
        assert_eq!(row.value(FieldName::Url), "https://acme.org/post/");

        let prod = environment(EnvironmentName::Prod);
        let deployer = ContentDeployer::new(&prod, &registry, &fixture, &fixture, &fixture);
        let outcome = deployer
            .deploy(ContentType::Post, vec![item(7, "acme", ContentStatus::New)])
            .await
            .unwrap();
        assert_eq!(outcome.rows[0].value(FieldName::Published), "false");
    }

    #[tokio::test]
    async fn test_missing_or_archived_organisation_excluded() {
        let fixture = fixture();
        let (_dir, registry) = registry();
        let stage = environment(EnvironmentName::Stage);
        let deployer = ContentDeployer::new(&stage, &registry, &fixture, &fixture, &fixture);

        let mut listing = item(1, "gone", ContentStatus::Pending);
        listing.content_type = ContentType::Listing;
        let items = vec![listing, item(2, "unknown", ContentStatus::Pending)];
        let outcome = deployer.deploy(ContentType::Post, items).await.unwrap();
        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.skipped, 2);
        assert!(fixture.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_listing_blanks_organisation() {
        let mut fixture = fixture();
        fixture.organisations.get_mut("acme").unwrap().listing = false;
        let (_dir, registry) = registry();
        let stage = environment(EnvironmentName::Stage);
        let deployer = ContentDeployer::new(&stage, &registry, &fixture, &fixture, &fixture);

        let outcome = deployer
            .deploy(ContentType::Post, vec![item(1, "acme", ContentStatus::New)])
            .await
            .unwrap();
        let row = &outcome.rows[0];
        assert_eq!(row.value(FieldName::Organisation), "");
        assert_eq!(row.value(FieldName::OrganisationUrl), "");
        assert_eq!(row.value(FieldName::ImageText), "");
    }
}
