// src/pipeline/deploy.rs

//! Deploy pipeline: build a feed for one environment and ship it.

use crate::config::{self, ConfigRegistry};
use crate::error::{AppError, Result};
use crate::feed::FeedFile;
use crate::models::{ContentConfig, ContentType, Environment, EnvironmentName, Settings};
use crate::services::ContentDeployer;
use crate::storage::{
    ContentStore, DeliveryReport, FeedArchive, FeedTarget, HostTarget, ImageProvider,
    LocalTarget, OrganisationDirectory, RetryPolicy, TransportClients, deliver_all,
};

#[cfg(feature = "s3")]
use crate::storage::S3Target;

/// Summary of one deploy run.
#[derive(Debug, Default)]
pub struct DeployReport {
    /// Data rows in the shipped feed
    pub rows: usize,
    pub changed: usize,
    pub skipped: usize,
    /// Remote feed path
    pub name: String,
    pub delivery: DeliveryReport,
}

/// One deployment of a content type to an environment.
pub struct DeployRequest {
    pub environment: EnvironmentName,
    pub content_type: ContentType,
    /// Ship only the rows from the first changed item onwards
    pub incremental: bool,
}

/// Delivery targets configured for `environment`.
pub async fn build_targets(
    environment: &Environment,
    clients: &TransportClients,
) -> Result<Vec<Box<dyn FeedTarget>>> {
    let mut targets: Vec<Box<dyn FeedTarget>> = Vec::new();
    if let Some(directory) = &environment.directory {
        targets.push(Box::new(LocalTarget::new(directory)));
    }
    if let Some(host) = &environment.host {
        targets.push(Box::new(HostTarget::new(clients, environment.name, host)));
    }
    if let Some(bucket) = &environment.bucket {
        #[cfg(feature = "s3")]
        targets.push(Box::new(S3Target::for_bucket(bucket.clone()).await));
        #[cfg(not(feature = "s3"))]
        log::warn!(
            "Skipping bucket '{}' for {}: built without the s3 feature",
            bucket,
            environment.name
        );
    }

    if targets.is_empty() {
        return Err(AppError::config(format!(
            "Environment '{}' has no delivery targets",
            environment.name
        )));
    }
    Ok(targets)
}

/// Bucket a shipped feed of `environment` can be read back from.
async fn feed_archive(environment: &Environment) -> Option<Box<dyn FeedArchive>> {
    #[cfg(feature = "s3")]
    if let Some(bucket) = &environment.bucket {
        return Some(Box::new(S3Target::for_bucket(bucket.clone()).await));
    }
    #[cfg(not(feature = "s3"))]
    let _ = environment;
    None
}

/// Feed configuration of `content_type`, checked for shipping.
fn feed_config(registry: &ConfigRegistry, content_type: ContentType) -> Result<ContentConfig> {
    let defaults = registry.defaults()?;
    let content = defaults.content(content_type).ok_or_else(|| {
        AppError::config(format!("No configuration for content type '{content_type}'"))
    })?;
    if content.output.is_empty() {
        return Err(AppError::config(format!(
            "Content type '{content_type}' has no output columns"
        )));
    }
    config::validate(content)?;
    Ok(content.clone())
}

/// Build, stage and ship the feed of `request.content_type`.
///
/// Item statuses are saved once the feed is staged. The staged file is
/// deleted only when every target received it; otherwise it is left in the
/// working directory for [`reship`].
pub async fn run_deploy<C>(
    settings: &Settings,
    registry: &ConfigRegistry,
    clients: &TransportClients,
    collaborators: &C,
    request: &DeployRequest,
) -> Result<DeployReport>
where
    C: ContentStore + OrganisationDirectory + ImageProvider,
{
    let environment = settings.environment(request.environment)?;
    let content = feed_config(registry, request.content_type)?;
    let targets = build_targets(environment, clients).await?;

    let items = collaborators.items(request.content_type).await?;
    log::info!(
        "Deploying {} {} items to {}",
        items.len(),
        request.content_type,
        environment.name
    );
    let deployer = ContentDeployer::new(
        environment,
        registry,
        collaborators,
        collaborators,
        collaborators,
    );
    let outcome = deployer.deploy(request.content_type, items).await?;

    let mut feed = FeedFile::new(
        &settings.paths.working_dir,
        &content.filename,
        content.output.clone(),
    );
    feed.init_file().await?;
    for row in &outcome.rows {
        feed.append_line(row);
    }
    if request.incremental {
        let first = outcome.first_changed.unwrap_or(outcome.rows.len());
        feed.trim_lines(first);
    }

    let mut report = DeployReport {
        rows: feed.row_count(),
        changed: outcome.changed,
        skipped: outcome.skipped,
        name: environment.feed_path(request.content_type, &content.filename),
        delivery: DeliveryReport::default(),
    };
    if request.incremental && report.rows == 0 {
        log::info!("No changed {} rows to ship", request.content_type);
        return Ok(report);
    }

    feed.write_file().await?;
    feed.convert_lines_to_ascii(&content.html_fields).await?;
    deployer.commit(&outcome).await?;

    report.delivery = deliver_all(
        &targets,
        feed.path(),
        &report.name,
        RetryPolicy::from(&settings.transport),
    )
    .await;
    finish(&feed, &report.delivery).await?;
    Ok(report)
}

/// Ship a feed left in the working directory by a failed delivery.
///
/// Without a staged file the copy last shipped to the environment's bucket
/// is delivered again.
pub async fn reship(
    settings: &Settings,
    registry: &ConfigRegistry,
    clients: &TransportClients,
    environment: EnvironmentName,
    content_type: ContentType,
) -> Result<DeployReport> {
    let archive = feed_archive(settings.environment(environment)?).await;
    reship_with(
        settings,
        registry,
        clients,
        environment,
        content_type,
        archive.as_deref(),
    )
    .await
}

async fn reship_with(
    settings: &Settings,
    registry: &ConfigRegistry,
    clients: &TransportClients,
    environment: EnvironmentName,
    content_type: ContentType,
    archive: Option<&dyn FeedArchive>,
) -> Result<DeployReport> {
    let environment = settings.environment(environment)?;
    let content = feed_config(registry, content_type)?;
    let targets = build_targets(environment, clients).await?;
    let name = environment.feed_path(content_type, &content.filename);

    let mut feed = FeedFile::new(
        &settings.paths.working_dir,
        &content.filename,
        content.output.clone(),
    );
    if !feed.read_file().await? {
        let restored = match archive {
            Some(archive) => feed.read_file_from_bucket(archive, &name).await?,
            None => false,
        };
        if !restored {
            return Err(AppError::validation(format!(
                "No staged feed at {} and no shipped copy of {}",
                feed.path().display(),
                name
            )));
        }
        log::info!("Restored {} from the bucket", name);
        feed.write_file().await?;
    }

    let delivery = deliver_all(
        &targets,
        feed.path(),
        &name,
        RetryPolicy::from(&settings.transport),
    )
    .await;
    finish(&feed, &delivery).await?;
    Ok(DeployReport {
        rows: feed.row_count(),
        name,
        delivery,
        ..DeployReport::default()
    })
}

async fn finish(feed: &FeedFile, delivery: &DeliveryReport) -> Result<()> {
    if delivery.all_succeeded() {
        return feed.delete_file().await;
    }
    for failure in delivery.failures() {
        log::error!(
            "{} not delivered to {}: {}",
            feed.filename(),
            failure.target,
            failure.error.as_deref().unwrap_or_default()
        );
    }
    log::warn!("Keeping {} for reship", feed.path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::models::{ContentStatus, TransportConfig};
    use crate::storage::SnapshotStore;

    /// Bucket holding one shipped feed.
    struct Shipped(&'static str);

    #[async_trait]
    impl FeedArchive for Shipped {
        async fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>> {
            Ok((name == "posts/posts.csv").then(|| self.0.as_bytes().to_vec()))
        }
    }

    const CONTENT: &str = r#"
post:
  filename: posts.csv
  html-fields: [Body]
  output:
    ID: "${id}"
    Title: "${title}"
    Body: "<p>${body}</p>"
    Published: "${published}"
"#;

    const SNAPSHOT: &str = r#"{
        "items": [
            {"id": 1, "code": "acme", "content_type": "post", "status": "DEPLOYED",
             "fields": {"title": "Old news", "body": "Old"}},
            {"id": 2, "code": "acme", "content_type": "post", "status": "PENDING",
             "fields": {"title": "Café opens", "body": "Crème brûlée"}},
            {"id": 3, "code": "acme", "content_type": "post", "status": "SKIPPED",
             "fields": {"title": "Hidden"}}
        ],
        "organisations": [{"code": "acme", "name": "Acme", "listing": true}],
        "logos": {"acme": "/logos/acme.png"}
    }"#;

    struct Fixture {
        _dir: TempDir,
        settings: Settings,
        registry: ConfigRegistry,
        store: SnapshotStore,
        published: std::path::PathBuf,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("content.yml"), CONTENT).unwrap();
        let snapshot = dir.path().join("snapshot.json");
        std::fs::write(&snapshot, SNAPSHOT).unwrap();
        let published = dir.path().join("published");

        let mut settings = Settings::default();
        settings.paths.working_dir = dir.path().join("work");
        settings.transport = TransportConfig {
            timeout_secs: 5,
            retries: 0,
            retry_delay_ms: 1,
        };
        settings.environments = vec![Environment {
            name: EnvironmentName::Stage,
            images: "https://img.example.com".into(),
            feeds: HashMap::from([("post".to_string(), "posts/${filename}".to_string())]),
            bucket: None,
            host: None,
            directory: Some(published.clone()),
        }];

        let registry = ConfigRegistry::new(&config_dir);
        registry.load_defaults().unwrap();
        let store = SnapshotStore::load(&snapshot).await.unwrap();
        Fixture {
            _dir: dir,
            settings,
            registry,
            store,
            published,
        }
    }

    fn request(incremental: bool) -> DeployRequest {
        DeployRequest {
            environment: EnvironmentName::Stage,
            content_type: ContentType::Post,
            incremental,
        }
    }

    #[tokio::test]
    async fn test_deploy_ships_and_cleans_up() {
        let f = fixture().await;
        let clients = TransportClients::new(Duration::from_secs(5));

        let report = run_deploy(&f.settings, &f.registry, &clients, &f.store, &request(false))
            .await
            .unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.changed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.name, "posts/posts.csv");
        assert!(report.delivery.all_succeeded());

        let shipped = std::fs::read_to_string(f.published.join("posts/posts.csv")).unwrap();
        let lines: Vec<&str> = shipped.lines().collect();
        assert_eq!(lines[0], "ID,Title,Body,Published");
        assert_eq!(lines[1], "00001,Old news,&lt;p&gt;Old&lt;/p&gt;,true");
        assert_eq!(
            lines[2],
            "00002,Cafe opens,&lt;p&gt;Cr&#232;me br&#251;l&#233;e&lt;/p&gt;,true"
        );
        assert!(!f.settings.paths.working_dir.join("posts.csv").exists());

        let items = f.store.items(ContentType::Post).await.unwrap();
        assert_eq!(items[1].status, ContentStatus::Staged);
    }

    #[tokio::test]
    async fn test_incremental_ships_changed_rows_only() {
        let f = fixture().await;
        let clients = TransportClients::new(Duration::from_secs(5));

        let report = run_deploy(&f.settings, &f.registry, &clients, &f.store, &request(true))
            .await
            .unwrap();
        assert_eq!(report.rows, 1);
        let shipped = std::fs::read_to_string(f.published.join("posts/posts.csv")).unwrap();
        assert_eq!(shipped.lines().count(), 2);
        assert!(shipped.contains("00002"));

        // Nothing changed on the second run.
        let report = run_deploy(&f.settings, &f.registry, &clients, &f.store, &request(true))
            .await
            .unwrap();
        assert_eq!(report.rows, 0);
        assert!(report.delivery.deliveries.is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_keeps_file_for_reship() {
        let f = fixture().await;
        // A regular file where the target directory should be.
        std::fs::write(&f.published, "not a directory").unwrap();
        let clients = TransportClients::new(Duration::from_secs(5));

        let report = run_deploy(&f.settings, &f.registry, &clients, &f.store, &request(false))
            .await
            .unwrap();
        assert!(!report.delivery.all_succeeded());
        let staged = f.settings.paths.working_dir.join("posts.csv");
        assert!(staged.exists());

        std::fs::remove_file(&f.published).unwrap();
        let report = reship(
            &f.settings,
            &f.registry,
            &clients,
            EnvironmentName::Stage,
            ContentType::Post,
        )
        .await
        .unwrap();
        assert!(report.delivery.all_succeeded());
        assert_eq!(report.rows, 2);
        assert!(!staged.exists());
        assert!(f.published.join("posts/posts.csv").exists());
    }

    #[tokio::test]
    async fn test_staging_failure_keeps_status() {
        let mut f = fixture().await;
        let working_dir = f.settings.paths.working_dir.clone();
        let blocker = working_dir.parent().unwrap().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        f.settings.paths.working_dir = blocker.join("work");
        let clients = TransportClients::new(Duration::from_secs(5));

        let result = run_deploy(&f.settings, &f.registry, &clients, &f.store, &request(true)).await;
        assert!(matches!(result, Err(AppError::Io(_))));
        let items = f.store.items(ContentType::Post).await.unwrap();
        assert_eq!(items[1].status, ContentStatus::Pending);

        // The retry still sees item 2 as changed and ships it.
        f.settings.paths.working_dir = working_dir;
        let report = run_deploy(&f.settings, &f.registry, &clients, &f.store, &request(true))
            .await
            .unwrap();
        assert_eq!(report.rows, 1);
        let shipped = std::fs::read_to_string(f.published.join("posts/posts.csv")).unwrap();
        assert!(shipped.contains("00002"));
        let items = f.store.items(ContentType::Post).await.unwrap();
        assert_eq!(items[1].status, ContentStatus::Staged);
    }

    #[tokio::test]
    async fn test_reship_falls_back_to_bucket_copy() {
        let f = fixture().await;
        let clients = TransportClients::new(Duration::from_secs(5));
        let archive = Shipped("Old,Header\n00001,Old news,Old,true\n");

        let report = reship_with(
            &f.settings,
            &f.registry,
            &clients,
            EnvironmentName::Stage,
            ContentType::Post,
            Some(&archive),
        )
        .await
        .unwrap();
        assert!(report.delivery.all_succeeded());
        assert_eq!(report.rows, 1);

        let shipped = std::fs::read_to_string(f.published.join("posts/posts.csv")).unwrap();
        let lines: Vec<&str> = shipped.lines().collect();
        assert_eq!(lines, vec!["ID,Title,Body,Published", "00001,Old news,Old,true"]);
        assert!(!f.settings.paths.working_dir.join("posts.csv").exists());

        let result = reship_with(
            &f.settings,
            &f.registry,
            &clients,
            EnvironmentName::Stage,
            ContentType::Post,
            None,
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_environment_without_targets() {
        let mut f = fixture().await;
        f.settings.environments[0].directory = None;
        let clients = TransportClients::new(Duration::from_secs(5));
        let result =
            run_deploy(&f.settings, &f.registry, &clients, &f.store, &request(false)).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
