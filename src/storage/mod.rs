//! Storage abstractions: content collaborators and feed delivery targets.
//!
//! The content store, organisation directory and image provider are
//! external systems reached through traits. Feed files are shipped to any
//! number of [`FeedTarget`]s; each delivery is retried and reported on its
//! own.

pub mod host;
pub mod local;
#[cfg(feature = "s3")]
pub mod s3;
pub mod snapshot;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::{AppError, Result};
use crate::models::{
    ContentItem, ContentStatus, ContentType, Organisation, OrganisationSite, TransportConfig,
};

// Re-export for convenience
pub use host::{HostSession, HostTarget, RemoteSession, ScpSession, TransportClients};
pub use local::LocalTarget;
#[cfg(feature = "s3")]
pub use s3::S3Target;
pub use snapshot::SnapshotStore;

/// Persistence for content items.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Items of `content_type` in feed order.
    async fn items(&self, content_type: ContentType) -> Result<Vec<ContentItem>>;

    async fn update_status(&self, item: &ContentItem, status: ContentStatus) -> Result<()>;
}

/// Lookup of organisations and their sites.
#[async_trait]
pub trait OrganisationDirectory: Send + Sync {
    async fn organisation(&self, code: &str) -> Result<Option<Organisation>>;

    async fn site(&self, code: &str) -> Result<Option<OrganisationSite>>;
}

/// Image lookup for feed rows.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn thumbnail(&self, item: &ContentItem) -> Result<Option<String>>;

    async fn logo(&self, organisation: &str) -> Result<Option<String>>;
}

/// A destination a feed file is copied to.
#[async_trait]
pub trait FeedTarget: Send + Sync {
    /// Human readable location, used in logs and reports.
    fn describe(&self) -> String;

    /// Copy `file` to the target under the relative path `name`.
    async fn deliver(&self, file: &Path, name: &str) -> Result<()>;
}

/// Remote store a shipped feed can be read back from.
#[async_trait]
pub trait FeedArchive: Send + Sync {
    /// Shipped feed at `name`, or `None` when it was never shipped.
    async fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>>;
}

/// Per-delivery timeout and bounded retry with a fixed delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub delay: Duration,
}

impl From<&TransportConfig> for RetryPolicy {
    fn from(config: &TransportConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            retries: config.retries,
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// Outcome of one target's delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub target: String,
    pub error: Option<String>,
}

/// Outcome of delivering one feed to every target.
#[derive(Debug, Clone, Default)]
pub struct DeliveryReport {
    pub deliveries: Vec<Delivery>,
}

impl DeliveryReport {
    pub fn all_succeeded(&self) -> bool {
        self.deliveries.iter().all(|d| d.error.is_none())
    }

    pub fn failures(&self) -> impl Iterator<Item = &Delivery> {
        self.deliveries.iter().filter(|d| d.error.is_some())
    }
}

/// Deliver `file` to every target concurrently.
pub async fn deliver_all(
    targets: &[Box<dyn FeedTarget>],
    file: &Path,
    name: &str,
    policy: RetryPolicy,
) -> DeliveryReport {
    let deliveries = join_all(targets.iter().map(|target| async move {
        let error = deliver_with_retry(target.as_ref(), file, name, policy)
            .await
            .err()
            .map(|e| e.to_string());
        Delivery {
            target: target.describe(),
            error,
        }
    }))
    .await;
    DeliveryReport { deliveries }
}

async fn deliver_with_retry(
    target: &dyn FeedTarget,
    file: &Path,
    name: &str,
    policy: RetryPolicy,
) -> Result<()> {
    let description = target.describe();
    let mut attempt = 0;
    loop {
        let error = match tokio::time::timeout(policy.timeout, target.deliver(file, name)).await {
            Ok(Ok(())) => {
                log::info!("Delivered {} to {}", name, description);
                return Ok(());
            }
            Ok(Err(e)) => e,
            Err(_) => AppError::transport(
                &description,
                format!("timed out after {:?}", policy.timeout),
            ),
        };
        if attempt >= policy.retries {
            log::error!("Delivery of {} to {} failed: {}", name, description, error);
            return Err(error);
        }
        attempt += 1;
        log::warn!(
            "Delivery of {} to {} failed (attempt {}): {}",
            name,
            description,
            attempt,
            error
        );
        tokio::time::sleep(policy.delay).await;
    }
}
