//! JSON snapshot of content items, organisations and images.
//!
//! Stands in for the content database so the CLI can run without one.
//! Status updates are written back to the snapshot file atomically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{ContentItem, ContentStatus, ContentType, Organisation, OrganisationSite};
use crate::storage::local::{read_json, write_json};
use crate::storage::{ContentStore, ImageProvider, OrganisationDirectory};

/// On-disk snapshot layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub items: Vec<ContentItem>,
    #[serde(default)]
    pub organisations: Vec<Organisation>,
    #[serde(default)]
    pub sites: Vec<OrganisationSite>,
    /// Thumbnail path by content item id
    #[serde(default)]
    pub thumbnails: HashMap<u64, String>,
    /// Logo path by organisation code
    #[serde(default)]
    pub logos: HashMap<String, String>,
}

/// Snapshot-backed content store, organisation directory and image provider.
pub struct SnapshotStore {
    path: PathBuf,
    snapshot: Mutex<Snapshot>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>, snapshot: Snapshot) -> Self {
        Self {
            path: path.into(),
            snapshot: Mutex::new(snapshot),
        }
    }

    /// Load the snapshot at `path`. A missing file is an error.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let snapshot: Snapshot = read_json(path).await?.ok_or_else(|| {
            AppError::config(format!("Snapshot file not found: {}", path.display()))
        })?;
        log::info!(
            "Loaded snapshot with {} items, {} organisations",
            snapshot.items.len(),
            snapshot.organisations.len()
        );
        Ok(Self::new(path, snapshot))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current snapshot.
    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.lock().await.clone()
    }
}

#[async_trait]
impl ContentStore for SnapshotStore {
    async fn items(&self, content_type: ContentType) -> Result<Vec<ContentItem>> {
        let snapshot = self.snapshot.lock().await;
        Ok(snapshot
            .items
            .iter()
            .filter(|item| item.content_type == content_type)
            .cloned()
            .collect())
    }

    async fn update_status(&self, item: &ContentItem, status: ContentStatus) -> Result<()> {
        let mut snapshot = self.snapshot.lock().await;
        let stored = snapshot
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or_else(|| AppError::validation(format!("Unknown content item {}", item.id)))?;
        log::debug!("Item {}: {:?} -> {:?}", item.id, stored.status, status);
        stored.status = status;
        write_json(&self.path, &*snapshot).await
    }
}

#[async_trait]
impl OrganisationDirectory for SnapshotStore {
    async fn organisation(&self, code: &str) -> Result<Option<Organisation>> {
        let snapshot = self.snapshot.lock().await;
        Ok(snapshot.organisations.iter().find(|o| o.code == code).cloned())
    }

    async fn site(&self, code: &str) -> Result<Option<OrganisationSite>> {
        let snapshot = self.snapshot.lock().await;
        Ok(snapshot.sites.iter().find(|s| s.code == code).cloned())
    }
}

#[async_trait]
impl ImageProvider for SnapshotStore {
    async fn thumbnail(&self, item: &ContentItem) -> Result<Option<String>> {
        let snapshot = self.snapshot.lock().await;
        Ok(snapshot.thumbnails.get(&item.id).cloned())
    }

    async fn logo(&self, organisation: &str) -> Result<Option<String>> {
        let snapshot = self.snapshot.lock().await;
        Ok(snapshot.logos.get(organisation).cloned())
    }
}
