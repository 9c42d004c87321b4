//! AWS S3 feed target.
//!
//! Feeds are stored at `{bucket}/{prefix}/{feed path}`. The same target is
//! read back by `reship` when no staged copy is left.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::{AppError, Result};
use crate::storage::{FeedArchive, FeedTarget};

/// S3 bucket receiving feed files.
pub struct S3Target {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Target {
    /// Create a new S3 target.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Create a target for `bucket` using the ambient AWS configuration.
    ///
    /// The key prefix is read from `S3_PREFIX`.
    pub async fn for_bucket(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let prefix = std::env::var("S3_PREFIX").unwrap_or_default();
        Self::new(Client::new(&config), bucket, prefix)
    }

    /// Object key of a feed name.
    pub fn key(&self, name: &str) -> String {
        let name = name.trim_start_matches('/');
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        }
    }
}

#[async_trait]
impl FeedTarget for S3Target {
    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix.trim_matches('/'))
    }

    async fn deliver(&self, file: &Path, name: &str) -> Result<()> {
        let key = self.key(name);
        let body = ByteStream::from_path(file)
            .await
            .map_err(|e| AppError::S3(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .content_type("text/csv")
            .send()
            .await
            .map_err(|e| AppError::S3(e.to_string()))?;

        log::info!("Wrote s3://{}/{}", self.bucket, key);
        Ok(())
    }
}

#[async_trait]
impl FeedArchive for S3Target {
    async fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let key = self.key(name);
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| AppError::S3(e.to_string()))?;
                Ok(Some(bytes.into_bytes().to_vec()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    log::info!("No existing feed at s3://{}/{}", self.bucket, key);
                    Ok(None)
                } else {
                    Err(AppError::S3(service_err.to_string()))
                }
            }
        }
    }
}
