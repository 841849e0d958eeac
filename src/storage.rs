//! Image object storage.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use std::collections::HashMap;
use tracing::instrument;

/// User-metadata key under which uploads carry their comma-separated custom labels.
pub const CUSTOM_LABELS_METADATA_KEY: &str = "customlabels";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_image(
        &self,
        bucket: &str,
        key: &str,
        image: Vec<u8>,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()>;

    /// Custom labels stored with the object, or an empty string.
    async fn custom_labels(&self, bucket: &str, key: &str) -> Result<String>;
}

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, image, metadata), fields(size = image.len()))]
    async fn put_image(
        &self,
        bucket: &str,
        key: &str,
        image: Vec<u8>,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata(Some(metadata))
            .body(ByteStream::from(image))
            .send()
            .await
            .with_context(|| format!("failed to upload s3://{bucket}/{key}"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn custom_labels(&self, bucket: &str, key: &str) -> Result<String> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to read metadata of s3://{bucket}/{key}"))?;

        Ok(output
            .metadata()
            .and_then(|metadata| metadata.get(CUSTOM_LABELS_METADATA_KEY))
            .cloned()
            .unwrap_or_default())
    }
}
