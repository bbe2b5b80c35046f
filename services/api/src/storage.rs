//! Avatar object storage
//!
//! Uploads go to an S3 bucket under a random key and are served from a
//! public base URL, which is what gets written into the profile.

use anyhow::Result;
use aws_sdk_s3::primitives::ByteStream;
use tracing::info;
use uuid::Uuid;

/// S3-backed avatar store
#[derive(Clone)]
pub struct AvatarStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base: String,
}

impl AvatarStorage {
    /// Create a new avatar store
    pub fn new(client: aws_sdk_s3::Client, bucket: String, public_base: String) -> Self {
        Self {
            client,
            bucket,
            public_base,
        }
    }

    /// Upload an avatar image and return its public URL
    pub async fn upload(
        &self,
        data: Vec<u8>,
        extension: &str,
        content_type: &str,
    ) -> Result<String> {
        let key = format!("{}.{}", Uuid::new_v4(), extension);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await?;

        info!("Uploaded avatar {} to bucket {}", key, self.bucket);

        Ok(format!(
            "{}/{}",
            self.public_base.trim_end_matches('/'),
            key
        ))
    }
}
