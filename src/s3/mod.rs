use anyhow::{Context, Result};
use async_trait::async_trait;
use s3::creds::Credentials;
use s3::region::Region;
use s3::Bucket;
use tracing::debug;

use crate::config::Config;
use crate::relocate::AssetStore;

/// S3 client wrapper.
#[derive(Clone)]
pub struct S3Client {
    bucket: Box<Bucket>,
    endpoint: Option<String>,
    public_url: Option<String>,
}

impl S3Client {
    /// Create a new S3 client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no bucket is configured, credentials are missing,
    /// or client initialization fails.
    pub async fn new(config: &Config) -> Result<Self> {
        let bucket_name = config.s3_bucket.as_deref().context("S3_BUCKET not set")?;

        let access_key = std::env::var("AWS_ACCESS_KEY_ID").context("AWS_ACCESS_KEY_ID not set")?;
        let secret_key =
            std::env::var("AWS_SECRET_ACCESS_KEY").context("AWS_SECRET_ACCESS_KEY not set")?;

        let credentials = Credentials::new(Some(&access_key), Some(&secret_key), None, None, None)
            .context("Failed to create S3 credentials")?;

        let region = if let Some(ref endpoint) = config.s3_endpoint {
            Region::Custom {
                region: config.s3_region.clone(),
                endpoint: endpoint.clone(),
            }
        } else {
            config.s3_region.parse().unwrap_or(Region::UsEast1)
        };

        let bucket = Bucket::new(bucket_name, region, credentials)
            .context("Failed to create S3 bucket")?;

        // Use path-style for custom endpoints (MinIO, R2, etc.)
        let bucket = if config.s3_endpoint.is_some() {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self {
            bucket,
            endpoint: config.s3_endpoint.clone(),
            public_url: config.s3_public_url.clone(),
        })
    }

    /// Upload bytes to S3.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    pub async fn upload_bytes(&self, data: &[u8], s3_key: &str, content_type: &str) -> Result<()> {
        debug!(key = %s3_key, content_type = %content_type, "Uploading bytes to S3");

        self.bucket
            .put_object_with_content_type(s3_key, data, content_type)
            .await
            .context("Failed to upload bytes to S3")?;

        Ok(())
    }

    /// Get the public URL for an object.
    #[must_use]
    pub fn get_public_url(&self, s3_key: &str) -> String {
        public_object_url(
            self.public_url.as_deref(),
            self.endpoint.as_deref(),
            &self.bucket.name(),
            s3_key,
        )
    }

    /// Get the bucket name
    #[must_use]
    pub fn bucket_name(&self) -> String {
        self.bucket.name().to_string()
    }
}

#[async_trait]
impl AssetStore for S3Client {
    async fn upload_asset(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String> {
        self.upload_bytes(&data, key, content_type).await?;
        Ok(key.to_string())
    }

    fn public_url(&self, path: &str) -> String {
        self.get_public_url(path)
    }
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("bucket", &self.bucket.name())
            .finish()
    }
}

/// Public URL for `key`: an explicit base wins, then a path-style custom
/// endpoint, then the AWS virtual-host form.
fn public_object_url(
    public_base: Option<&str>,
    endpoint: Option<&str>,
    bucket: &str,
    key: &str,
) -> String {
    if let Some(base) = public_base {
        return format!("{}/{key}", base.trim_end_matches('/'));
    }
    if let Some(endpoint) = endpoint {
        return format!("{}/{bucket}/{key}", endpoint.trim_end_matches('/'));
    }
    format!("https://{bucket}.s3.amazonaws.com/{key}")
}
