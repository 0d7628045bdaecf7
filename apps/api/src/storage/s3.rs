use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::info;

use crate::config::S3Config;
use crate::storage::{FileFormat, StorageAdapter, StorageError};

/// S3-compatible object storage (AWS, MinIO, Supabase storage).
pub struct S3StorageAdapter {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_url: String,
}

impl S3StorageAdapter {
    pub async fn from_config(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "tradesman-static",
        );

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(&config.endpoint)
            .load()
            .await;

        // Path-style addressing: most S3-compatible endpoints don't serve virtual-host buckets.
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            public_url: config.public_url.trim_end_matches('/').to_string(),
        }
    }

}

/// Path-style public URL: `{public_url}/{bucket}/{key}`.
fn object_url(public_url: &str, bucket: &str, key: &str) -> String {
    format!("{}/{bucket}/{key}", public_url.trim_end_matches('/'))
}

#[async_trait]
impl StorageAdapter for S3StorageAdapter {
    async fn upload(
        &self,
        data: Bytes,
        file_name: &str,
        format: FileFormat,
    ) -> Result<String, StorageError> {
        let key = format!("{file_name}.{}", format.extension());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .content_type(format.content_type())
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.clone(),
                message: e.to_string(),
            })?;

        info!("Uploaded s3://{}/{}", self.bucket, key);
        Ok(object_url(&self.public_url, &self.bucket, &key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_includes_bucket() {
        assert_eq!(
            object_url("https://cdn.test/storage/", "uploads", "development/00psk/ref.png"),
            "https://cdn.test/storage/uploads/development/00psk/ref.png"
        );
    }
}
