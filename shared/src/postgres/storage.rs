use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use crate::config::PostgresConfig;
use crate::error::DataError;
use crate::provider::BlobUploader;
use crate::types::UploadFile;

/// Relational-variant blob store: an S3-compatible bucket behind an explicit
/// endpoint, resolved through path-style public URLs.
pub struct BucketBlobStore {
    client: S3Client,
    bucket: String,
    public_base: String,
}

impl BucketBlobStore {
    pub fn new(aws_config: &aws_config::SdkConfig, config: &PostgresConfig) -> Self {
        let s3_config = aws_sdk_s3::config::Builder::from(aws_config)
            .endpoint_url(&config.storage_endpoint)
            .force_path_style(true)
            .build();
        Self {
            client: S3Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            public_base: config.storage_public_url.clone(),
        }
    }

    fn public_url(public_base: &str, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", public_base.trim_end_matches('/'), bucket, key)
    }
}

#[async_trait]
impl BlobUploader for BucketBlobStore {
    async fn upload_image(&self, file: &UploadFile, path: &str) -> Result<String, DataError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(file.bytes.clone()))
            .content_type(&file.content_type)
            .send()
            .await
            .map_err(|e| DataError::transport(format!("Failed to upload to storage: {:?}", e)))?;

        Ok(Self::public_url(&self.public_base, &self.bucket, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_is_path_style() {
        assert_eq!(
            BucketBlobStore::public_url(
                "https://storage.fieldlog.local/",
                "reports",
                "reports/1685610000000_site.jpg"
            ),
            "https://storage.fieldlog.local/reports/reports/1685610000000_site.jpg"
        );
    }
}
