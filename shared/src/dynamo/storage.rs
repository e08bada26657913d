use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use crate::error::DataError;
use crate::provider::BlobUploader;
use crate::types::UploadFile;

/// Document-variant blob store: a public S3 bucket addressed by
/// virtual-hosted URLs.
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(aws_config: &aws_config::SdkConfig, bucket: &str) -> Self {
        Self {
            client: S3Client::new(aws_config),
            bucket: bucket.to_string(),
        }
    }

    fn public_url(bucket: &str, key: &str) -> String {
        format!("https://{}.s3.amazonaws.com/{}", bucket, key)
    }
}

#[async_trait]
impl BlobUploader for S3BlobStore {
    async fn upload_image(&self, file: &UploadFile, path: &str) -> Result<String, DataError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(file.bytes.clone()))
            .content_type(&file.content_type)
            .send()
            .await
            .map_err(|e| DataError::transport(format!("Failed to upload to S3: {:?}", e)))?;

        Ok(Self::public_url(&self.bucket, path))
    }
}
