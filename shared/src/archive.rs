use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use crate::capture::ImageUpload;

/// Copies scanned images to S3 for later model training
pub struct ScanArchive {
    client: S3Client,
    bucket: String,
}

impl ScanArchive {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn object_key(user_id: &str, scan_id: &str, extension: &str) -> String {
        format!("scans/{}/{}.{}", user_id, scan_id, extension)
    }

    pub async fn store(&self, user_id: &str, scan_id: &str, upload: &ImageUpload) -> Result<String, String> {
        let key = Self::object_key(user_id, scan_id, upload.extension());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(upload.mime_type())
            .body(ByteStream::from(upload.bytes.clone()))
            .send()
            .await
            .map_err(|e| format!("S3 put_object error: {}", e))?;

        tracing::info!("🗄️ Archived scan image s3://{}/{}", self.bucket, key);
        Ok(key)
    }
}
