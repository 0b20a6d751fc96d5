//! S3-compatible storage client
//!
//! Wraps the AWS SDK for multipart uploads against S3, MinIO or R2.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{retry::RetryConfig, timeout::TimeoutConfig, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use chrono::DateTime;

use crate::config::StorageConfig;
use crate::error::StorageError;

use super::types::{CompletedPartInfo, MultipartHandle, MultipartStore, PendingMultipart};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ATTEMPTS: u32 = 2;

/// S3-compatible storage client
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    /// Create a new S3 client from configuration
    pub async fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "strongbox",
        );

        let region = config
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let timeouts = TimeoutConfig::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build();

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region))
            .credentials_provider(credentials)
            .timeout_config(timeouts)
            .retry_config(RetryConfig::standard().with_max_attempts(MAX_ATTEMPTS));

        if let Some(endpoint) = &config.endpoint {
            // MinIO and most S3-compatible services need path-style addressing
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        // Test connection by checking if bucket exists
        let bucket = config.bucket.clone();
        match client.head_bucket().bucket(&bucket).send().await {
            Ok(_) => {
                tracing::info!("Connected to S3 bucket: {}", bucket);
            }
            Err(e) => {
                tracing::warn!(
                    "Could not verify bucket {}: {}. Will attempt operations anyway.",
                    bucket,
                    DisplayErrorContext(&e)
                );
            }
        }

        Ok(Self { client, bucket })
    }
}

fn sdk_error<E>(action: &str, target: &str, err: E) -> StorageError
where
    E: std::error::Error,
{
    let message = format!("{}", DisplayErrorContext(&err));
    if message.contains("NoSuchUpload") {
        StorageError::UploadNotFound(target.to_string())
    } else if message.contains("AccessDenied") {
        StorageError::AccessDenied(format!("{} {}", action, target))
    } else if message.contains("dispatch failure") || message.contains("timeout") {
        StorageError::ConnectionFailed(format!("{} {}: {}", action, target, message))
    } else {
        StorageError::SdkError(format!("Failed to {} {}: {}", action, target, message))
    }
}

#[async_trait]
impl MultipartStore for S3Client {
    async fn create_multipart(
        &self,
        key: &str,
        original_filename: &str,
    ) -> Result<MultipartHandle, StorageError> {
        // S3 metadata travels as HTTP headers, which must stay ASCII
        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/octet-stream")
            .metadata("original_filename", urlencoding::encode(original_filename))
            .send()
            .await
            .map_err(|e| sdk_error("create multipart upload", key, e))?;

        let upload_id = response.upload_id().ok_or_else(|| {
            StorageError::InvalidResponse(format!(
                "CreateMultipartUpload for {} returned no upload id",
                key
            ))
        })?;

        Ok(MultipartHandle {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
        })
    }

    async fn upload_part(
        &self,
        handle: &MultipartHandle,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String, StorageError> {
        let response = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| sdk_error("upload part of", &handle.key, e))?;

        response
            .e_tag()
            .map(|etag| etag.to_string())
            .ok_or_else(|| {
                StorageError::InvalidResponse(format!(
                    "UploadPart {} of {} returned no ETag",
                    part_number, handle.key
                ))
            })
    }

    async fn complete_multipart(
        &self,
        handle: &MultipartHandle,
        parts: &[CompletedPartInfo],
    ) -> Result<(), StorageError> {
        let parts = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(&part.etag)
                    .build()
            })
            .collect::<Vec<_>>();

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| sdk_error("complete multipart upload", &handle.key, e))?;

        Ok(())
    }

    async fn abort_multipart(
        &self,
        handle: &MultipartHandle,
    ) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .send()
            .await
            .map_err(|e| sdk_error("abort multipart upload", &handle.key, e))?;

        Ok(())
    }

    async fn list_pending_multiparts(
        &self,
        prefix: &str,
    ) -> Result<Vec<PendingMultipart>, StorageError> {
        let mut pending = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut upload_id_marker: Option<String> = None;

        loop {
            let response = self
                .client
                .list_multipart_uploads()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_key_marker(key_marker.take())
                .set_upload_id_marker(upload_id_marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("list multipart uploads under", prefix, e))?;

            pending.extend(response.uploads().iter().filter_map(|upload| {
                Some(PendingMultipart {
                    handle: MultipartHandle {
                        key: upload.key()?.to_string(),
                        upload_id: upload.upload_id()?.to_string(),
                    },
                    initiated: upload
                        .initiated()
                        .and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())),
                })
            }));

            if !response.is_truncated().unwrap_or(false) {
                break;
            }

            key_marker = response.next_key_marker().map(|s| s.to_string());
            upload_id_marker = response.next_upload_id_marker().map(|s| s.to_string());
            if key_marker.is_none() && upload_id_marker.is_none() {
                break;
            }
        }

        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_error(message: &str) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::Other, message.to_string())
    }

    #[test]
    fn test_sdk_error_classification() {
        let err = sdk_error("abort", "uploads/a", io_error("NoSuchUpload: gone"));
        assert!(matches!(err, StorageError::UploadNotFound(ref key) if key == "uploads/a"));

        let err = sdk_error("create", "uploads/a", io_error("AccessDenied"));
        assert!(matches!(err, StorageError::AccessDenied(_)));

        let err = sdk_error("upload part of", "uploads/a", io_error("dispatch failure"));
        assert!(matches!(err, StorageError::ConnectionFailed(_)));

        let err = sdk_error("complete", "uploads/a", io_error("InternalError"));
        assert!(matches!(err, StorageError::SdkError(ref msg) if msg.starts_with("Failed to complete")));
    }
}
