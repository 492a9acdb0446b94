use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Blob '{0}' not found")]
    NotFound(String),

    #[error("S3 error: {0}")]
    S3(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Names of every blob starting with `prefix`, in store order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError>;

    async fn download(&self, name: &str) -> Result<Bytes, BlobError>;

    /// Writes `content` under `name`, overwriting any existing blob.
    async fn upload(&self, name: &str, content: Bytes) -> Result<(), BlobError>;
}

/// Blob store backed by an S3 bucket (MinIO locally, AWS in production).
#[derive(Clone)]
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        let mut names = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| BlobError::S3(format!("list '{prefix}' failed: {e}")))?;

            names.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(String::from)),
            );

            match page.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        debug!("Listed {} blobs under s3://{}/{}", names.len(), self.bucket, prefix);
        Ok(names)
    }

    async fn download(&self, name: &str) -> Result<Bytes, BlobError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map_or(false, |se| se.is_no_such_key()) {
                    BlobError::NotFound(name.to_string())
                } else {
                    BlobError::S3(format!("download '{name}' failed: {e}"))
                }
            })?;

        let content = object
            .body
            .collect()
            .await
            .map_err(|e| BlobError::S3(format!("reading '{name}' failed: {e}")))?;
        Ok(content.into_bytes())
    }

    async fn upload(&self, name: &str, content: Bytes) -> Result<(), BlobError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| BlobError::S3(format!("upload '{name}' failed: {e}")))?;

        info!("Uploaded s3://{}/{}", self.bucket, name);
        Ok(())
    }
}
