//! Object storage access for the roster import services.
//!
//! Exports land in an S3-compatible bucket (GCS interop or MinIO in dev). Callers only
//! ever need "give me the bytes of this object", so that is the whole trait. A mock
//! implementation is always compiled in so service crates can use it from their tests
//! without feature flags.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::Client as AwsS3SdkClient;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum S3Error {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("S3 operation failed: {0}")]
    OperationFailed(String),
}

impl S3Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, S3Error::NotFound(_))
    }
}

#[async_trait]
pub trait S3Client: Send + Sync {
    /// Fetch the full body of `key` in `bucket`.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, S3Error>;
}

pub struct S3Impl {
    client: AwsS3SdkClient,
}

impl S3Impl {
    pub fn new(client: AwsS3SdkClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl S3Client for S3Impl {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, S3Error> {
        debug!(bucket, key, "fetching object");

        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let message = format!("failed to get {bucket}/{key}: {e}");
                match e.into_service_error() {
                    GetObjectError::NoSuchKey(_) => S3Error::NotFound(key.to_string()),
                    _ => S3Error::OperationFailed(message),
                }
            })?;

        let body = output.body.collect().await.map_err(|e| {
            S3Error::OperationFailed(format!("failed to read body of {bucket}/{key}: {e}"))
        })?;

        Ok(body.into_bytes())
    }
}

/// In-memory client for tests. Unknown keys answer `NotFound`, and every requested key
/// is recorded so tests can assert on what was (or was not) fetched.
#[derive(Clone, Default)]
pub struct MockS3Client {
    responses: HashMap<String, Result<Bytes, S3Error>>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl MockS3Client {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_object_ret(
        mut self,
        bucket: &str,
        key: &str,
        response: Result<Bytes, S3Error>,
    ) -> Self {
        self.responses.insert(format!("{bucket}:{key}"), response);
        self
    }

    /// Keys requested so far, formatted as `bucket:key`.
    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .map(|keys| keys.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl S3Client for MockS3Client {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, S3Error> {
        let cache_key = format!("{bucket}:{key}");
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(cache_key.clone());
        }
        match self.responses.get(&cache_key) {
            Some(response) => response.clone(),
            None => Err(S3Error::NotFound(key.to_string())),
        }
    }
}
