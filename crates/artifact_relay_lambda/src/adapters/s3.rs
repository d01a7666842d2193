use std::future::Future;
use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, Error as DeleteError, ObjectIdentifier};

use crate::adapters::object_store::{ArtifactStore, BucketContents};
use crate::runtime::contract::UploadError;

pub const STORAGE_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DELETE_BATCH_SIZE: usize = 1_000;

pub async fn load_aws_config() -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(STORAGE_OPERATION_TIMEOUT)
                .build(),
        )
        .load()
        .await
}

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

/// Writes relayed artifacts into a single destination bucket.
#[derive(Debug, Clone)]
pub struct S3ArtifactStore {
    bucket: String,
    s3_client: aws_sdk_s3::Client,
}

impl S3ArtifactStore {
    pub fn new(bucket: impl Into<String>, s3_client: aws_sdk_s3::Client) -> Self {
        Self {
            bucket: bucket.into(),
            s3_client,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl ArtifactStore for S3ArtifactStore {
    fn put_object(&self, key: &str, body: &[u8]) -> Result<(), UploadError> {
        let request = self
            .s3_client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body.to_vec()));

        block_on(async move {
            request
                .send()
                .await
                .map(|_| ())
                .map_err(|error| UploadError::new(DisplayErrorContext(&error).to_string()))
        })
    }
}

#[derive(Debug, Clone)]
pub struct S3BucketContents {
    s3_client: aws_sdk_s3::Client,
}

impl S3BucketContents {
    pub fn new(s3_client: aws_sdk_s3::Client) -> Self {
        Self { s3_client }
    }

    async fn list_all_keys(&self, bucket: &str) -> Result<Vec<String>, String> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.s3_client.list_objects_v2().bucket(bucket);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let output = request
                .send()
                .await
                .map_err(|error| {
                    format!(
                        "failed to list objects in {bucket}: {}",
                        DisplayErrorContext(&error)
                    )
                })?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match next_page_token(output.is_truncated(), output.next_continuation_token())? {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<usize, String> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| format!("invalid object identifier: {error}"))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|error| format!("invalid delete request: {error}"))?;

        let output = self
            .s3_client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|error| {
                format!(
                    "failed to delete objects from {bucket}: {}",
                    DisplayErrorContext(&error)
                )
            })?;

        ensure_all_deleted(bucket, output.errors())?;
        Ok(keys.len())
    }
}

/// A truncated listing must carry a token, otherwise paging would restart.
fn next_page_token(
    is_truncated: Option<bool>,
    next_token: Option<&str>,
) -> Result<Option<String>, String> {
    match (is_truncated, next_token) {
        (Some(true), Some(token)) => Ok(Some(token.to_string())),
        (Some(true), None) => {
            Err("truncated object listing returned no continuation token".to_string())
        }
        _ => Ok(None),
    }
}

fn ensure_all_deleted(bucket: &str, errors: &[DeleteError]) -> Result<(), String> {
    if errors.is_empty() {
        return Ok(());
    }

    let details = errors
        .iter()
        .map(|error| {
            format!(
                "{} ({})",
                error.key().unwrap_or("<unknown key>"),
                error.code().unwrap_or("<unknown code>")
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    Err(format!(
        "failed to delete {} objects from {bucket}: {details}",
        errors.len()
    ))
}

impl BucketContents for S3BucketContents {
    fn list_keys(&self, bucket: &str) -> Result<Vec<String>, String> {
        block_on(self.list_all_keys(bucket))
    }

    fn delete_keys(&self, bucket: &str, keys: &[String]) -> Result<usize, String> {
        block_on(async {
            let mut deleted = 0usize;
            for batch in keys.chunks(DELETE_BATCH_SIZE) {
                deleted += self.delete_batch(bucket, batch).await?;
            }
            Ok(deleted)
        })
    }
}
