//! Model artifact retrieval.
//!
//! An artifact reference is whatever the roster says: an `s3://bucket/key`
//! URI, an `http(s)://` URL, or a local file path. [`fetch_artifact`]
//! dispatches on the scheme; [`ArtifactStore`] is the async trait behind
//! the S3 path so it can be swapped out in tests.

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use ramp_calibrator::fetch::{BasicClient, fetch_bytes};

/// Resolves an artifact reference into its raw bytes.
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn get(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Fetches artifacts from S3 using the ambient AWS configuration (env vars,
/// instance profile, etc.) already loaded by `aws_config::load_from_env`.
pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
}

impl S3ArtifactStore {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(config),
        }
    }
}

#[async_trait::async_trait]
impl ArtifactStore for S3ArtifactStore {
    /// Fetches `reference` (an `s3://bucket/key` URI) as raw bytes.
    async fn get(&self, reference: &str) -> Result<Vec<u8>> {
        let (bucket, key) = parse_s3_uri(reference)?;

        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("S3 GetObject failed for '{reference}'"))?;

        let bytes = resp
            .body
            .collect()
            .await
            .with_context(|| format!("S3 body read failed for '{reference}'"))?;
        Ok(bytes.into_bytes().to_vec())
    }
}

fn parse_s3_uri(reference: &str) -> Result<(&str, &str)> {
    let rest = reference
        .strip_prefix("s3://")
        .ok_or_else(|| anyhow!("not an s3:// URI: '{reference}'"))?;
    rest.split_once('/')
        .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
        .ok_or_else(|| anyhow!("s3 URI missing bucket or key: '{reference}'"))
}

/// Loads a model artifact from wherever the reference points.
pub async fn fetch_artifact(reference: &str, s3: Option<&S3ArtifactStore>) -> Result<Vec<u8>> {
    debug!(reference, "Fetching model artifact");

    if reference.starts_with("s3://") {
        let store = s3.ok_or_else(|| anyhow!("s3 reference '{reference}' but no AWS config"))?;
        store.get(reference).await
    } else if reference.starts_with("http://") || reference.starts_with("https://") {
        let client = BasicClient::new();
        fetch_bytes(&client, reference).await
    } else {
        std::fs::read(reference).with_context(|| format!("reading artifact file '{reference}'"))
    }
}
