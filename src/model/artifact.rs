//! Model Artifact Loading
//!
//! Downloads the serialized forest from object storage into a scratch file,
//! loads it and removes the scratch copy. Any failure here is fatal to
//! startup: there is no retry and no fallback model.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use sha2::{Digest, Sha256};

use super::forest::ForestModel;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Failed to load machine learning model from AWS S3: {0}")]
    Unavailable(String),

    #[error("Model scratch file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model artifact is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Model artifact is malformed: {0}")]
    Malformed(String),
}

/// Read-only view of an object store bucket
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ArtifactError>;
}

/// S3 client built from static credentials
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub fn new(region: &str, access_key_id: &str, secret_access_key: &str) -> Self {
        let credentials = Credentials::new(access_key_id, secret_access_key, None, None, "environment");

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ArtifactError> {
        tracing::info!("Attempting to connect to S3 bucket: {}", bucket);

        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ArtifactError::Unavailable(DisplayErrorContext(&e).to_string()))?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| ArtifactError::Unavailable(e.to_string()))?;

        Ok(body.into_bytes().to_vec())
    }
}

/// Model ready for serving, plus where it came from
#[derive(Debug)]
pub struct LoadedModel {
    pub model: ForestModel,
    /// Object key, reported as the job's model version
    pub version: String,
    /// Hex SHA-256 of the artifact bytes
    pub checksum: String,
}

/// Fetch `bucket/key` through `scratch_path` and deserialize it
pub async fn load_model(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    scratch_path: &Path,
) -> Result<LoadedModel, ArtifactError> {
    let bytes = store.get_object(bucket, key).await?;
    tracing::info!("Model '{}' successfully downloaded from S3 ({} bytes)", key, bytes.len());

    let read_back = match tokio::fs::write(scratch_path, &bytes).await {
        Ok(()) => tokio::fs::read(scratch_path).await,
        Err(e) => Err(e),
    };
    // The scratch copy goes away whether or not it was fully written or loads
    match tokio::fs::remove_file(scratch_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove model scratch file {}: {}", scratch_path.display(), e),
    }
    let data = read_back?;

    let checksum = format!("{:x}", Sha256::digest(&data));
    let model: ForestModel = serde_json::from_slice(&data)?;
    model.check().map_err(ArtifactError::Malformed)?;

    tracing::info!("Model loaded: {} trees", model.trees.len());

    Ok(LoadedModel {
        model,
        version: key.to_string(),
        checksum,
    })
}
