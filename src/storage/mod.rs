//! Storage provider abstraction layer
//!
//! Provides a unified interface for bucket/container lifecycle calls against
//! AWS S3, Azure Blob Storage and Google Cloud Storage. Bucket-level calls go
//! through each vendor SDK. S3 buckets are emptied with the same SDK client;
//! GCS and Azure contents are handled through the object_store crate.
//!
//! Every client is built with retries disabled.

mod aws;
mod azure;
mod gcp;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::{ObjectStore, RetryConfig};
use std::sync::Arc;

use crate::config::{BackendType, Config};
use crate::errors::ProviderError;

pub use aws::AwsProvider;
pub use azure::AzureProvider;
pub use gcp::GcpProvider;
pub use memory::{InMemoryProvider, ProviderCall};

/// What `create` asks the provider for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSpec {
    pub name: String,
    pub location: Option<String>,
    pub storage_class: String,
}

/// Remote bucket metadata, read live from the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    pub name: String,
    pub location: Option<String>,
    pub storage_class: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

/// One row of a `list` result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSummary {
    pub name: String,
    pub created: Option<DateTime<Utc>>,
}

/// Per-invocation scope for building a provider client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    /// GCP project, AWS profile or Azure storage account
    pub account: Option<String>,
    /// Client region override
    pub region: Option<String>,
}

/// Bucket lifecycle operations for one provider account
///
/// Implementations issue exactly one SDK call per method (describe and
/// empty may need a few) and never retry. "Already exists" and "not found"
/// responses are reported as [`ProviderError::AlreadyExists`] and
/// [`ProviderError::NotFound`].
#[async_trait]
pub trait BucketProvider: Send + Sync {
    /// Short provider name used in logs
    fn name(&self) -> &'static str;

    /// Read-only existence query
    async fn exists(&self, name: &str) -> Result<bool, ProviderError>;

    /// Create a bucket
    async fn create_bucket(&self, spec: &BucketSpec) -> Result<(), ProviderError>;

    /// Delete an (empty) bucket
    async fn delete_bucket(&self, name: &str) -> Result<(), ProviderError>;

    /// Fetch metadata; `None` when the bucket does not exist
    async fn describe(&self, name: &str) -> Result<Option<BucketInfo>, ProviderError>;

    /// Enumerate buckets visible to the credentials
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>, ProviderError>;

    /// Remove every object in the bucket, returning how many were removed
    async fn empty_bucket(&self, name: &str) -> Result<usize, ProviderError>;
}

/// Create a provider client based on configuration and invocation scope
pub async fn create_provider(
    config: &Config,
    provider: BackendType,
    ctx: &ClientContext,
) -> Result<Arc<dyn BucketProvider>, ProviderError> {
    match provider {
        BackendType::Aws => {
            let provider = AwsProvider::new(&config.aws, ctx).await?;
            Ok(Arc::new(provider))
        }
        BackendType::Azure => {
            let provider = AzureProvider::new(&config.azure, ctx)?;
            Ok(Arc::new(provider))
        }
        BackendType::Gcp => {
            let provider = GcpProvider::new(&config.gcp, ctx).await?;
            Ok(Arc::new(provider))
        }
    }
}

/// Delete every object in `store`
///
/// Locations are streamed from the listing straight into `delete_stream`,
/// which batches the deletes where the backend supports it.
pub async fn empty_store(store: &dyn ObjectStore) -> Result<usize, object_store::Error> {
    let locations = store.list(None).map_ok(|meta| meta.location).boxed();
    let deleted: Vec<Path> = store.delete_stream(locations).try_collect().await?;
    Ok(deleted.len())
}

/// object_store retry settings: one attempt per request
pub(crate) fn single_attempt() -> RetryConfig {
    RetryConfig {
        max_retries: 0,
        ..Default::default()
    }
}

pub(crate) fn from_unix(secs: i64, nanos: u32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use object_store::memory::InMemory;

    #[tokio::test]
    async fn test_empty_store_removes_everything() {
        let store = InMemory::new();
        for key in ["a.txt", "nested/b.txt", "nested/deeper/c.txt"] {
            store
                .put(&Path::from(key), Bytes::from_static(b"data").into())
                .await
                .unwrap();
        }

        let removed = empty_store(&store).await.unwrap();
        assert_eq!(removed, 3);

        let remaining: Vec<_> = store.list(None).try_collect().await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_empty_store_on_empty_bucket() {
        let store = InMemory::new();
        assert_eq!(empty_store(&store).await.unwrap(), 0);
    }

    #[test]
    fn test_single_attempt_disables_retries() {
        assert_eq!(single_attempt().max_retries, 0);
    }

    #[test]
    fn test_from_unix() {
        let ts = from_unix(1_700_000_000, 0).unwrap();
        assert_eq!(ts.to_rfc3339(), "2023-11-14T22:13:20+00:00");
    }
}
