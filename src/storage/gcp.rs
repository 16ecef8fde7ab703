//! Google Cloud Storage provider implementation
//!
//! Bucket calls use the google-cloud-storage `StorageControl` client with:
//! - Application Default Credentials (ADC) / Workload Identity
//! - Service account JSON key file
//! - Service account JSON key as string
//!
//! Service account keys are parsed in process and handed to both clients,
//! never written to disk. Bucket contents are removed through
//! object_store::gcp::GoogleCloudStorage.

use async_trait::async_trait;
use google_cloud_auth::credentials::service_account;
use google_cloud_auth::credentials::Credentials;
use google_cloud_gax::error::rpc::Code;
use google_cloud_gax::paginator::ItemPaginator;
use google_cloud_gax::retry_policy::NeverRetry;
use google_cloud_storage::client::StorageControl;
use google_cloud_storage::model::Bucket;
use object_store::gcp::GoogleCloudStorageBuilder;

use crate::config::GcpConfig;
use crate::errors::ProviderError;
use crate::storage::{
    empty_store, from_unix, single_attempt, BucketInfo, BucketProvider, BucketSpec, BucketSummary,
    ClientContext,
};

const PROVIDER: &str = "gcp";

/// Google Cloud Storage provider
pub struct GcpProvider {
    client: StorageControl,
    project_id: Option<String>,
    service_account_key: Option<String>,
}

impl GcpProvider {
    /// Create a new Cloud Storage provider
    ///
    /// Supports multiple authentication modes:
    /// 1. Managed identity (default): Application Default Credentials
    /// 2. Service account file: service_account_path
    /// 3. Service account key: service_account_key (JSON string)
    ///
    /// The project comes from the account context, falling back to config.
    pub async fn new(config: &GcpConfig, ctx: &ClientContext) -> Result<Self, ProviderError> {
        let service_account_key = service_account_key(config)?;

        let mut builder = StorageControl::builder().with_retry_policy(NeverRetry);
        if let Some(key) = &service_account_key {
            builder = builder.with_credentials(credentials_from_key(key)?);
        }
        let client = builder
            .build()
            .await
            .map_err(|e| ProviderError::api(PROVIDER, e))?;

        Ok(Self {
            client,
            project_id: ctx.account.clone().or_else(|| config.project_id.clone()),
            service_account_key,
        })
    }

    fn project(&self) -> Result<&str, ProviderError> {
        self.project_id
            .as_deref()
            .ok_or(ProviderError::MissingContext {
                provider: PROVIDER,
                what: "project id",
            })
    }
}

/// Service account key JSON, or `None` for Application Default Credentials
fn service_account_key(config: &GcpConfig) -> Result<Option<String>, ProviderError> {
    if config.use_managed_identity {
        return Ok(None);
    }
    if let Some(path) = &config.service_account_path {
        let key = std::fs::read_to_string(path).map_err(|e| ProviderError::Api {
            provider: PROVIDER,
            message: format!("cannot read service account key {}: {}", path, e),
        })?;
        return Ok(Some(key));
    }
    match &config.service_account_key {
        Some(key) => Ok(Some(key.clone())),
        None => Err(ProviderError::MissingContext {
            provider: PROVIDER,
            what: "service_account_path or service_account_key",
        }),
    }
}

fn credentials_from_key(key: &str) -> Result<Credentials, ProviderError> {
    let value: serde_json::Value = serde_json::from_str(key).map_err(|e| ProviderError::api(PROVIDER, e))?;
    service_account::Builder::new(value)
        .build()
        .map_err(|e| ProviderError::api(PROVIDER, e))
}

fn bucket_path(name: &str) -> String {
    format!("projects/_/buckets/{}", name)
}

/// Short bucket id from a `projects/_/buckets/{id}` resource name
fn bucket_id(bucket: &Bucket) -> String {
    if !bucket.bucket_id.is_empty() {
        return bucket.bucket_id.clone();
    }
    bucket
        .name
        .rsplit_once("/buckets/")
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| bucket.name.clone())
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn is_code(err: &google_cloud_storage::Error, code: Code, http: u16) -> bool {
    err.status().is_some_and(|s| s.code == code) || err.http_status_code() == Some(http)
}

/// Normalize a failed bucket call on `name`
fn map_error(err: google_cloud_storage::Error, name: &str) -> ProviderError {
    if is_code(&err, Code::AlreadyExists, 409) {
        ProviderError::AlreadyExists {
            provider: PROVIDER,
            name: name.to_string(),
        }
    } else if is_code(&err, Code::NotFound, 404) {
        ProviderError::NotFound {
            provider: PROVIDER,
            name: name.to_string(),
        }
    } else {
        ProviderError::api(PROVIDER, err)
    }
}

#[async_trait]
impl BucketProvider for GcpProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn exists(&self, name: &str) -> Result<bool, ProviderError> {
        Ok(self.describe(name).await?.is_some())
    }

    async fn create_bucket(&self, spec: &BucketSpec) -> Result<(), ProviderError> {
        let project = self.project()?;
        let mut bucket = Bucket::new()
            .set_project(format!("projects/{}", project))
            .set_storage_class(spec.storage_class.clone());
        if let Some(location) = &spec.location {
            bucket = bucket.set_location(location.clone());
        }

        self.client
            .create_bucket()
            .set_parent("projects/_")
            .set_bucket_id(&spec.name)
            .set_bucket(bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| map_error(e, &spec.name))
    }

    async fn delete_bucket(&self, name: &str) -> Result<(), ProviderError> {
        self.client
            .delete_bucket()
            .set_name(bucket_path(name))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| map_error(e, name))
    }

    async fn describe(&self, name: &str) -> Result<Option<BucketInfo>, ProviderError> {
        match self
            .client
            .get_bucket()
            .set_name(bucket_path(name))
            .send()
            .await
        {
            Ok(bucket) => Ok(Some(BucketInfo {
                name: bucket_id(&bucket),
                location: non_empty(&bucket.location),
                storage_class: non_empty(&bucket.storage_class),
                created: bucket
                    .create_time
                    .as_ref()
                    .and_then(|t| from_unix(t.seconds(), t.nanos().max(0) as u32)),
            })),
            Err(err) => match map_error(err, name) {
                ProviderError::NotFound { .. } => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>, ProviderError> {
        let project = self.project()?;
        let mut buckets = self
            .client
            .list_buckets()
            .set_parent(format!("projects/{}", project))
            .by_item();

        let mut results = vec![];
        while let Some(bucket) = buckets.next().await {
            let bucket = bucket.map_err(|e| ProviderError::api(PROVIDER, e))?;
            results.push(BucketSummary {
                name: bucket_id(&bucket),
                created: bucket
                    .create_time
                    .as_ref()
                    .and_then(|t| from_unix(t.seconds(), t.nanos().max(0) as u32)),
            });
        }

        Ok(results)
    }

    async fn empty_bucket(&self, name: &str) -> Result<usize, ProviderError> {
        let mut builder = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(name)
            .with_retry(single_attempt());
        if let Some(key) = &self.service_account_key {
            builder = builder.with_service_account_key(key);
        }
        let store = builder.build()?;
        Ok(empty_store(&store).await?)
    }
}
