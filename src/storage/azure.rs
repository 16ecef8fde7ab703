//! Azure Blob Storage provider implementation
//!
//! Containers live inside an existing storage account, named by the
//! account context. Authentication uses either the account access key or
//! a token credential from azure_identity, which discovers credentials from:
//! - Environment variables (AZURE_CLIENT_ID, AZURE_TENANT_ID, etc.)
//! - Managed identity endpoint (in Azure VMs/containers)
//! - Azure CLI credentials
//!
//! Container contents are removed through object_store::azure::MicrosoftAzure,
//! signed with the same key or token credential as the container calls.

use async_trait::async_trait;
use azure_core::auth::TokenCredential;
use azure_core::error::ErrorKind;
use azure_core::RetryOptions;
use azure_identity::DefaultAzureCredentialBuilder;
use azure_storage::{CloudLocation, StorageCredentials};
use azure_storage_blobs::container::Container;
use azure_storage_blobs::prelude::{BlobServiceClient, ClientBuilder};
use futures::StreamExt;
use object_store::azure::{AzureCredential, MicrosoftAzure, MicrosoftAzureBuilder};
use object_store::CredentialProvider;
use std::sync::Arc;

use crate::config::AzureConfig;
use crate::errors::ProviderError;
use crate::storage::{
    empty_store, from_unix, single_attempt, BucketInfo, BucketProvider, BucketSpec, BucketSummary,
    ClientContext,
};

const PROVIDER: &str = "azure";
const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

#[derive(Clone)]
enum Auth {
    AccessKey(String),
    Token(Arc<dyn TokenCredential>),
}

/// Azure Blob Storage provider
pub struct AzureProvider {
    service: BlobServiceClient,
    account: String,
    auth: Auth,
    endpoint: Option<String>,
    region: Option<String>,
}

impl AzureProvider {
    /// Create a new Blob Storage provider for one storage account
    pub fn new(config: &AzureConfig, ctx: &ClientContext) -> Result<Self, ProviderError> {
        let account = ctx
            .account
            .clone()
            .or_else(|| config.storage_account.clone())
            .ok_or(ProviderError::MissingContext {
                provider: PROVIDER,
                what: "storage account",
            })?;

        let auth = match &config.access_key {
            Some(key) => Auth::AccessKey(key.clone()),
            None => Auth::Token(Arc::new(DefaultAzureCredentialBuilder::new().build())),
        };

        Ok(Self::with_auth(account, auth, config))
    }

    fn with_auth(account: String, auth: Auth, config: &AzureConfig) -> Self {
        let credentials = match &auth {
            Auth::AccessKey(key) => StorageCredentials::access_key(account.clone(), key.clone()),
            Auth::Token(credential) => StorageCredentials::token_credential(credential.clone()),
        };

        let mut builder = ClientBuilder::new(account.clone(), credentials).retry(RetryOptions::none());
        if let Some(endpoint) = &config.endpoint {
            builder = builder.cloud_location(CloudLocation::Custom {
                account: account.clone(),
                uri: endpoint.clone(),
            });
        }

        Self {
            service: builder.blob_service_client(),
            account,
            auth,
            endpoint: config.endpoint.clone(),
            region: config.region.clone(),
        }
    }

    /// object_store view of one container, sharing this provider's credentials
    fn store(&self, container: &str) -> Result<MicrosoftAzure, ProviderError> {
        let mut builder = MicrosoftAzureBuilder::new()
            .with_account(&self.account)
            .with_container_name(container)
            .with_retry(single_attempt());

        if let Some(endpoint) = &self.endpoint {
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(endpoint.starts_with("http://"));
        }

        builder = match &self.auth {
            Auth::AccessKey(key) => builder.with_access_key(key),
            Auth::Token(credential) => builder.with_credentials(Arc::new(TokenBridge {
                credential: credential.clone(),
            })),
        };

        Ok(builder.build()?)
    }
}

/// Feeds azure_identity tokens to object_store
#[derive(Debug)]
struct TokenBridge {
    credential: Arc<dyn TokenCredential>,
}

#[async_trait]
impl CredentialProvider for TokenBridge {
    type Credential = AzureCredential;

    async fn get_credential(&self) -> object_store::Result<Arc<AzureCredential>> {
        let token = self
            .credential
            .get_token(&[STORAGE_SCOPE])
            .await
            .map_err(|e| object_store::Error::Generic {
                store: "MicrosoftAzure",
                source: Box::new(e),
            })?;
        Ok(Arc::new(AzureCredential::BearerToken(
            token.token.secret().to_string(),
        )))
    }
}

/// HTTP status and service error code of a failed response
fn response_error(err: &azure_core::Error) -> Option<(u16, Option<&str>)> {
    match err.kind() {
        ErrorKind::HttpResponse { status, error_code } => {
            Some((*status as u16, error_code.as_deref()))
        }
        _ => None,
    }
}

/// Normalize a failed container call on `name`
fn map_error(err: azure_core::Error, name: &str) -> ProviderError {
    match response_error(&err) {
        Some((_, Some("ContainerAlreadyExists"))) | Some((409, None)) => ProviderError::AlreadyExists {
            provider: PROVIDER,
            name: name.to_string(),
        },
        Some((_, Some("ContainerNotFound"))) | Some((404, _)) => ProviderError::NotFound {
            provider: PROVIDER,
            name: name.to_string(),
        },
        _ => ProviderError::api(PROVIDER, err),
    }
}

fn created(container: &Container) -> Option<chrono::DateTime<chrono::Utc>> {
    from_unix(
        container.last_modified.unix_timestamp(),
        container.last_modified.nanosecond(),
    )
}

#[async_trait]
impl BucketProvider for AzureProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn exists(&self, name: &str) -> Result<bool, ProviderError> {
        self.service
            .container_client(name)
            .exists()
            .await
            .map_err(|e| ProviderError::api(PROVIDER, e))
    }

    async fn create_bucket(&self, spec: &BucketSpec) -> Result<(), ProviderError> {
        self.service
            .container_client(&spec.name)
            .create()
            .await
            .map_err(|e| map_error(e, &spec.name))
    }

    async fn delete_bucket(&self, name: &str) -> Result<(), ProviderError> {
        self.service
            .container_client(name)
            .delete()
            .await
            .map_err(|e| map_error(e, name))
    }

    async fn describe(&self, name: &str) -> Result<Option<BucketInfo>, ProviderError> {
        match self.service.container_client(name).get_properties().await {
            Ok(response) => Ok(Some(BucketInfo {
                name: response.container.name.clone(),
                location: self.region.clone(),
                storage_class: None,
                created: created(&response.container),
            })),
            Err(err) => match map_error(err, name) {
                ProviderError::NotFound { .. } => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>, ProviderError> {
        let mut pages = self.service.list_containers().into_stream();
        let mut results = vec![];

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| ProviderError::api(PROVIDER, e))?;
            results.extend(page.containers.iter().map(|c| BucketSummary {
                name: c.name.clone(),
                created: created(c),
            }));
        }

        Ok(results)
    }

    async fn empty_bucket(&self, name: &str) -> Result<usize, ProviderError> {
        let store = self.store(name)?;
        Ok(empty_store(&store).await?)
    }
}
