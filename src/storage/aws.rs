//! AWS S3 provider implementation
//!
//! Bucket calls use aws-sdk-s3 with the default AWS credential chain:
//! - Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY)
//! - Shared config/credentials files, optionally a named profile
//! - IRSA role annotations in Kubernetes
//! - EC2 instance metadata / ECS task role
//!
//! Bucket contents are removed with the same client, so emptying runs under
//! the same profile, credentials and retry settings as the bucket calls.

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use tracing::debug;

use crate::config::AwsConfig;
use crate::errors::ProviderError;
use crate::storage::{
    from_unix, BucketInfo, BucketProvider, BucketSpec, BucketSummary, ClientContext,
};

const PROVIDER: &str = "aws";
const DEFAULT_REGION: &str = "us-east-1";
/// DeleteObjects accepts at most this many keys per request
const DELETE_BATCH: i32 = 1000;

/// AWS S3 provider
pub struct AwsProvider {
    client: Client,
    region: String,
}

impl AwsProvider {
    /// Create a new S3 provider
    ///
    /// Supports two authentication modes:
    /// 1. Managed identity (default): default AWS credential provider chain,
    ///    scoped to the profile named by the account context if given
    /// 2. Explicit credentials: access_key_id and secret_access_key from config
    ///
    /// SDK retries are disabled; each call is attempted once.
    pub async fn new(config: &AwsConfig, ctx: &ClientContext) -> Result<Self, ProviderError> {
        let region = ctx.region.clone().unwrap_or_else(|| config.region.clone());

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .retry_config(RetryConfig::disabled());

        if let Some(profile) = ctx.account.as_ref().or(config.profile.as_ref()) {
            loader = loader.profile_name(profile);
        }

        if !config.use_managed_identity {
            match (&config.access_key_id, &config.secret_access_key) {
                (Some(access_key_id), Some(secret_access_key)) => {
                    loader = loader.credentials_provider(Credentials::new(
                        access_key_id,
                        secret_access_key,
                        None,
                        None,
                        "bucketctl",
                    ));
                }
                _ => {
                    return Err(ProviderError::MissingContext {
                        provider: PROVIDER,
                        what: "access_key_id and secret_access_key",
                    })
                }
            }
        }

        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);

        // Path-style addressing for S3-compatible services like MinIO
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self::with_client(Client::from_conf(builder.build()), region))
    }

    pub(crate) fn with_client(client: Client, region: String) -> Self {
        Self { client, region }
    }

    async fn creation_date(&self, name: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>, ProviderError> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| api_error(&e))?;
        Ok(output
            .buckets()
            .iter()
            .find(|b| b.name() == Some(name))
            .and_then(|b| b.creation_date())
            .and_then(|d| from_unix(d.secs(), d.subsec_nanos())))
    }

    async fn delete_batch(&self, bucket: &str, objects: Vec<ObjectIdentifier>) -> Result<usize, ProviderError> {
        let requested = objects.len();
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| ProviderError::api(PROVIDER, e))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| api_error(&e))?;

        // Quiet mode only reports the keys that could not be removed
        if let Some(failed) = output.errors().first() {
            return Err(ProviderError::Api {
                provider: PROVIDER,
                message: format!(
                    "DeleteObjects left {} of {} objects in {}: {} on {}",
                    output.errors().len(),
                    requested,
                    bucket,
                    failed.code().unwrap_or("UnknownError"),
                    failed.key().unwrap_or_default()
                ),
            });
        }
        Ok(requested)
    }
}

fn http_status<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|r| r.status().as_u16())
}

fn service_code<E, R>(err: &SdkError<E, R>) -> Option<&str>
where
    E: ProvideErrorMetadata,
{
    err.as_service_error().and_then(|e| e.code())
}

fn api_error<E, R>(err: &SdkError<E, R>) -> ProviderError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    ProviderError::api(PROVIDER, DisplayErrorContext(err))
}

/// S3 wants a location constraint everywhere except the legacy default region
fn location_constraint(location: &str) -> Option<CreateBucketConfiguration> {
    if location.is_empty() || location == DEFAULT_REGION {
        return None;
    }
    Some(
        CreateBucketConfiguration::builder()
            .location_constraint(BucketLocationConstraint::from(location))
            .build(),
    )
}

#[async_trait]
impl BucketProvider for AwsProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn exists(&self, name: &str) -> Result<bool, ProviderError> {
        match self.client.head_bucket().bucket(name).send().await {
            Ok(_) => Ok(true),
            Err(err) => match http_status(&err) {
                Some(404) => Ok(false),
                Some(403) => Err(ProviderError::AccessDenied {
                    provider: PROVIDER,
                    name: name.to_string(),
                }),
                _ if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
                _ => Err(api_error(&err)),
            },
        }
    }

    async fn create_bucket(&self, spec: &BucketSpec) -> Result<(), ProviderError> {
        let location = spec.location.as_deref().unwrap_or(&self.region);
        let mut request = self.client.create_bucket().bucket(&spec.name);
        if let Some(configuration) = location_constraint(location) {
            request = request.create_bucket_configuration(configuration);
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(err) => match service_code(&err) {
                Some("BucketAlreadyOwnedByYou") | Some("BucketAlreadyExists") => {
                    Err(ProviderError::AlreadyExists {
                        provider: PROVIDER,
                        name: spec.name.clone(),
                    })
                }
                _ => Err(api_error(&err)),
            },
        }
    }

    async fn delete_bucket(&self, name: &str) -> Result<(), ProviderError> {
        match self.client.delete_bucket().bucket(name).send().await {
            Ok(_) => Ok(()),
            Err(err) if service_code(&err) == Some("NoSuchBucket") || http_status(&err) == Some(404) => {
                Err(ProviderError::NotFound {
                    provider: PROVIDER,
                    name: name.to_string(),
                })
            }
            Err(err) => Err(api_error(&err)),
        }
    }

    async fn describe(&self, name: &str) -> Result<Option<BucketInfo>, ProviderError> {
        if !self.exists(name).await? {
            return Ok(None);
        }

        // Extra detail is informational; an existing bucket is reported even
        // when location or creation date cannot be read.
        let location = match self.client.get_bucket_location().bucket(name).send().await {
            Ok(output) => Some(
                output
                    .location_constraint()
                    .map(|c| c.as_str())
                    .filter(|c| !c.is_empty())
                    .unwrap_or(DEFAULT_REGION)
                    .to_string(),
            ),
            Err(err) => {
                debug!(bucket = %name, error = %DisplayErrorContext(&err), "GetBucketLocation failed");
                None
            }
        };

        let created = match self.creation_date(name).await {
            Ok(created) => created,
            Err(err) => {
                debug!(bucket = %name, error = %err, "ListBuckets failed");
                None
            }
        };

        Ok(Some(BucketInfo {
            name: name.to_string(),
            location,
            storage_class: None,
            created,
        }))
    }

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>, ProviderError> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| api_error(&e))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| {
                Some(BucketSummary {
                    name: b.name()?.to_string(),
                    created: b
                        .creation_date()
                        .and_then(|d| from_unix(d.secs(), d.subsec_nanos())),
                })
            })
            .collect())
    }

    async fn empty_bucket(&self, name: &str) -> Result<usize, ProviderError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(name)
            .max_keys(DELETE_BATCH)
            .into_paginator()
            .send();

        let mut removed = 0;
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| api_error(&e))?;
            let objects = page
                .contents()
                .iter()
                .filter_map(|object| object.key())
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ProviderError::api(PROVIDER, e))?;

            if !objects.is_empty() {
                removed += self.delete_batch(name, objects).await?;
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use tokio_test::{assert_err, assert_ok};

    fn provider_for(server: &Server) -> AwsProvider {
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("AKIDTEST", "secret", None, None, "test"))
            .endpoint_url(server.url())
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .build();
        AwsProvider::with_client(Client::from_conf(conf), "us-east-1".to_string())
    }

    fn bucket_path(name: &str) -> Matcher {
        Matcher::Regex(format!(r"^/{}/?(\?.*)?$", name))
    }

    fn error_body(code: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Error><Code>{}</Code><Message>test</Message><RequestId>1</RequestId></Error>"#,
            code
        )
    }

    fn spec(name: &str, location: &str) -> BucketSpec {
        BucketSpec {
            name: name.to_string(),
            location: Some(location.to_string()),
            storage_class: "STANDARD".to_string(),
        }
    }

    #[test]
    fn test_location_constraint() {
        assert!(location_constraint("us-east-1").is_none());
        assert!(location_constraint("").is_none());
        let configuration = location_constraint("ap-south-1").unwrap();
        assert_eq!(
            configuration.location_constraint().map(|c| c.as_str()),
            Some("ap-south-1")
        );
    }

    #[tokio::test]
    async fn test_exists_maps_status_codes() {
        let mut server = Server::new_async().await;
        server
            .mock("HEAD", bucket_path("present"))
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("HEAD", bucket_path("absent"))
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("HEAD", bucket_path("locked"))
            .with_status(403)
            .create_async()
            .await;

        let provider = provider_for(&server);
        assert!(provider.exists("present").await.unwrap());
        assert!(!provider.exists("absent").await.unwrap());
        assert!(matches!(
            provider.exists("locked").await,
            Err(ProviderError::AccessDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_sends_location_constraint() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("PUT", bucket_path("fresh"))
            .match_body(Matcher::Regex("<LocationConstraint>ap-south-1</LocationConstraint>".into()))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let provider = provider_for(&server);
        assert_ok!(provider.create_bucket(&spec("fresh", "ap-south-1")).await);
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_conflict_is_already_exists() {
        let mut server = Server::new_async().await;
        server
            .mock("PUT", bucket_path("mine"))
            .with_status(409)
            .with_header("content-type", "application/xml")
            .with_body(error_body("BucketAlreadyOwnedByYou"))
            .create_async()
            .await;

        let provider = provider_for(&server);
        let err = provider
            .create_bucket(&spec("mine", "us-east-1"))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_create_other_error_is_surfaced() {
        let mut server = Server::new_async().await;
        server
            .mock("PUT", bucket_path("bad"))
            .with_status(400)
            .with_header("content-type", "application/xml")
            .with_body(error_body("InvalidBucketName"))
            .create_async()
            .await;

        let provider = provider_for(&server);
        let err = assert_err!(provider.create_bucket(&spec("bad", "us-east-1")).await);
        assert!(matches!(err, ProviderError::Api { .. }));
        assert!(err.to_string().contains("InvalidBucketName"));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", bucket_path("gone"))
            .with_status(404)
            .with_header("content-type", "application/xml")
            .with_body(error_body("NoSuchBucket"))
            .create_async()
            .await;

        let provider = provider_for(&server);
        let err = provider.delete_bucket("gone").await.unwrap_err();
        assert!(err.is_not_found());
    }

    fn list_objects_path(name: &str) -> Matcher {
        Matcher::Regex(format!(r"^/{}/?\?.*list-type=2", name))
    }

    fn delete_objects_path(name: &str) -> Matcher {
        Matcher::Regex(format!(r"^/{}/?\?delete", name))
    }

    fn signed_by_test_key() -> Matcher {
        Matcher::Regex("Credential=AKIDTEST/".into())
    }

    const TWO_OBJECTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>full</Name><Prefix></Prefix><KeyCount>2</KeyCount><MaxKeys>1000</MaxKeys><IsTruncated>false</IsTruncated>
  <Contents><Key>a.txt</Key><Size>4</Size></Contents>
  <Contents><Key>nested/b.txt</Key><Size>4</Size></Contents>
</ListBucketResult>"#;

    #[tokio::test]
    async fn test_empty_bucket_is_attempted_once() {
        let mut server = Server::new_async().await;
        let listing = server
            .mock("GET", list_objects_path("full"))
            .with_status(503)
            .with_header("content-type", "application/xml")
            .with_body(error_body("SlowDown"))
            .expect(1)
            .create_async()
            .await;

        let provider = provider_for(&server);
        assert_err!(provider.empty_bucket("full").await);
        listing.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_bucket_signs_with_bucket_client_credentials() {
        let mut server = Server::new_async().await;
        let listing = server
            .mock("GET", list_objects_path("full"))
            .match_header("authorization", signed_by_test_key())
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(TWO_OBJECTS)
            .expect(1)
            .create_async()
            .await;
        let delete = server
            .mock("POST", delete_objects_path("full"))
            .match_header("authorization", signed_by_test_key())
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("<Key>a.txt</Key>".into()),
                Matcher::Regex("<Key>nested/b.txt</Key>".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(r#"<?xml version="1.0" encoding="UTF-8"?><DeleteResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"></DeleteResult>"#)
            .expect(1)
            .create_async()
            .await;

        let provider = provider_for(&server);
        assert_eq!(provider.empty_bucket("full").await.unwrap(), 2);
        listing.assert_async().await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_bucket_reports_undeleted_keys() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", list_objects_path("full"))
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(TWO_OBJECTS)
            .create_async()
            .await;
        server
            .mock("POST", delete_objects_path("full"))
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<DeleteResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Error><Key>a.txt</Key><Code>AccessDenied</Code><Message>Access Denied</Message></Error>
</DeleteResult>"#,
            )
            .create_async()
            .await;

        let provider = provider_for(&server);
        let err = assert_err!(provider.empty_bucket("full").await);
        assert!(err.to_string().contains("AccessDenied"));
    }

    #[tokio::test]
    async fn test_empty_bucket_without_objects() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", list_objects_path("bare"))
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>bare</Name><Prefix></Prefix><KeyCount>0</KeyCount><MaxKeys>1000</MaxKeys><IsTruncated>false</IsTruncated>
</ListBucketResult>"#,
            )
            .create_async()
            .await;
        let delete = server
            .mock("POST", delete_objects_path("bare"))
            .expect(0)
            .create_async()
            .await;

        let provider = provider_for(&server);
        assert_eq!(provider.empty_bucket("bare").await.unwrap(), 0);
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_buckets() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/(\?.*)?$".into()))
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<ListAllMyBucketsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Owner><ID>owner</ID></Owner>
  <Buckets>
    <Bucket><Name>alpha</Name><CreationDate>2024-01-02T03:04:05.000Z</CreationDate></Bucket>
    <Bucket><Name>beta</Name><CreationDate>2024-02-03T04:05:06.000Z</CreationDate></Bucket>
  </Buckets>
</ListAllMyBucketsResult>"#,
            )
            .create_async()
            .await;

        let provider = provider_for(&server);
        let buckets = provider.list_buckets().await.unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].name, "alpha");
        assert_eq!(
            buckets[0].created.map(|c| c.to_rfc3339()),
            Some("2024-01-02T03:04:05+00:00".to_string())
        );
    }
}
