//! In-process storage provider
//!
//! Keeps buckets in a map and their contents in object_store's `InMemory`
//! store. Every call is appended to a call log so callers can check which
//! provider operations an action issued, and in what order.

use async_trait::async_trait;
use chrono::Utc;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::ProviderError;
use crate::storage::{empty_store, BucketInfo, BucketProvider, BucketSpec, BucketSummary};

const PROVIDER: &str = "memory";

/// A provider operation as observed by [`InMemoryProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Exists(String),
    Create(String),
    Delete(String),
    Describe(String),
    List,
    Empty(String),
}

impl ProviderCall {
    /// Whether the call changes provider state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ProviderCall::Create(_) | ProviderCall::Delete(_) | ProviderCall::Empty(_)
        )
    }
}

struct Bucket {
    info: BucketInfo,
    objects: Arc<InMemory>,
}

/// Provider backed by process memory
#[derive(Default)]
pub struct InMemoryProvider {
    buckets: Mutex<BTreeMap<String, Bucket>>,
    calls: Mutex<Vec<ProviderCall>>,
    fail_next_empty: AtomicBool,
    hide_next_exists: AtomicBool,
    reject_non_empty_delete: bool,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to delete buckets that still hold objects, as S3 and GCS do
    pub fn reject_non_empty_delete(mut self) -> Self {
        self.reject_non_empty_delete = true;
        self
    }

    /// Make the next `empty_bucket` call fail before removing anything
    pub fn fail_next_empty(&self) {
        self.fail_next_empty.store(true, Ordering::SeqCst);
    }

    /// Make the next `exists` call answer the opposite of the truth, as if
    /// another client created or deleted the bucket right after the check
    pub fn race_next_exists(&self) {
        self.hide_next_exists.store(true, Ordering::SeqCst);
    }

    /// Seed an object into an existing bucket
    pub async fn put_object(&self, bucket: &str, key: &str, data: &'static [u8]) -> Result<(), ProviderError> {
        let store = self.objects(bucket)?;
        store
            .put(&Path::from(key), PutPayload::from_static(data))
            .await?;
        Ok(())
    }

    /// Number of objects currently stored in `bucket`
    pub async fn object_count(&self, bucket: &str) -> Result<usize, ProviderError> {
        use futures::TryStreamExt;
        let store = self.objects(bucket)?;
        let objects: Vec<_> = store.list(None).try_collect().await?;
        Ok(objects.len())
    }

    /// Names of all buckets, in order
    pub fn bucket_names(&self) -> Vec<String> {
        self.lock_buckets().keys().cloned().collect()
    }

    /// Snapshot of every bucket's metadata
    pub fn snapshot(&self) -> Vec<BucketInfo> {
        self.lock_buckets().values().map(|b| b.info.clone()).collect()
    }

    /// Every call made so far
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: ProviderCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    fn lock_buckets(&self) -> MutexGuard<'_, BTreeMap<String, Bucket>> {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn objects(&self, bucket: &str) -> Result<Arc<InMemory>, ProviderError> {
        self.lock_buckets()
            .get(bucket)
            .map(|b| b.objects.clone())
            .ok_or_else(|| not_found(bucket))
    }
}

fn not_found(name: &str) -> ProviderError {
    ProviderError::NotFound {
        provider: PROVIDER,
        name: name.to_string(),
    }
}

#[async_trait]
impl BucketProvider for InMemoryProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn exists(&self, name: &str) -> Result<bool, ProviderError> {
        self.record(ProviderCall::Exists(name.to_string()));
        let found = self.lock_buckets().contains_key(name);
        if self.hide_next_exists.swap(false, Ordering::SeqCst) {
            return Ok(!found);
        }
        Ok(found)
    }

    async fn create_bucket(&self, spec: &BucketSpec) -> Result<(), ProviderError> {
        self.record(ProviderCall::Create(spec.name.clone()));
        let mut buckets = self.lock_buckets();
        if buckets.contains_key(&spec.name) {
            return Err(ProviderError::AlreadyExists {
                provider: PROVIDER,
                name: spec.name.clone(),
            });
        }
        buckets.insert(
            spec.name.clone(),
            Bucket {
                info: BucketInfo {
                    name: spec.name.clone(),
                    location: spec.location.clone(),
                    storage_class: Some(spec.storage_class.clone()),
                    created: Some(Utc::now()),
                },
                objects: Arc::new(InMemory::new()),
            },
        );
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<(), ProviderError> {
        self.record(ProviderCall::Delete(name.to_string()));
        let objects = self.objects(name)?;
        if self.reject_non_empty_delete {
            use futures::StreamExt;
            if objects.list(None).next().await.is_some() {
                return Err(ProviderError::Api {
                    provider: PROVIDER,
                    message: format!("BucketNotEmpty: {} still holds objects", name),
                });
            }
        }
        self.lock_buckets()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    async fn describe(&self, name: &str) -> Result<Option<BucketInfo>, ProviderError> {
        self.record(ProviderCall::Describe(name.to_string()));
        Ok(self.lock_buckets().get(name).map(|b| b.info.clone()))
    }

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>, ProviderError> {
        self.record(ProviderCall::List);
        Ok(self
            .lock_buckets()
            .values()
            .map(|b| BucketSummary {
                name: b.info.name.clone(),
                created: b.info.created,
            })
            .collect())
    }

    async fn empty_bucket(&self, name: &str) -> Result<usize, ProviderError> {
        self.record(ProviderCall::Empty(name.to_string()));
        if self.fail_next_empty.swap(false, Ordering::SeqCst) {
            return Err(ProviderError::Api {
                provider: PROVIDER,
                message: format!("ListObjects on {} failed", name),
            });
        }
        let store = self.objects(name)?;
        Ok(empty_store(store.as_ref()).await?)
    }
}
