//! Bucket lifecycle actions
//!
//! Every action is a single linear sequence: an existence query, then at
//! most one mutation. Provider "already exists" and "not found" responses
//! are folded into [`Outcome::AlreadyInDesiredState`] so repeated or racing
//! invocations succeed.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::errors::{BucketCtlError, Result};
use crate::storage::{BucketInfo, BucketProvider, BucketSpec, BucketSummary};

/// Action keyword from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Delete,
    Check,
    List,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Delete => "delete",
            Action::Check => "check",
            Action::List => "list",
        }
    }

    /// Whether the action operates on a named bucket
    pub fn needs_bucket(&self) -> bool {
        !matches!(self, Action::List)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = BucketCtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Action::Create),
            "delete" => Ok(Action::Delete),
            "check" => Ok(Action::Check),
            "list" => Ok(Action::List),
            other => Err(BucketCtlError::Usage(format!(
                "invalid action '{}', expected create, delete, check or list",
                other
            ))),
        }
    }
}

/// Result of a successful action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A new bucket was created
    Created {
        name: String,
        location: Option<String>,
    },
    /// Nothing to do: the bucket already exists (create) or is gone (delete)
    AlreadyInDesiredState { name: String, action: Action },
    /// The bucket was deleted
    Deleted {
        name: String,
        objects_removed: usize,
        purge_warning: Option<String>,
    },
    /// `check` found the bucket
    Found(BucketInfo),
    /// `check` did not find the bucket
    Absent { name: String },
    /// `list` result, possibly empty
    Listed(Vec<BucketSummary>),
}

/// Runs lifecycle actions against one provider
pub struct BucketManager {
    provider: Arc<dyn BucketProvider>,
    storage_class: String,
}

impl BucketManager {
    pub fn new(provider: Arc<dyn BucketProvider>, storage_class: impl Into<String>) -> Self {
        Self {
            provider,
            storage_class: storage_class.into(),
        }
    }

    /// Dispatch `action` on `bucket`
    pub async fn run(&self, action: Action, bucket: Option<&str>, location: Option<&str>) -> Result<Outcome> {
        let named = || {
            bucket.ok_or_else(|| BucketCtlError::Usage(format!("action '{}' requires a bucket name", action)))
        };
        match action {
            Action::Create => self.create(named()?, location).await,
            Action::Delete => self.delete(named()?).await,
            Action::Check => self.check(named()?).await,
            Action::List => self.list().await,
        }
    }

    /// Create `name` unless it already exists
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn create(&self, name: &str, location: Option<&str>) -> Result<Outcome> {
        if self.provider.exists(name).await? {
            info!(bucket = %name, "Bucket already exists, skipping creation");
            return Ok(Outcome::AlreadyInDesiredState {
                name: name.to_string(),
                action: Action::Create,
            });
        }

        let spec = BucketSpec {
            name: name.to_string(),
            location: location.map(str::to_string),
            storage_class: self.storage_class.clone(),
        };
        info!(bucket = %name, location = ?spec.location, storage_class = %spec.storage_class, "Creating bucket");

        match self.provider.create_bucket(&spec).await {
            Ok(()) => Ok(Outcome::Created {
                name: spec.name,
                location: spec.location,
            }),
            Err(e) if e.is_already_exists() => {
                info!(bucket = %name, "Bucket was created concurrently");
                Ok(Outcome::AlreadyInDesiredState {
                    name: spec.name,
                    action: Action::Create,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Empty and delete `name` if it exists
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn delete(&self, name: &str) -> Result<Outcome> {
        if !self.provider.exists(name).await? {
            info!(bucket = %name, "Bucket does not exist, skipping deletion");
            return Ok(Outcome::AlreadyInDesiredState {
                name: name.to_string(),
                action: Action::Delete,
            });
        }

        let (objects_removed, purge_warning) = match self.provider.empty_bucket(name).await {
            Ok(count) => {
                info!(bucket = %name, objects = count, "Emptied bucket");
                (count, None)
            }
            Err(e) => {
                warn!(bucket = %name, error = %e, "Could not empty bucket, deleting anyway");
                (0, Some(e.to_string()))
            }
        };

        match self.provider.delete_bucket(name).await {
            Ok(()) => Ok(Outcome::Deleted {
                name: name.to_string(),
                objects_removed,
                purge_warning,
            }),
            Err(e) if e.is_not_found() => {
                info!(bucket = %name, "Bucket was deleted concurrently");
                Ok(Outcome::AlreadyInDesiredState {
                    name: name.to_string(),
                    action: Action::Delete,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read-only lookup of `name`
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn check(&self, name: &str) -> Result<Outcome> {
        match self.provider.describe(name).await {
            Ok(Some(info)) => Ok(Outcome::Found(info)),
            Ok(None) => Ok(Outcome::Absent {
                name: name.to_string(),
            }),
            Err(e) if e.is_not_found() => Ok(Outcome::Absent {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Every bucket visible to the credentials
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn list(&self) -> Result<Outcome> {
        let buckets = self.provider.list_buckets().await?;
        info!(count = buckets.len(), "Listed buckets");
        Ok(Outcome::Listed(buckets))
    }
}
