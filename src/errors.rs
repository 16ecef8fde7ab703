//! Error types for bucketctl
//!
//! Provides structured error handling using thiserror. Provider bindings
//! normalize their SDK errors into [`ProviderError`], so the lifecycle layer
//! can recognize "already exists" and "not found" without knowing which
//! cloud it is talking to.

use thiserror::Error;

/// Errors raised by a storage provider binding
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The resource is already there (create raced or was repeated)
    #[error("{provider}: {name} already exists")]
    AlreadyExists { provider: &'static str, name: String },

    /// The resource is not there (delete raced or was repeated)
    #[error("{provider}: {name} not found")]
    NotFound { provider: &'static str, name: String },

    /// Credentials are valid but lack permission on the resource
    #[error("{provider}: access denied to {name}")]
    AccessDenied { provider: &'static str, name: String },

    /// An account context (project, storage account) is required but absent
    #[error("{provider}: {what} is required for this action")]
    MissingContext {
        provider: &'static str,
        what: &'static str,
    },

    /// Any other provider API failure, surfaced verbatim
    #[error("{provider} API error: {message}")]
    Api {
        provider: &'static str,
        message: String,
    },

    /// Object-level operation failed while handling bucket contents
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

impl ProviderError {
    pub(crate) fn api(provider: &'static str, err: impl std::fmt::Display) -> Self {
        ProviderError::Api {
            provider,
            message: err.to_string(),
        }
    }

    /// Whether the error means the bucket already exists
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ProviderError::AlreadyExists { .. })
    }

    /// Whether the error means the bucket does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }
}

/// Main error type for bucketctl operations
#[derive(Error, Debug)]
pub enum BucketCtlError {
    /// Wrong argument count or unknown action; no provider call is made
    #[error("Usage error: {0}")]
    Usage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider operation failed
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl BucketCtlError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, BucketCtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_predicates() {
        let exists = ProviderError::AlreadyExists {
            provider: "aws",
            name: "b".into(),
        };
        let missing = ProviderError::NotFound {
            provider: "gcp",
            name: "b".into(),
        };
        assert!(exists.is_already_exists());
        assert!(!exists.is_not_found());
        assert!(missing.is_not_found());
        assert!(!ProviderError::api("azure", "boom").is_not_found());
    }

    #[test]
    fn test_provider_error_is_surfaced_verbatim() {
        let err: BucketCtlError = ProviderError::api("aws", "SlowDown: reduce request rate").into();
        assert_eq!(err.to_string(), "aws API error: SlowDown: reduce request rate");
        assert_eq!(err.exit_code(), 1);
    }
}
