//! Configuration management for bucketctl
//!
//! Supports configuration via:
//! - Environment variables (primary)
//! - Optional TOML config file (secondary)
//!
//! Environment variables take precedence over config file values, and
//! command-line flags take precedence over both (applied in `main`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{BucketCtlError, Result};

/// Storage provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// AWS S3
    Aws,
    /// Azure Blob Storage
    Azure,
    /// Google Cloud Storage
    Gcp,
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Aws => "aws",
            BackendType::Azure => "azure",
            BackendType::Gcp => "gcp",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aws" | "s3" => Ok(BackendType::Aws),
            "azure" | "az" => Ok(BackendType::Azure),
            "gcp" | "gcs" | "google" => Ok(BackendType::Gcp),
            _ => Err(format!("Unknown provider type: {}", s)),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Values applied when the command line leaves them out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Location/region for new buckets
    #[serde(default)]
    pub location: Option<String>,

    /// Storage class for new buckets (default: STANDARD)
    #[serde(default = "default_storage_class")]
    pub storage_class: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            location: None,
            storage_class: default_storage_class(),
        }
    }
}

fn default_storage_class() -> String {
    "STANDARD".to_string()
}

/// AWS S3 configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Client region (defaults to us-east-1)
    #[serde(default = "default_aws_region")]
    pub region: String,

    /// Endpoint URL for S3-compatible services
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Named profile from the shared AWS config files
    #[serde(default)]
    pub profile: Option<String>,

    /// Use the default credential chain (env, profile, IRSA, instance metadata)
    #[serde(default = "default_true")]
    pub use_managed_identity: bool,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_aws_region(),
            endpoint: None,
            profile: None,
            use_managed_identity: true,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

fn default_aws_region() -> String {
    "us-east-1".to_string()
}

fn default_true() -> bool {
    true
}

/// Google Cloud Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    /// Project that owns new buckets and scopes `list`
    #[serde(default)]
    pub project_id: Option<String>,

    /// Use Application Default Credentials
    #[serde(default = "default_true")]
    pub use_managed_identity: bool,

    /// Service account JSON key file
    #[serde(default)]
    pub service_account_path: Option<String>,

    /// Service account JSON key as a string
    #[serde(default)]
    pub service_account_key: Option<String>,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            use_managed_identity: true,
            service_account_path: None,
            service_account_key: None,
        }
    }
}

/// Azure Blob Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureConfig {
    /// Storage account that holds the containers
    #[serde(default)]
    pub storage_account: Option<String>,

    /// Shared access key; token credentials are used when absent
    #[serde(default)]
    pub access_key: Option<String>,

    /// Region of the storage account, echoed by `check`
    #[serde(default)]
    pub region: Option<String>,

    /// Blob endpoint override, e.g. an Azurite emulator URL
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider used when `--provider` is not given
    #[serde(default = "default_provider")]
    pub provider: BackendType,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub aws: AwsConfig,

    #[serde(default)]
    pub gcp: GcpConfig,

    #[serde(default)]
    pub azure: AzureConfig,

    /// Log level (default: warn)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_provider() -> BackendType {
    BackendType::Aws
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            defaults: DefaultsConfig::default(),
            aws: AwsConfig::default(),
            gcp: GcpConfig::default(),
            azure: AzureConfig::default(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - BUCKETCTL_CONFIG_FILE: optional path to TOML config file
    /// - BUCKETCTL_PROVIDER: aws|gcp|azure
    /// - BUCKETCTL_LOCATION: default location for new buckets
    /// - BUCKETCTL_STORAGE_CLASS: default storage class (default: STANDARD)
    /// - BUCKETCTL_LOG_LEVEL: log level (default: warn)
    /// - BUCKETCTL_LOG_FORMAT: text|json
    /// - BUCKETCTL_AWS_REGION / BUCKETCTL_AWS_ENDPOINT / BUCKETCTL_AWS_PROFILE
    /// - BUCKETCTL_GCP_PROJECT / BUCKETCTL_GCP_SERVICE_ACCOUNT_PATH
    /// - BUCKETCTL_AZURE_STORAGE_ACCOUNT / BUCKETCTL_AZURE_ACCESS_KEY / BUCKETCTL_AZURE_REGION
    /// - BUCKETCTL_AZURE_ENDPOINT
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("BUCKETCTL_CONFIG_FILE") {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(&lookup)?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("BUCKETCTL_PROVIDER") {
            self.provider = BackendType::from_str(&provider).map_err(BucketCtlError::Config)?;
        }

        if let Some(location) = lookup("BUCKETCTL_LOCATION") {
            self.defaults.location = Some(location);
        }

        if let Some(class) = lookup("BUCKETCTL_STORAGE_CLASS") {
            self.defaults.storage_class = class;
        }

        if let Some(level) = lookup("BUCKETCTL_LOG_LEVEL") {
            self.log_level = level;
        }

        if let Some(format) = lookup("BUCKETCTL_LOG_FORMAT") {
            self.log_format = LogFormat::from_str(&format).map_err(BucketCtlError::Config)?;
        }

        if let Some(region) = lookup("BUCKETCTL_AWS_REGION") {
            self.aws.region = region;
        }

        if let Some(endpoint) = lookup("BUCKETCTL_AWS_ENDPOINT") {
            self.aws.endpoint = Some(endpoint);
        }

        if let Some(profile) = lookup("BUCKETCTL_AWS_PROFILE") {
            self.aws.profile = Some(profile);
        }

        if let Some(project) = lookup("BUCKETCTL_GCP_PROJECT").or_else(|| lookup("GOOGLE_CLOUD_PROJECT")) {
            self.gcp.project_id = Some(project);
        }

        if let Some(path) = lookup("BUCKETCTL_GCP_SERVICE_ACCOUNT_PATH") {
            self.gcp.service_account_path = Some(path);
            self.gcp.use_managed_identity = false;
        }

        if let Some(account) =
            lookup("BUCKETCTL_AZURE_STORAGE_ACCOUNT").or_else(|| lookup("AZURE_STORAGE_ACCOUNT"))
        {
            self.azure.storage_account = Some(account);
        }

        if let Some(key) = lookup("BUCKETCTL_AZURE_ACCESS_KEY") {
            self.azure.access_key = Some(key);
        }

        if let Some(region) = lookup("BUCKETCTL_AZURE_REGION") {
            self.azure.region = Some(region);
        }

        if let Some(endpoint) = lookup("BUCKETCTL_AZURE_ENDPOINT") {
            self.azure.endpoint = Some(endpoint);
        }

        Ok(())
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BucketCtlError::Config(format!("cannot read {}: {}", path, e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BucketCtlError::Config(e.to_string()))
    }
}
