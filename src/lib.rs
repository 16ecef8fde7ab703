//! bucketctl - idempotent bucket lifecycle for cloud object stores
//!
//! Creates, deletes, checks and lists buckets/containers on AWS S3, Google
//! Cloud Storage and Azure Blob Storage. Every action checks existence first
//! and treats "already exists" / "not found" answers as success, so running
//! the same command twice is safe.

pub mod cli;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod report;
pub mod storage;
pub mod telemetry;

pub use errors::{BucketCtlError, ProviderError, Result};
pub use lifecycle::{Action, BucketManager, Outcome};
