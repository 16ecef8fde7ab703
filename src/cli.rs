//! Command-line surface
//!
//! `bucketctl [--provider P] [--config FILE] <action> <bucket_name> [<location>] [<account>] [<region>]`
//!
//! Positional arguments are validated per action before any provider client
//! is built, so a bad invocation never reaches the network.

use clap::Parser;

use crate::config::BackendType;
use crate::errors::{BucketCtlError, Result};
use crate::lifecycle::Action;
use crate::storage::ClientContext;

/// Create, delete and inspect storage buckets on AWS S3, Google Cloud Storage and Azure Blob
#[derive(Debug, Parser)]
#[command(name = "bucketctl", version, after_help = EXAMPLES)]
pub struct Cli {
    /// Provider to talk to: aws, gcp or azure [env: BUCKETCTL_PROVIDER]
    #[arg(short, long, value_parser = parse_provider)]
    pub provider: Option<BackendType>,

    /// TOML config file [env: BUCKETCTL_CONFIG_FILE]
    #[arg(short, long)]
    pub config: Option<String>,

    /// create, delete, check or list
    pub action: String,

    /// <bucket_name> [<location>] [<account>] [<region>], or [<account>] for list
    #[arg(num_args = 0..)]
    pub args: Vec<String>,
}

const EXAMPLES: &str = "\
Account is the GCP project, the AWS profile, or the Azure storage account.

Examples:
  bucketctl --provider aws create my-bucket ap-south-1
  bucketctl --provider gcp create my-bucket US-EAST1 my-project
  bucketctl --provider azure delete my-container '' mystorageaccount
  bucketctl --provider aws check my-bucket
  bucketctl --provider gcp list my-project";

fn parse_provider(value: &str) -> std::result::Result<BackendType, String> {
    value.parse()
}

/// A validated command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub provider: Option<BackendType>,
    pub config: Option<String>,
    pub action: Action,
    pub bucket: Option<String>,
    pub location: Option<String>,
    pub account: Option<String>,
    pub region: Option<String>,
}

impl Invocation {
    /// Fill in the configured default location when none was given
    ///
    /// Must run before [`Invocation::client_context`] so the client region
    /// and the location sent on create agree.
    pub fn with_default_location(mut self, default: Option<&str>) -> Self {
        if self.location.is_none() {
            self.location = default.filter(|l| !l.is_empty()).map(str::to_string);
        }
        self
    }

    /// Scope for the provider client
    ///
    /// The client region follows the explicit region argument, then the
    /// bucket location, since S3 only accepts a location constraint that
    /// matches the signing region.
    pub fn client_context(&self) -> ClientContext {
        ClientContext {
            account: self.account.clone(),
            region: self.region.clone().or_else(|| self.location.clone()),
        }
    }
}

/// Empty strings stand for "not given" so later positionals can be reached
fn given(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

impl TryFrom<Cli> for Invocation {
    type Error = BucketCtlError;

    fn try_from(cli: Cli) -> Result<Self> {
        let action: Action = cli.action.parse()?;
        let args = cli.args;

        let (bucket, location, account, region) = if action.needs_bucket() {
            if args.is_empty() || args.len() > 4 {
                return Err(BucketCtlError::Usage(format!(
                    "action '{}' takes <bucket_name> [<location>] [<account>] [<region>], got {} argument(s)",
                    action,
                    args.len()
                )));
            }
            let bucket = given(args.first()).ok_or_else(|| BucketCtlError::Usage("bucket name must not be empty".into()))?;
            (Some(bucket), given(args.get(1)), given(args.get(2)), given(args.get(3)))
        } else {
            if args.len() > 1 {
                return Err(BucketCtlError::Usage(format!(
                    "action 'list' takes at most one argument [<account>], got {}",
                    args.len()
                )));
            }
            (None, None, given(args.first()), None)
        };

        Ok(Self {
            provider: cli.provider,
            config: cli.config,
            action,
            bucket,
            location,
            account,
            region,
        })
    }
}

/// Parse an argument vector into an [`Invocation`]
pub fn parse_from<I, T>(args: I) -> std::result::Result<Result<Invocation>, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args).map(Invocation::try_from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Invocation> {
        let mut argv = vec!["bucketctl"];
        argv.extend_from_slice(args);
        parse_from(argv).expect("clap accepts the shape")
    }

    #[test]
    fn test_create_with_all_positionals() {
        let invocation = parse(&["-p", "gcp", "create", "test-bucket", "us-east1", "proj"]).unwrap();
        assert_eq!(invocation.provider, Some(BackendType::Gcp));
        assert_eq!(invocation.action, Action::Create);
        assert_eq!(invocation.bucket.as_deref(), Some("test-bucket"));
        assert_eq!(invocation.location.as_deref(), Some("us-east1"));
        assert_eq!(invocation.account.as_deref(), Some("proj"));
        assert_eq!(invocation.region, None);
    }

    #[test]
    fn test_region_defaults_to_location() {
        let invocation = parse(&["delete", "b", "ap-south-1"]).unwrap();
        assert_eq!(
            invocation.client_context(),
            ClientContext {
                account: None,
                region: Some("ap-south-1".into())
            }
        );

        let invocation = parse(&["check", "b", "ap-south-1", "prod", "eu-west-1"]).unwrap();
        assert_eq!(invocation.client_context().region.as_deref(), Some("eu-west-1"));
        assert_eq!(invocation.client_context().account.as_deref(), Some("prod"));
    }

    #[test]
    fn test_default_location_feeds_client_region() {
        let invocation = parse(&["create", "b"])
            .unwrap()
            .with_default_location(Some("eu-central-1"));
        assert_eq!(invocation.location.as_deref(), Some("eu-central-1"));
        assert_eq!(invocation.client_context().region.as_deref(), Some("eu-central-1"));

        let invocation = parse(&["create", "b", "ap-south-1"])
            .unwrap()
            .with_default_location(Some("eu-central-1"));
        assert_eq!(invocation.client_context().region.as_deref(), Some("ap-south-1"));

        let invocation = parse(&["create", "b"]).unwrap().with_default_location(None);
        assert_eq!(invocation.client_context().region, None);
    }

    #[test]
    fn test_empty_positional_skips_location() {
        let invocation = parse(&["-p", "azure", "delete", "c", "", "acct"]).unwrap();
        assert_eq!(invocation.location, None);
        assert_eq!(invocation.account.as_deref(), Some("acct"));
    }

    #[test]
    fn test_list_takes_optional_account() {
        let invocation = parse(&["list"]).unwrap();
        assert_eq!(invocation.action, Action::List);
        assert_eq!(invocation.bucket, None);

        let invocation = parse(&["list", "my-project"]).unwrap();
        assert_eq!(invocation.account.as_deref(), Some("my-project"));

        assert!(matches!(parse(&["list", "a", "b"]), Err(BucketCtlError::Usage(_))));
    }

    #[test]
    fn test_usage_errors() {
        assert!(matches!(parse(&["bogus", "b"]), Err(BucketCtlError::Usage(_))));
        assert!(matches!(parse(&["create"]), Err(BucketCtlError::Usage(_))));
        assert!(matches!(parse(&["create", ""]), Err(BucketCtlError::Usage(_))));
        assert!(matches!(
            parse(&["create", "b", "l", "a", "r", "extra"]),
            Err(BucketCtlError::Usage(_))
        ));
    }

    #[test]
    fn test_unknown_provider_is_rejected_by_clap() {
        assert!(parse_from(["bucketctl", "--provider", "ftp", "list"]).is_err());
        assert!(parse_from(["bucketctl"]).is_err());
    }
}
