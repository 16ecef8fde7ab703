//! bucketctl - create, delete, check and list cloud storage buckets
//!
//! One action per process. Exit code 0 on success (including idempotent
//! no-ops), 1 on usage errors and provider failures.

use std::process::ExitCode;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing::{error, info};

use bucketctl::cli::{Cli, Invocation};
use bucketctl::config::Config;
use bucketctl::{storage, telemetry, BucketCtlError, BucketManager};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not failures
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = match e.downcast_ref::<BucketCtlError>() {
                Some(err @ BucketCtlError::Usage(_)) => {
                    eprintln!("Error: {}", err);
                    eprintln!("{}", Cli::command().render_usage());
                    err.exit_code()
                }
                Some(err) => {
                    error!(error = %err, "Operation failed");
                    eprintln!("Error: {:#}", e);
                    err.exit_code()
                }
                None => {
                    eprintln!("Error: {:#}", e);
                    1
                }
            };
            println!("Operation failed");
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Validate the command line before touching config or credentials
    let invocation = Invocation::try_from(cli)?;

    let config_file = invocation.config.clone();
    let config = Config::from_lookup(|key| match (key, &config_file) {
        ("BUCKETCTL_CONFIG_FILE", Some(path)) => Some(path.clone()),
        _ => std::env::var(key).ok(),
    })?;
    telemetry::init(&config)?;

    let invocation = invocation.with_default_location(config.defaults.location.as_deref());
    let provider_kind = invocation.provider.unwrap_or(config.provider);

    println!("Provider: {}", provider_kind);
    println!("Action: {}", invocation.action);
    if let Some(bucket) = &invocation.bucket {
        println!("Bucket: {}", bucket);
    }
    if let Some(location) = &invocation.location {
        println!("Location: {}", location);
    }
    if let Some(account) = &invocation.account {
        println!("Account: {}", account);
    }
    println!("------------------------");

    let provider = storage::create_provider(&config, provider_kind, &invocation.client_context())
        .await
        .with_context(|| format!("failed to initialise {} client", provider_kind))?;
    info!(provider = %provider_kind, "Provider client initialized");

    let manager = BucketManager::new(provider, config.defaults.storage_class.clone());
    let outcome = manager
        .run(invocation.action, invocation.bucket.as_deref(), invocation.location.as_deref())
        .await?;

    println!("{}", outcome);
    println!("Operation completed successfully");
    Ok(())
}
