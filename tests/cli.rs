//! Exit-code behaviour of the bucketctl binary for invocations that must be
//! rejected before any provider client is built.

use std::process::{Command, Output};

fn bucketctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bucketctl"))
        .args(args)
        .env_remove("BUCKETCTL_CONFIG_FILE")
        .env_remove("BUCKETCTL_PROVIDER")
        .env_remove("BUCKETCTL_AZURE_STORAGE_ACCOUNT")
        .env_remove("AZURE_STORAGE_ACCOUNT")
        .env_remove("BUCKETCTL_GCP_PROJECT")
        .env_remove("GOOGLE_CLOUD_PROJECT")
        .output()
        .expect("failed to spawn bucketctl")
}

#[test]
fn unknown_action_exits_one_without_provider_calls() {
    let output = bucketctl(&["bogus", "test-bucket"]);
    assert_eq!(output.status.code(), Some(1));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stdout.contains("Provider:"), "provider setup was reached: {stdout}");
    assert!(stderr.contains("invalid action 'bogus'"), "{stderr}");
}

#[test]
fn missing_bucket_name_exits_one() {
    let output = bucketctl(&["create"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn no_arguments_exits_one() {
    let output = bucketctl(&[]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn help_exits_zero() {
    let output = bucketctl(&["--help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("storage account"));
}

#[test]
fn azure_without_storage_account_fails() {
    let output = bucketctl(&["--provider", "azure", "check", "container"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("storage account is required"));
}

#[test]
fn unreadable_config_file_fails() {
    let output = bucketctl(&["--config", "/nonexistent/bucketctl.toml", "list"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Configuration error"));
}
