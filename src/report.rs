//! Human-readable rendering of action outcomes

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::lifecycle::{Action, Outcome};

const NOT_AVAILABLE: &str = "n/a";

fn timestamp(value: Option<&DateTime<Utc>>) -> String {
    value
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Created { name, location } => match location {
                Some(location) => write!(f, "Bucket {} created successfully in {}", name, location),
                None => write!(f, "Bucket {} created successfully", name),
            },
            Outcome::AlreadyInDesiredState { name, action } => match action {
                Action::Delete => write!(f, "Bucket {} does not exist. Skipping deletion.", name),
                _ => write!(f, "Bucket {} already exists. Skipping creation.", name),
            },
            Outcome::Deleted {
                name,
                objects_removed,
                purge_warning,
            } => {
                if let Some(warning) = purge_warning {
                    writeln!(f, "Warning: could not delete objects: {}", warning)?;
                } else if *objects_removed > 0 {
                    writeln!(f, "Deleted {} objects from bucket.", objects_removed)?;
                }
                write!(f, "Bucket {} deleted successfully.", name)
            }
            Outcome::Found(info) => {
                writeln!(f, "Bucket {} exists", info.name)?;
                writeln!(
                    f,
                    "   Location: {}",
                    info.location.as_deref().unwrap_or(NOT_AVAILABLE)
                )?;
                writeln!(
                    f,
                    "   Storage Class: {}",
                    info.storage_class.as_deref().unwrap_or(NOT_AVAILABLE)
                )?;
                write!(f, "   Created: {}", timestamp(info.created.as_ref()))
            }
            Outcome::Absent { name } => write!(f, "Bucket {} does not exist", name),
            Outcome::Listed(buckets) => {
                if buckets.is_empty() {
                    return write!(f, "   No buckets found");
                }
                let rows: Vec<String> = buckets
                    .iter()
                    .map(|b| {
                        let created = b
                            .created
                            .map(|c| c.format("%Y-%m-%d").to_string())
                            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
                        format!("   {} - Created: {}", b.name, created)
                    })
                    .collect();
                write!(f, "{}", rows.join("\n"))
            }
        }
    }
}
