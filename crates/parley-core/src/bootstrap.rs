//! First-run provisioning of preset organizations.
//!
//! Enterprise deployments ship a list of organization URLs that should appear
//! as tabs before the user adds anything by hand. All of them verify
//! concurrently; the ones that pass are appended, the ones that fail are
//! named in the aggregate report rather than aborting the whole import.

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::registry::DomainRegistry;

/// Outcome of a preset-organization import.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub added: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BootstrapReport {
    /// Whether the shell should reload its tab set.
    pub fn changed(&self) -> bool {
        !self.added.is_empty()
    }

    /// Aggregate user-facing error naming every organization that failed.
    pub fn failure_summary(&self) -> Option<String> {
        if self.failed.is_empty() {
            return None;
        }
        let names: Vec<&str> = self.failed.iter().map(|(url, _)| url.as_str()).collect();
        Some(format!("could not add {}", names.join(", ")))
    }
}

/// Verify and register a provisioned list of organizations.
///
/// Verifications run concurrently and are joined before any append, so one
/// slow preset cannot starve the rest. Already-registered URLs are skipped,
/// and successfully verified servers are kept even when siblings fail.
pub async fn import_preset_organizations(
    registry: &DomainRegistry,
    urls: &[String],
) -> Result<BootstrapReport, RegistryError> {
    let mut report = BootstrapReport::default();
    let mut pending_urls = Vec::new();
    let mut pending = Vec::new();

    for url in urls {
        if registry.duplicate_exists(url)? {
            report.skipped.push(url.clone());
            continue;
        }
        pending_urls.push(url.clone());
        pending.push(registry.check_domain(url, false, false));
    }

    let outcomes = join_all(pending).await;
    for (url, outcome) in pending_urls.into_iter().zip(outcomes) {
        match outcome {
            Ok(record) => {
                // The list itself may contain the same organization twice;
                // re-check against the canonical url before appending.
                if registry.duplicate_exists(&record.url)? {
                    report.skipped.push(url);
                    continue;
                }
                registry.add(record).await?;
                info!(url = %url, "preset organization added");
                report.added.push(url);
            }
            Err(err) => {
                warn!(url = %url, error = %err, "preset organization failed verification");
                report.failed.push((url, err.to_string()));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_changes_nothing() {
        let report = BootstrapReport::default();
        assert!(!report.changed());
        assert!(report.failure_summary().is_none());
    }

    #[test]
    fn failure_summary_names_every_failed_organization() {
        let report = BootstrapReport {
            added: vec!["https://ok.example".to_string()],
            skipped: Vec::new(),
            failed: vec![
                ("https://a.example".to_string(), "unreachable".to_string()),
                ("https://b.example".to_string(), "no organizations".to_string()),
            ],
        };
        let summary = report.failure_summary().unwrap();
        assert!(summary.contains("https://a.example"));
        assert!(summary.contains("https://b.example"));
        assert!(report.changed());
    }
}
