//! The domain registry: the aggregate root over the persisted collection of
//! connected chat organizations.
//!
//! The registry exclusively owns the on-disk representation. Callers hold
//! snapshots and re-fetch by position or url before destructive operations;
//! internally every index-based write resolves the record's stable id before
//! any suspension point so a concurrent removal cannot redirect the write.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RegistryError;
use crate::icon::{DEFAULT_ICON, IconFetcher};
use crate::normalize::normalize_server_url;
use crate::store::{SettingsStore, StoreDocument, StoreError};
use crate::verify::{FailureReason, ServerVerifier, VerifyFailure};

/// Scalar key remembering which tab was focused last.
pub const LAST_ACTIVE_TAB_KEY: &str = "lastActiveTab";

/// One registered chat organization.
///
/// `url` is the primary identity, compared exact-string. `id` is a stable
/// opaque identifier that survives position shifts; files written before ids
/// existed acquire one on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRecord {
    #[serde(default = "generate_record_id")]
    pub id: String,
    pub url: String,
    pub alias: String,
    pub icon: String,
    #[serde(default)]
    pub ignore_certs: bool,
    #[serde(default)]
    pub logged_in: bool,
}

fn generate_record_id() -> String {
    Uuid::new_v4().to_string()
}

impl DomainRecord {
    pub(crate) fn verified(url: String, alias: String, icon: String, ignore_certs: bool) -> Self {
        Self {
            id: generate_record_id(),
            url,
            alias,
            icon,
            ignore_certs,
            logged_in: false,
        }
    }

    /// Minimal record for whitelisted dev servers that failed verification.
    pub(crate) fn unverified(url: &str, ignore_certs: bool) -> Self {
        Self {
            id: generate_record_id(),
            url: url.to_string(),
            alias: url.to_string(),
            icon: DEFAULT_ICON.to_string(),
            ignore_certs,
            logged_in: false,
        }
    }
}

/// Blocking-style user confirmation for certificate-trust escalation.
pub trait TrustPrompt {
    fn confirm(&self, message: &str, detail: &str) -> bool;
}

/// Registry over the persisted organization collection.
///
/// Explicitly constructed and passed by reference; there is no module-level
/// instance. The backing file is re-read around every operation, so the disk
/// stays the single source of truth across interleaved callers.
#[derive(Debug, Clone)]
pub struct DomainRegistry {
    store: SettingsStore,
    verifier: ServerVerifier,
    icons: IconFetcher,
}

impl DomainRegistry {
    /// Build a registry rooted at an application data directory.
    ///
    /// The settings document lives at `<data_dir>/config/domains.json` and
    /// cached icons under `<data_dir>/server-icons`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let data_dir = data_dir.into();
        let verifier = ServerVerifier::new()?;
        let icons = IconFetcher::new(
            verifier.client(),
            verifier.insecure_client(),
            data_dir.join("server-icons"),
        );
        Ok(Self {
            store: SettingsStore::new(data_dir.join("config").join("domains.json")),
            verifier,
            icons,
        })
    }

    /// Load the store once and hand back any recovery notices for display.
    pub fn startup(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.store.load()?.warnings)
    }

    pub fn store_path(&self) -> &Path {
        self.store.path()
    }

    fn load_document(&self) -> Result<StoreDocument, RegistryError> {
        let load = self.store.load()?;
        for warning in &load.warnings {
            warn!(%warning, "settings store recovered");
        }
        Ok(load.document)
    }

    /// All registered organizations in tab order.
    pub fn list(&self) -> Result<Vec<DomainRecord>, RegistryError> {
        Ok(self.load_document()?.domains)
    }

    /// Positional read. An out-of-range index is a caller error.
    pub fn get(&self, index: usize) -> Result<DomainRecord, RegistryError> {
        let domains = self.list()?;
        let len = domains.len();
        domains
            .into_iter()
            .nth(index)
            .ok_or(RegistryError::IndexOutOfRange { index, len })
    }

    fn find_by_url(&self, url: &str) -> Result<Option<DomainRecord>, RegistryError> {
        Ok(self.list()?.into_iter().find(|record| record.url == url))
    }

    /// Whether a raw input already resolves to a registered organization.
    ///
    /// Comparison is exact-string on the normalized url; trailing slashes and
    /// scheme case are significant.
    pub fn duplicate_exists(&self, raw_url: &str) -> Result<bool, RegistryError> {
        let normalized = normalize_server_url(raw_url);
        Ok(self
            .list()?
            .iter()
            .any(|record| record.url == normalized))
    }

    /// Append a record, caching its icon locally first.
    ///
    /// A record without a usable icon gets the default sentinel and skips the
    /// network entirely. The store read happens after the icon download, so
    /// the append itself is a single synchronous operation.
    pub async fn add(&self, mut record: DomainRecord) -> Result<(), RegistryError> {
        if record.icon.is_empty() || record.icon == DEFAULT_ICON {
            record.icon = DEFAULT_ICON.to_string();
        } else {
            record.icon = self.icons.fetch_icon(&record.icon, record.ignore_certs).await;
        }

        let mut document = self.load_document()?;
        info!(url = %record.url, alias = %record.alias, "organization registered");
        document.domains.push(record);
        self.store.save(&document)?;
        Ok(())
    }

    /// Overwrite the record at a position.
    pub fn update(&self, index: usize, record: DomainRecord) -> Result<(), RegistryError> {
        let mut document = self.load_document()?;
        let len = document.domains.len();
        let slot = document
            .domains
            .get_mut(index)
            .ok_or(RegistryError::IndexOutOfRange { index, len })?;
        *slot = record;
        self.store.save(&document)?;
        Ok(())
    }

    /// Remove the record at a position, compacting the collection.
    ///
    /// Positions above `index` shift down by one; callers holding a cached
    /// last-active position must reset it afterwards.
    pub fn remove(&self, index: usize) -> Result<DomainRecord, RegistryError> {
        let mut document = self.load_document()?;
        let len = document.domains.len();
        if index >= len {
            return Err(RegistryError::IndexOutOfRange { index, len });
        }
        let removed = document.domains.remove(index);
        self.store.save(&document)?;
        info!(url = %removed.url, "organization disconnected");
        Ok(removed)
    }

    /// Verify a candidate server and produce the record that would be stored.
    ///
    /// `silent` is the background-refresh mode: the duplicate check is
    /// skipped, no trust escalation is requested, and any failure yields the
    /// previously-stored record unchanged when one exists.
    pub async fn check_domain(
        &self,
        raw_url: &str,
        ignore_certs: bool,
        silent: bool,
    ) -> Result<DomainRecord, RegistryError> {
        let url = normalize_server_url(raw_url);
        if !silent && self.duplicate_exists(&url)? {
            return Err(RegistryError::DuplicateServer { url });
        }

        match self.verifier.verify(&url, ignore_certs, silent).await {
            Ok(record) => Ok(record),
            Err(failure) => {
                if silent {
                    if let Some(existing) = self.find_by_url(&url)? {
                        debug!(url = %url, error = %failure, "silent verification failed, keeping stored record");
                        return Ok(existing);
                    }
                }
                Err(map_verify_failure(failure, url, silent))
            }
        }
    }

    /// Interactive add-flow verification.
    ///
    /// On certificate trouble the prompt decides: accept retries with
    /// validation bypassed, decline terminates the flow without touching the
    /// store.
    pub async fn check_domain_interactive(
        &self,
        raw_url: &str,
        prompt: &dyn TrustPrompt,
    ) -> Result<DomainRecord, RegistryError> {
        match self.check_domain(raw_url, false, false).await {
            Err(RegistryError::CertificateTrustRequired { url }) => {
                self.resolve_certificate_trust(raw_url, url, prompt).await
            }
            other => other,
        }
    }

    pub(crate) async fn resolve_certificate_trust(
        &self,
        raw_url: &str,
        url: String,
        prompt: &dyn TrustPrompt,
    ) -> Result<DomainRecord, RegistryError> {
        let message = format!("Do you trust the certificate presented by {url}?");
        let detail = "The server could not prove its identity. Connecting anyway \
                      exposes this organization's traffic to interception.";
        if prompt.confirm(&message, detail) {
            self.check_domain(raw_url, true, false).await
        } else {
            Err(RegistryError::UntrustedCertificate { url })
        }
    }

    /// Background re-verification of an already-registered organization.
    ///
    /// Never surfaces failures: on any error the stored record is left
    /// exactly as it was. Stale data beats a disruptive error here.
    pub async fn refresh(&self, url: &str, index: usize) {
        if let Err(err) = self.try_refresh(url, index).await {
            debug!(url, index, error = %err, "background refresh skipped");
        }
    }

    async fn try_refresh(&self, url: &str, index: usize) -> Result<(), RegistryError> {
        let existing = self.get(index)?;
        let mut fresh = self.check_domain(url, existing.ignore_certs, true).await?;
        if fresh == existing {
            // Silent verification fell back to the stored record.
            return Ok(());
        }

        fresh.id = existing.id.clone();
        fresh.logged_in = existing.logged_in;
        fresh.icon = self.icons.fetch_icon(&fresh.icon, fresh.ignore_certs).await;
        self.update_by_id(&existing.id, fresh)
    }

    fn update_by_id(&self, id: &str, record: DomainRecord) -> Result<(), RegistryError> {
        let mut document = self.load_document()?;
        match document.domains.iter_mut().find(|slot| slot.id == id) {
            Some(slot) => {
                *slot = record;
                self.store.save(&document)?;
            }
            None => debug!(id, "record disappeared during refresh, skipping update"),
        }
        Ok(())
    }

    /// Read a scalar configuration value; absent or mistyped values are None.
    pub fn setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RegistryError> {
        let document = self.load_document()?;
        Ok(document
            .scalars
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok()))
    }

    /// Write a scalar configuration value.
    pub fn set_setting<T: Serialize>(&self, key: &str, value: &T) -> Result<(), RegistryError> {
        let mut document = self.load_document()?;
        document.scalars.insert(
            key.to_string(),
            serde_json::to_value(value).map_err(StoreError::from)?,
        );
        self.store.save(&document)?;
        Ok(())
    }

    /// Which tab was focused last; 0 when unset.
    pub fn last_active_tab(&self) -> Result<usize, RegistryError> {
        Ok(self.setting(LAST_ACTIVE_TAB_KEY)?.unwrap_or(0))
    }

    pub fn set_last_active_tab(&self, index: usize) -> Result<(), RegistryError> {
        self.set_setting(LAST_ACTIVE_TAB_KEY, &index)
    }
}

fn map_verify_failure(failure: VerifyFailure, url: String, silent: bool) -> RegistryError {
    match failure {
        VerifyFailure::NoOrganizations => RegistryError::NoOrganizations { url },
        VerifyFailure::Transport { reason, .. }
            if reason == FailureReason::Certificate && !silent =>
        {
            RegistryError::CertificateTrustRequired { url }
        }
        VerifyFailure::Transport { detail, .. } => RegistryError::InvalidServer { url, detail },
    }
}
