//! Persistent settings store backing the domain registry.
//!
//! One JSON document per installation: the ordered `domains` collection plus
//! a flat namespace of scalar configuration values. The file is re-read
//! around every operation rather than cached; a corrupt document is discarded
//! with a one-time warning instead of crash-looping.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::registry::DomainRecord;

/// Errors that can occur while reading or writing the settings document.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk document shape: the domain collection plus scalar settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub domains: Vec<DomainRecord>,
    #[serde(flatten)]
    pub scalars: BTreeMap<String, Value>,
}

/// Result of loading the store, carrying any recovery notices for display.
#[derive(Debug, Clone)]
pub struct StoreLoad {
    pub document: StoreDocument,
    pub warnings: Vec<String>,
}

/// Handle on the settings document at a fixed path.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the document from disk.
    ///
    /// A missing file is an empty document. A file that no longer parses is
    /// deleted and replaced with an empty document; the loss is reported
    /// through `warnings` so the caller can surface it once.
    pub fn load(&self) -> Result<StoreLoad, StoreError> {
        if !self.path.exists() {
            return Ok(StoreLoad {
                document: StoreDocument::default(),
                warnings: Vec::new(),
            });
        }

        let raw = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<StoreDocument>(&raw) {
            Ok(document) => Ok(StoreLoad {
                document,
                warnings: Vec::new(),
            }),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "settings store unreadable, discarding");
                if let Err(remove_err) = fs::remove_file(&self.path) {
                    warn!(path = %self.path.display(), error = %remove_err, "could not delete corrupt settings store");
                }
                Ok(StoreLoad {
                    document: StoreDocument::default(),
                    warnings: vec![format!(
                        "Settings at {} were unreadable ({err}) and have been reset.",
                        self.path.display()
                    )],
                })
            }
        }
    }

    /// Persist the document, creating parent directories on demand.
    ///
    /// Writes go through a sibling temp file and a rename so a crash cannot
    /// leave a half-written document behind.
    pub fn save(&self, document: &StoreDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(document)?;
        let temp_path = build_temp_path(&self.path);
        fs::write(&temp_path, format!("{serialized}\n"))?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

fn build_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => {
            temp_path.set_extension(format!("{ext}.tmp"));
        }
        _ => {
            temp_path.set_extension("tmp");
        }
    }
    temp_path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join("config").join("domains.json"))
    }

    #[test]
    fn missing_file_loads_as_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let load = store.load().unwrap();
        assert!(load.document.domains.is_empty());
        assert!(load.warnings.is_empty());
    }

    #[test]
    fn document_round_trips_domains_and_scalars() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut document = StoreDocument::default();
        document.domains.push(
            serde_json::from_value(serde_json::json!({
                "url": "https://chat.example.com",
                "alias": "Example",
                "icon": "icons/default-organization.png"
            }))
            .unwrap(),
        );
        document
            .scalars
            .insert("lastActiveTab".to_string(), Value::from(2));
        store.save(&document).unwrap();

        let load = store.load().unwrap();
        assert_eq!(load.document.domains.len(), 1);
        assert_eq!(load.document.domains[0].url, "https://chat.example.com");
        assert_eq!(
            load.document.scalars.get("lastActiveTab"),
            Some(&Value::from(2))
        );
    }

    #[test]
    fn scalars_survive_alongside_the_domains_array() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut document = StoreDocument::default();
        document
            .scalars
            .insert("proxyRules".to_string(), Value::from("socks5://127.0.0.1"));
        store.save(&document).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["proxyRules"], "socks5://127.0.0.1");
        assert!(parsed["domains"].as_array().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_is_discarded_with_one_warning() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();

        let load = store.load().unwrap();
        assert!(load.document.domains.is_empty());
        assert_eq!(load.warnings.len(), 1);
        assert!(!store.path().exists(), "corrupt file should be deleted");

        // The next load is clean.
        let second = store.load().unwrap();
        assert!(second.warnings.is_empty());
    }

    #[test]
    fn records_without_ids_acquire_one_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            r#"{"domains":[{"url":"https://chat.example.com","alias":"Example","icon":"icons/default-organization.png"}]}"#,
        )
        .unwrap();

        let load = store.load().unwrap();
        assert!(!load.document.domains[0].id.is_empty());
    }
}
