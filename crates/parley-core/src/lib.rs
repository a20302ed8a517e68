//! Domain registry and verification engine for the Parley desktop shell.
//!
//! Owns the persisted list of connected chat organizations: canonicalizing
//! user input, verifying candidate servers over the network, caching their
//! icons locally, and reconciling the on-disk collection across the shell's
//! concurrent callers.

pub mod bootstrap;
pub mod error;
pub mod icon;
pub mod logging;
pub mod normalize;
pub mod registry;
pub mod store;
pub mod verify;

pub use bootstrap::{BootstrapReport, import_preset_organizations};
pub use error::RegistryError;
pub use icon::{DEFAULT_ICON, IconFetcher};
pub use logging::{LoggingDestination, LoggingError, current_log_path, init_logging};
pub use normalize::normalize_server_url;
pub use registry::{DomainRecord, DomainRegistry, LAST_ACTIVE_TAB_KEY, TrustPrompt};
pub use store::{SettingsStore, StoreDocument, StoreError, StoreLoad};
pub use verify::{DEV_DOMAIN_WHITELIST, FailureReason, ServerVerifier, VerifyFailure};
