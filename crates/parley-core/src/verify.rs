//! Network verification of candidate chat servers.
//!
//! A candidate is valid when its settings endpoint answers 200 with a payload
//! naming a realm icon. The record stored afterwards uses the canonical
//! origin the server reports about itself, which may differ from what the
//! user typed.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::registry::DomainRecord;

/// Dev hosts accepted as organizations even when verification fails.
/// Certificate failures are never waved through, whitelisted or not.
pub const DEV_DOMAIN_WHITELIST: &[&str] = &["parleydev.org", "parleydev.com"];

pub(crate) const SETTINGS_ENDPOINT: &str = "/api/v1/server_settings";

const USER_AGENT: &str = concat!("parley-core/", env!("CARGO_PKG_VERSION"));

/// Where a verification failure originated.
///
/// Decided once, at the transport boundary, so callers branch on a typed tag
/// instead of re-inspecting error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// TLS certificate validation rejected the server.
    Certificate,
    /// The server could not be reached at all.
    Network,
    /// The server answered, but not like a chat server: bad status or
    /// unparseable payload.
    Protocol,
}

/// A verification attempt that did not produce a record.
#[derive(Debug, Error)]
pub enum VerifyFailure {
    #[error("{detail}")]
    Transport {
        reason: FailureReason,
        detail: String,
    },
    #[error("settings payload names no realm icon")]
    NoOrganizations,
}

impl VerifyFailure {
    pub fn reason(&self) -> FailureReason {
        match self {
            VerifyFailure::Transport { reason, .. } => *reason,
            VerifyFailure::NoOrganizations => FailureReason::Protocol,
        }
    }

    pub fn is_certificate(&self) -> bool {
        self.reason() == FailureReason::Certificate
    }
}

/// Settings payload subset the registry cares about.
#[derive(Debug, Deserialize)]
struct ServerSettings {
    #[serde(default)]
    realm_icon: Option<String>,
    #[serde(default)]
    realm_uri: Option<String>,
    #[serde(default)]
    realm_name: Option<String>,
}

/// Performs the settings round-trip against candidate servers.
#[derive(Debug, Clone)]
pub struct ServerVerifier {
    client: Client,
    insecure_client: Client,
    whitelist: Vec<String>,
}

impl ServerVerifier {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        let insecure_client = Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            insecure_client,
            whitelist: DEV_DOMAIN_WHITELIST
                .iter()
                .map(|entry| (*entry).to_string())
                .collect(),
        })
    }

    pub(crate) fn client(&self) -> Client {
        self.client.clone()
    }

    pub(crate) fn insecure_client(&self) -> Client {
        self.insecure_client.clone()
    }

    /// Verify one normalized server URL.
    ///
    /// On a non-certificate failure, whitelisted dev hosts are accepted as a
    /// minimal record so local development servers keep working without a
    /// fully shaped settings endpoint. The rescue only applies to interactive
    /// verification; a silent refresh prefers the caller's stored record over
    /// a synthesized minimal one.
    pub async fn verify(
        &self,
        url: &str,
        ignore_certs: bool,
        silent: bool,
    ) -> Result<DomainRecord, VerifyFailure> {
        match self.fetch_settings(url, ignore_certs).await {
            Ok(record) => Ok(record),
            Err(failure) => {
                if !silent && !failure.is_certificate() && self.is_whitelisted(url) {
                    debug!(url, "accepting whitelisted dev server without verification");
                    return Ok(DomainRecord::unverified(url, ignore_certs));
                }
                Err(failure)
            }
        }
    }

    async fn fetch_settings(
        &self,
        url: &str,
        ignore_certs: bool,
    ) -> Result<DomainRecord, VerifyFailure> {
        let client = if ignore_certs {
            &self.insecure_client
        } else {
            &self.client
        };
        let endpoint = format!("{}{SETTINGS_ENDPOINT}", url.trim_end_matches('/'));

        let response = client
            .get(&endpoint)
            .send()
            .await
            .map_err(|err| VerifyFailure::Transport {
                reason: classify_transport_error(&err),
                detail: err.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(VerifyFailure::Transport {
                reason: FailureReason::Protocol,
                detail: format!("server responded with {status}"),
            });
        }

        let settings: ServerSettings =
            response
                .json()
                .await
                .map_err(|err| VerifyFailure::Transport {
                    reason: FailureReason::Protocol,
                    detail: format!("malformed settings payload: {err}"),
                })?;

        record_from_settings(settings, url, ignore_certs)
    }

    fn is_whitelisted(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        self.whitelist
            .iter()
            .any(|entry| host == entry || host.ends_with(&format!(".{entry}")))
    }
}

fn record_from_settings(
    settings: ServerSettings,
    requested_url: &str,
    ignore_certs: bool,
) -> Result<DomainRecord, VerifyFailure> {
    let Some(icon) = settings.realm_icon.filter(|value| !value.is_empty()) else {
        return Err(VerifyFailure::NoOrganizations);
    };

    // The server's own origin wins over whatever the user typed.
    let origin = settings
        .realm_uri
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| requested_url.to_string());
    let alias = settings
        .realm_name
        .filter(|value| !value.is_empty())
        .map(|name| escape_html(&name))
        .unwrap_or_else(|| origin.clone());
    let icon = resolve_icon_url(&icon, &origin);

    Ok(DomainRecord::verified(origin, alias, icon, ignore_certs))
}

/// Absolute icon URLs pass through; relative ones resolve against the
/// canonical origin.
fn resolve_icon_url(icon: &str, origin: &str) -> String {
    if icon.starts_with("http://") || icon.starts_with("https://") {
        return icon.to_string();
    }
    match Url::parse(origin).and_then(|base| base.join(icon)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => format!(
            "{}/{}",
            origin.trim_end_matches('/'),
            icon.trim_start_matches('/')
        ),
    }
}

/// Classify a transport failure at the single point it is observed.
///
/// Certificate problems hide inside `reqwest`'s opaque connect errors; the
/// error source chain is the narrowest place the TLS layer's verdict is still
/// visible without taking a direct TLS dependency.
pub(crate) fn classify_transport_error(err: &reqwest::Error) -> FailureReason {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let text = cause.to_string();
        if text.contains("certificate")
            || text.contains("Certificate")
            || text.contains("UnknownIssuer")
        {
            return FailureReason::Certificate;
        }
        source = cause.source();
    }
    if err.is_decode() || err.is_status() {
        FailureReason::Protocol
    } else {
        FailureReason::Network
    }
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
