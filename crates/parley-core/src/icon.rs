//! Local caching of organization icons.
//!
//! Icon trouble must never block adding or refreshing a server, so the fetch
//! is a total operation: it resolves to a content-addressed local path or to
//! the default icon sentinel, never to an error.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Fallback icon substituted whenever no valid icon is available.
pub const DEFAULT_ICON: &str = "icons/default-organization.png";

#[derive(Debug, Error)]
enum IconFetchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Downloads server icons into a per-installation cache directory.
#[derive(Debug, Clone)]
pub struct IconFetcher {
    client: Client,
    insecure_client: Client,
    icons_dir: PathBuf,
}

impl IconFetcher {
    pub fn new(client: Client, insecure_client: Client, icons_dir: PathBuf) -> Self {
        Self {
            client,
            insecure_client,
            icons_dir,
        }
    }

    /// Fetch an icon into the local cache.
    ///
    /// Always resolves: the cached file's path on success, [`DEFAULT_ICON`]
    /// on any failure. Re-fetching the same URL overwrites the same file, so
    /// repeated refreshes cannot grow the cache without bound.
    pub async fn fetch_icon(&self, icon_url: &str, ignore_certs: bool) -> String {
        if icon_url == DEFAULT_ICON {
            return DEFAULT_ICON.to_string();
        }
        match self.try_fetch(icon_url, ignore_certs).await {
            Ok(path) => {
                debug!(icon_url, path = %path, "icon cached");
                path
            }
            Err(err) => {
                warn!(icon_url, error = %err, "icon download failed, using default icon");
                DEFAULT_ICON.to_string()
            }
        }
    }

    async fn try_fetch(&self, icon_url: &str, ignore_certs: bool) -> Result<String, IconFetchError> {
        fs::create_dir_all(&self.icons_dir).await?;

        let client = if ignore_certs {
            &self.insecure_client
        } else {
            &self.client
        };
        let response = client.get(icon_url).send().await?.error_for_status()?;

        let path = self.icons_dir.join(icon_file_name(icon_url));
        let mut file = fs::File::create(&path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        Ok(path.to_string_lossy().into_owned())
    }
}

/// Content-addressed cache name: a hash of the full URL plus the URL's file
/// extension, query string stripped before extension extraction.
fn icon_file_name(url: &str) -> String {
    let hash = icon_hash(url);
    let without_query = url.split('?').next().unwrap_or(url);
    match Path::new(without_query)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some(ext) if !ext.is_empty() => format!("{hash}.{ext}"),
        _ => hash.to_string(),
    }
}

/// 32-bit rolling hash: seed 5381, multiply by 33 and XOR the character,
/// right to left, wrapping, taken unsigned.
fn icon_hash(url: &str) -> u32 {
    let mut hash: u32 = 5381;
    for ch in url.chars().rev() {
        hash = hash.wrapping_mul(33) ^ (ch as u32);
    }
    hash
}
