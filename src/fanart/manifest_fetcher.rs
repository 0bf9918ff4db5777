//! Downloads the per-artist fanart manifest into subject-scoped storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::download_limiter::DownloadLimiter;
use crate::error::FetchError;
use crate::transfer;

pub const MANIFEST_DIR_NAME: &str = "fanart-music";
pub const MANIFEST_FILE_NAME: &str = "fanart.xml";

/// `{base_url}/webservice/artist/{api_key}/{external_id}/xml/all/1/1`
pub fn manifest_url(base_url: &str, api_key: &str, external_id: &str) -> String {
    format!(
        "{}/webservice/artist/{}/{}/xml/all/1/1",
        base_url.trim_end_matches('/'),
        urlencoding::encode(api_key),
        urlencoding::encode(external_id)
    )
}

fn is_usable_path_component(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
}

/// `<data_root>/fanart-music/<external_id>/fanart.xml`
pub fn manifest_path(data_root: &Path, external_id: &str) -> Result<PathBuf, FetchError> {
    if !is_usable_path_component(external_id) {
        return Err(FetchError::InvalidSubjectId(external_id.to_string()));
    }
    Ok(data_root
        .join(MANIFEST_DIR_NAME)
        .join(external_id)
        .join(MANIFEST_FILE_NAME))
}

/// Issues one manifest request per call. Never retries.
pub struct ManifestFetcher {
    client: reqwest::Client,
    limiter: Arc<DownloadLimiter>,
}

impl ManifestFetcher {
    pub fn new(client: reqwest::Client, limiter: Arc<DownloadLimiter>) -> Self {
        Self { client, limiter }
    }

    /// Streams the manifest for `external_id` to `destination`.
    ///
    /// `destination` only changes when the whole body was received.
    pub async fn fetch(
        &self,
        base_url: &str,
        api_key: &str,
        external_id: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if !is_usable_path_component(external_id) {
            return Err(FetchError::InvalidSubjectId(external_id.to_string()));
        }

        let url = manifest_url(base_url, api_key, external_id);
        debug!(
            "Fetching fanart manifest for {} into {}",
            external_id,
            destination.display()
        );
        transfer::download_to_file(&self.client, &self.limiter, &url, destination, cancel)
            .await
            .map_err(|error| redact_api_key(FetchError::from(error), api_key))
    }
}

fn redact_api_key(error: FetchError, api_key: &str) -> FetchError {
    if api_key.is_empty() {
        return error;
    }
    let encoded = urlencoding::encode(api_key).into_owned();
    match error {
        FetchError::HttpStatus { status, url } => FetchError::HttpStatus {
            status,
            url: url.replace(&encoded, "<api-key>"),
        },
        FetchError::Network { url, source } => FetchError::Network {
            url: url.replace(&encoded, "<api-key>"),
            source: source.without_url(),
        },
        other => other,
    }
}

/// Removes interrupted-download leftovers from every manifest directory.
pub async fn cleanup_stale_manifests(data_root: &Path) -> usize {
    let root = data_root.join(MANIFEST_DIR_NAME);
    let mut entries = match tokio::fs::read_dir(&root).await {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Failed to read manifest directory {}: {}",
                    root.display(),
                    err
                );
            }
            return 0;
        }
    };

    let mut cleaned = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match transfer::cleanup_stale_temp_files(&path).await {
            Ok(count) => cleaned += count,
            Err(err) => warn!("Manifest cleanup failed: {}", err),
        }
    }
    cleaned
}
