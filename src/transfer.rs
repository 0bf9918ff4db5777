//! Streamed HTTP downloads written through a temp file and an atomic rename.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::download_limiter::DownloadLimiter;
use crate::error::TransferError;

const TEMP_MARKER: &str = ".tmp.";

fn temp_path_for(destination: &Path) -> PathBuf {
    let file_name = destination
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());
    destination.with_file_name(format!(
        "{}{}{}",
        file_name,
        TEMP_MARKER,
        Uuid::new_v4().simple()
    ))
}

/// Matches names produced by [`temp_path_for`]: `<name>.tmp.<32 hex digits>`.
fn is_temp_file(name: &str) -> bool {
    let Some(pos) = name.rfind(TEMP_MARKER) else {
        return false;
    };
    let suffix = &name[pos + TEMP_MARKER.len()..];
    pos > 0 && suffix.len() == 32 && suffix.chars().all(|c| c.is_ascii_hexdigit())
}

/// Downloads `url` to `destination` under a limiter permit.
///
/// The body is streamed chunk by chunk into a sibling temp file which is
/// synced and renamed over `destination` only after the whole body arrived.
/// On any failure the temp file is removed and `destination` is untouched.
pub async fn download_to_file(
    client: &reqwest::Client,
    limiter: &DownloadLimiter,
    url: &str,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let permit = limiter.acquire(cancel).await?;

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(TransferError::Cancelled),
        response = client.get(url).send() => response.map_err(|source| TransferError::Network {
            url: url.to_string(),
            source,
        })?,
    };
    let status = response.status();
    if !status.is_success() {
        return Err(TransferError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| TransferError::Io {
                operation: "Failed to create download directory",
                path: parent.display().to_string(),
                source,
            })?;
    }

    let temp_path = temp_path_for(destination);
    let result = stream_body(response, url, &temp_path, destination, cancel).await;
    permit.release();
    if result.is_err() {
        if let Err(err) = tokio::fs::remove_file(&temp_path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Failed to remove temp file {}: {}",
                    temp_path.display(),
                    err
                );
            }
        }
    }
    result
}

fn io_error(operation: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> TransferError {
    let path = path.display().to_string();
    move |source| TransferError::Io {
        operation,
        path,
        source,
    }
}

async fn stream_body(
    mut response: reqwest::Response,
    url: &str,
    temp_path: &Path,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let mut file = tokio::fs::File::create(temp_path)
        .await
        .map_err(io_error("Failed to create temp file", temp_path))?;

    let mut written: u64 = 0;
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            chunk = response.chunk() => chunk.map_err(|source| TransferError::Network {
                url: url.to_string(),
                source,
            })?,
        };
        let Some(chunk) = chunk else {
            break;
        };
        file.write_all(&chunk)
            .await
            .map_err(io_error("Failed to write temp file", temp_path))?;
        written += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(io_error("Failed to flush temp file", temp_path))?;
    file.sync_all()
        .await
        .map_err(io_error("Failed to sync temp file", temp_path))?;
    drop(file);

    tokio::fs::rename(temp_path, destination)
        .await
        .map_err(io_error("Failed to rename download", destination))?;
    debug!(
        "Stored {} bytes from {} at {}",
        written,
        url,
        destination.display()
    );
    Ok(())
}

/// Removes temp files left behind by interrupted downloads in `dir`.
///
/// A missing directory counts as clean. Individual removal failures are
/// logged and skipped.
pub async fn cleanup_stale_temp_files(dir: &Path) -> Result<usize, TransferError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(source) => {
            return Err(TransferError::Io {
                operation: "Failed to read directory",
                path: dir.display().to_string(),
                source,
            })
        }
    };

    let mut cleaned = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !is_temp_file(name) {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Cleaned up temp file: {}", path.display());
                cleaned += 1;
            }
            Err(err) => warn!("Failed to remove temp file {}: {}", path.display(), err),
        }
    }

    if cleaned > 0 {
        info!(
            "Cleaned up {} stale temp files in {}",
            cleaned,
            dir.display()
        );
    }
    Ok(cleaned)
}
