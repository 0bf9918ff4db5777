//! Persistence collaborator that stores downloaded artist images.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::download_limiter::DownloadLimiter;
use crate::error::StoreError;
use crate::protocol::ArtistSubject;
use crate::transfer;

/// Downloads an image and stores it under a subject, returning the stored path.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn download_and_store(
        &self,
        subject: &ArtistSubject,
        url: &str,
        file_name: &str,
        save_local_meta: bool,
        limiter: &DownloadLimiter,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, StoreError>;
}

/// Writes images into the artist folder (`save_local_meta`) or into
/// `<data_root>/metadata/artists/<subject id>/`.
pub struct HttpImageStore {
    client: reqwest::Client,
    data_root: PathBuf,
}

impl HttpImageStore {
    pub fn new(client: reqwest::Client, data_root: PathBuf) -> Self {
        Self { client, data_root }
    }

    pub fn metadata_dir(&self, subject: &ArtistSubject) -> PathBuf {
        self.data_root
            .join("metadata")
            .join("artists")
            .join(sanitize_dir_name(&subject.id))
    }

    fn target_dir(&self, subject: &ArtistSubject, save_local_meta: bool) -> PathBuf {
        match (&subject.path, save_local_meta) {
            (Some(folder), true) => folder.clone(),
            _ => self.metadata_dir(subject),
        }
    }
}

fn sanitize_dir_name(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

fn validate_file_name(file_name: &str) -> Result<(), StoreError> {
    let path = Path::new(file_name);
    let is_plain = path.components().count() == 1
        && path.file_name().and_then(|name| name.to_str()) == Some(file_name);
    if file_name.is_empty() || !is_plain {
        return Err(StoreError::InvalidFileName(file_name.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ImageStore for HttpImageStore {
    async fn download_and_store(
        &self,
        subject: &ArtistSubject,
        url: &str,
        file_name: &str,
        save_local_meta: bool,
        limiter: &DownloadLimiter,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, StoreError> {
        validate_file_name(file_name)?;
        let destination = self.target_dir(subject, save_local_meta).join(file_name);
        transfer::download_to_file(&self.client, limiter, url, &destination, cancel).await?;
        Ok(destination)
    }
}
