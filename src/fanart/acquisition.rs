//! Per-category image acquisition for one refresh cycle.

use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::config::ArtistImagesConfig;
use crate::download_limiter::DownloadLimiter;
use crate::error::{Cancelled, StoreError};
use crate::fanart::manifest::Manifest;
use crate::image_store::ImageStore;
use crate::protocol::{AcquiredImage, AcquisitionFailure, ArtistSubject, ImageKind};

/// Categories are processed in this order, each independently of the others.
pub const ACQUISITION_ORDER: [ImageKind; 5] = [
    ImageKind::Logo,
    ImageKind::Backdrop,
    ImageKind::Art,
    ImageKind::Banner,
    ImageKind::Primary,
];

pub const PRIMARY_FILE: &str = "folder.jpg";
pub const LOGO_FILE: &str = "logo.png";
pub const ART_FILE: &str = "clearart.png";
pub const BANNER_FILE: &str = "banner.png";

/// `Backdrop.jpg`, `Backdrop1.jpg`, `Backdrop2.jpg`, ...
pub fn backdrop_file_name(stored_so_far: usize) -> String {
    if stored_so_far == 0 {
        "Backdrop.jpg".to_string()
    } else {
        format!("Backdrop{stored_so_far}.jpg")
    }
}

fn single_file_name(kind: ImageKind) -> &'static str {
    match kind {
        ImageKind::Primary => PRIMARY_FILE,
        ImageKind::Logo => LOGO_FILE,
        ImageKind::Art => ART_FILE,
        ImageKind::Banner => BANNER_FILE,
        ImageKind::Backdrop => "Backdrop.jpg",
    }
}

fn supports_hd(kind: ImageKind) -> bool {
    matches!(kind, ImageKind::Logo | ImageKind::Art | ImageKind::Banner)
}

/// Remote URLs worth downloading for `kind`, already capped and ordered.
pub fn candidates<'m>(
    kind: ImageKind,
    subject: &ArtistSubject,
    manifest: &'m Manifest,
    images: &ArtistImagesConfig,
) -> Vec<&'m str> {
    if !images.is_enabled(kind) || subject.has_image(kind) {
        return Vec::new();
    }
    if kind.is_multi_valued() {
        return manifest
            .all_matches(kind)
            .into_iter()
            .take(images.max_backdrops as usize)
            .collect();
    }
    manifest
        .first_match(kind, images.download_hd && supports_hd(kind))
        .into_iter()
        .collect()
}

/// Everything one acquisition pass needs besides the subject.
pub struct AcquisitionContext<'a> {
    pub manifest: &'a Manifest,
    pub images: &'a ArtistImagesConfig,
    pub store: &'a dyn ImageStore,
    pub limiter: &'a DownloadLimiter,
    pub cancel: &'a CancellationToken,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AcquisitionOutcome {
    pub acquired: Vec<AcquiredImage>,
    pub failures: Vec<AcquisitionFailure>,
}

/// Downloads missing images and attaches them to `subject` as they land.
///
/// Per-image failures are collected and do not stop the pass. Cancellation
/// stops before the next task and is returned as [`Cancelled`].
pub async fn acquire_missing_images(
    subject: &mut ArtistSubject,
    ctx: &AcquisitionContext<'_>,
) -> Result<AcquisitionOutcome, Cancelled> {
    let mut outcome = AcquisitionOutcome::default();
    let label = subject.label();

    for kind in ACQUISITION_ORDER {
        let urls: Vec<String> = candidates(kind, subject, ctx.manifest, ctx.images)
            .into_iter()
            .map(str::to_string)
            .collect();
        if urls.is_empty() {
            continue;
        }

        let mut stored_backdrops = 0;
        for url in urls {
            if ctx.cancel.is_cancelled() {
                return Err(Cancelled);
            }

            let file_name = if kind.is_multi_valued() {
                backdrop_file_name(stored_backdrops)
            } else {
                single_file_name(kind).to_string()
            };
            debug!("FanArt[{}]: getting {} from {}", label, kind, url);

            let stored = ctx
                .store
                .download_and_store(
                    subject,
                    &url,
                    &file_name,
                    ctx.images.save_local_meta,
                    ctx.limiter,
                    ctx.cancel,
                )
                .await;
            match stored {
                Ok(path) => {
                    subject.attach_image(kind, path.clone());
                    if kind.is_multi_valued() {
                        stored_backdrops += 1;
                    }
                    outcome.acquired.push(AcquiredImage {
                        kind,
                        file_name,
                        path,
                    });
                }
                Err(StoreError::Cancelled) => return Err(Cancelled),
                Err(err) => {
                    warn!(
                        "FanArt[{}]: failed to store {} from {}: {}",
                        label, file_name, url, err
                    );
                    outcome.failures.push(AcquisitionFailure {
                        kind,
                        file_name,
                        url,
                        error: err.to_string(),
                    });
                }
            }
        }
    }

    if ctx.cancel.is_cancelled() {
        return Err(Cancelled);
    }
    Ok(outcome)
}
