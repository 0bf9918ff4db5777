//! fanart.tv provider for music artists.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::FanArtSettings;
use crate::download_limiter::DownloadLimiter;
use crate::error::RefreshError;
use crate::fanart::acquisition::{acquire_missing_images, AcquisitionContext};
use crate::fanart::manifest::Manifest;
use crate::fanart::manifest_fetcher::{manifest_path, ManifestFetcher};
use crate::image_store::ImageStore;
use crate::protocol::{
    ArtistSubject, CycleReport, RefreshRecord, RefreshState, RefreshStatus, SkipReason,
};
use crate::provider::{now_unix_ms, ArtistImageProvider, StalenessPolicy};

pub const PROVIDER_NAME: &str = "FanArt";
/// Bumping this invalidates every stored record and forces a refetch.
pub const PROVIDER_VERSION: &str = "5";

/// Refreshes artist logos, backdrops, clear art, banners and thumbs from fanart.tv.
pub struct FanArtArtistProvider {
    settings: Arc<Mutex<FanArtSettings>>,
    limiter: Arc<DownloadLimiter>,
    fetcher: ManifestFetcher,
    store: Arc<dyn ImageStore>,
}

impl FanArtArtistProvider {
    pub fn new(
        settings: Arc<Mutex<FanArtSettings>>,
        limiter: Arc<DownloadLimiter>,
        client: reqwest::Client,
        store: Arc<dyn ImageStore>,
    ) -> Self {
        let fetcher = ManifestFetcher::new(client, Arc::clone(&limiter));
        Self {
            settings,
            limiter,
            fetcher,
            store,
        }
    }

    /// Copy of the current settings; one cycle never observes later edits.
    pub fn settings_snapshot(&self) -> FanArtSettings {
        match self.settings.lock() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn staleness_policy(settings: &FanArtSettings) -> StalenessPolicy {
        StalenessPolicy {
            version: PROVIDER_VERSION,
            refresh_on_version_change: true,
            refresh_interval: Duration::ZERO,
        }
        .with_interval_days(settings.metadata_refresh_days)
    }

    /// Returns the external id to query, or why the subject is skipped.
    fn check_eligibility(
        subject: &ArtistSubject,
        settings: &FanArtSettings,
    ) -> Result<String, SkipReason> {
        let Some(external_id) = subject.musicbrainz_id() else {
            return Err(SkipReason::MissingExternalId);
        };
        if !settings.images.any_enabled() {
            return Err(SkipReason::AllCategoriesDisabled);
        }
        if !settings.has_api_key() {
            return Err(SkipReason::MissingApiKey);
        }
        if subject.dont_fetch_meta {
            return Err(SkipReason::Locked);
        }
        Ok(external_id.to_string())
    }

    fn enter(label: &str, state: RefreshState) {
        debug!("FanArt[{}]: state={:?}", label, state);
    }

    /// Runs one refresh cycle and reports what happened.
    ///
    /// On `Completed` the subject carries the newly attached images and a
    /// fresh refresh record. On error nothing is recorded.
    pub async fn run_cycle(
        &self,
        subject: &mut ArtistSubject,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, RefreshError> {
        let label = subject.label();
        let result = self.execute_cycle(subject, force, cancel, &label).await;
        match &result {
            Ok(report) if report.state == RefreshState::Skipped => {
                if let Some(reason) = report.skip_reason {
                    debug!("FanArt[{}]: skipped ({})", label, reason);
                }
            }
            Ok(report) => info!(
                "FanArt[{}]: refresh completed. stored={} failed={}",
                label,
                report.acquired.len(),
                report.failures.len()
            ),
            Err(RefreshError::Cancelled) => {
                Self::enter(&label, RefreshState::Failed);
                info!("FanArt[{}]: refresh cancelled", label);
            }
            Err(err) => {
                Self::enter(&label, RefreshState::Failed);
                warn!("FanArt[{}]: refresh failed: {}", label, err);
            }
        }
        result
    }

    async fn execute_cycle(
        &self,
        subject: &mut ArtistSubject,
        force: bool,
        cancel: &CancellationToken,
        label: &str,
    ) -> Result<CycleReport, RefreshError> {
        Self::enter(label, RefreshState::Idle);
        if cancel.is_cancelled() {
            return Err(RefreshError::Cancelled);
        }

        Self::enter(label, RefreshState::CheckEligibility);
        let settings = self.settings_snapshot();
        let external_id = match Self::check_eligibility(subject, &settings) {
            Ok(external_id) => external_id,
            Err(reason) => {
                Self::enter(label, RefreshState::Skipped);
                return Ok(CycleReport::skipped(&subject.id, reason));
            }
        };
        let policy = Self::staleness_policy(&settings);
        if !force && !policy.is_stale(subject.refresh_record(PROVIDER_NAME), now_unix_ms()) {
            Self::enter(label, RefreshState::Skipped);
            return Ok(CycleReport::skipped(&subject.id, SkipReason::UpToDate));
        }

        Self::enter(label, RefreshState::Fetching);
        let manifest_file = manifest_path(&settings.data_root, &external_id)?;
        self.fetcher
            .fetch(
                &settings.base_url,
                &settings.api_key,
                &external_id,
                &manifest_file,
                cancel,
            )
            .await?;

        Self::enter(label, RefreshState::Parsing);
        let manifest = Manifest::load(&manifest_file).await?;
        if cancel.is_cancelled() {
            return Err(RefreshError::Cancelled);
        }

        Self::enter(label, RefreshState::Acquiring);
        let ctx = AcquisitionContext {
            manifest: &manifest,
            images: &settings.images,
            store: self.store.as_ref(),
            limiter: &self.limiter,
            cancel,
        };
        let outcome = acquire_missing_images(subject, &ctx).await?;

        Self::enter(label, RefreshState::Completed);
        subject.refresh_records.insert(
            PROVIDER_NAME.to_string(),
            policy.stamp(RefreshStatus::Success, now_unix_ms()),
        );
        Ok(CycleReport {
            subject_id: subject.id.clone(),
            state: RefreshState::Completed,
            skip_reason: None,
            acquired: outcome.acquired,
            failures: outcome.failures,
        })
    }
}

#[async_trait]
impl ArtistImageProvider for FanArtArtistProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn version(&self) -> &'static str {
        PROVIDER_VERSION
    }

    fn needs_refresh(&self, subject: &ArtistSubject, record: Option<&RefreshRecord>) -> bool {
        let settings = self.settings_snapshot();
        if Self::check_eligibility(subject, &settings).is_err() {
            return false;
        }
        Self::staleness_policy(&settings).is_stale(record, now_unix_ms())
    }

    async fn fetch(
        &self,
        subject: &mut ArtistSubject,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, RefreshError> {
        self.run_cycle(subject, force, cancel)
            .await
            .map(|report| report.work_performed())
    }
}
