//! Shared payloads exchanged between the catalog, providers, and the CLI.
//!
//! This module defines the artist subject being refreshed, the per-provider
//! refresh bookkeeping, and the report produced by one refresh cycle.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Image categories an artist can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Primary,
    Backdrop,
    Banner,
    Logo,
    Art,
}

impl ImageKind {
    pub const ALL: [ImageKind; 5] = [
        ImageKind::Primary,
        ImageKind::Backdrop,
        ImageKind::Banner,
        ImageKind::Logo,
        ImageKind::Art,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Backdrop => "backdrop",
            Self::Banner => "banner",
            Self::Logo => "logo",
            Self::Art => "art",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Backdrops are the only category that holds more than one image.
    pub fn is_multi_valued(self) -> bool {
        matches!(self, Self::Backdrop)
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome stored with a refresh record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Success,
    Failure,
}

impl RefreshStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value == "success" {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

/// Per-subject, per-provider refresh bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RefreshRecord {
    pub last_refreshed_unix_ms: i64,
    pub status: RefreshStatus,
    /// Version marker of the provider logic that wrote this record.
    pub provider_version: String,
}

/// Catalog entry for one music artist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtistSubject {
    /// Stable catalog id.
    pub id: String,
    pub name: String,
    /// Artist folder on disk, used when images are saved next to the media.
    pub path: Option<PathBuf>,
    /// MusicBrainz artist id; the fanart service is keyed on it.
    pub musicbrainz_id: Option<String>,
    /// Single-valued image attachments.
    pub images: HashMap<ImageKind, PathBuf>,
    /// Ordered backdrop attachments.
    pub backdrops: Vec<PathBuf>,
    /// Refresh records keyed by provider name.
    pub refresh_records: HashMap<String, RefreshRecord>,
    /// Locked entries are never refreshed from online sources.
    pub dont_fetch_meta: bool,
}

impl ArtistSubject {
    #[cfg(test)]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn with_musicbrainz_id(mut self, musicbrainz_id: impl Into<String>) -> Self {
        self.musicbrainz_id = Some(musicbrainz_id.into());
        self
    }

    /// Label used in log lines.
    pub fn label(&self) -> String {
        format!("artist:{}", self.name)
    }

    /// Returns the MusicBrainz id when it is present and non-blank.
    pub fn musicbrainz_id(&self) -> Option<&str> {
        self.musicbrainz_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn has_image(&self, kind: ImageKind) -> bool {
        if kind.is_multi_valued() {
            !self.backdrops.is_empty()
        } else {
            self.images.contains_key(&kind)
        }
    }

    /// Attaches a stored image; backdrops are appended in order.
    pub fn attach_image(&mut self, kind: ImageKind, path: PathBuf) {
        if kind.is_multi_valued() {
            self.backdrops.push(path);
        } else {
            self.images.insert(kind, path);
        }
    }

    pub fn refresh_record(&self, provider: &str) -> Option<&RefreshRecord> {
        self.refresh_records.get(provider)
    }
}

/// States a refresh cycle moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    Idle,
    CheckEligibility,
    Fetching,
    Parsing,
    Acquiring,
    Completed,
    Failed,
    Skipped,
}

/// Why a cycle ended in `Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingExternalId,
    AllCategoriesDisabled,
    MissingApiKey,
    Locked,
    UpToDate,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MissingExternalId => "no MusicBrainz id",
            Self::AllCategoriesDisabled => "all image categories disabled",
            Self::MissingApiKey => "no fanart API key configured",
            Self::Locked => "metadata locked",
            Self::UpToDate => "refresh record is current",
        };
        f.write_str(text)
    }
}

/// One image stored during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AcquiredImage {
    pub kind: ImageKind,
    pub file_name: String,
    pub path: PathBuf,
}

/// One image that could not be stored during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AcquisitionFailure {
    pub kind: ImageKind,
    pub file_name: String,
    pub url: String,
    pub error: String,
}

/// Result of a refresh cycle that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CycleReport {
    pub subject_id: String,
    pub state: RefreshState,
    pub skip_reason: Option<SkipReason>,
    pub acquired: Vec<AcquiredImage>,
    pub failures: Vec<AcquisitionFailure>,
}

impl CycleReport {
    pub fn skipped(subject_id: &str, reason: SkipReason) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            state: RefreshState::Skipped,
            skip_reason: Some(reason),
            acquired: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// `true` when the cycle ran to completion and stamped a record.
    pub fn work_performed(&self) -> bool {
        self.state == RefreshState::Completed
    }

    /// Some images were stored while others failed.
    pub fn is_partial_failure(&self) -> bool {
        !self.failures.is_empty() && !self.acquired.is_empty()
    }
}
