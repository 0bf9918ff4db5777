//! Shared behaviour of online artist image providers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::RefreshError;
use crate::protocol::{ArtistSubject, RefreshRecord, RefreshStatus};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

/// Decides when a provider's refresh record has gone stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub version: &'static str,
    pub refresh_on_version_change: bool,
    pub refresh_interval: Duration,
}

impl StalenessPolicy {
    pub fn with_interval_days(self, days: u32) -> Self {
        Self {
            refresh_interval: DAY * days.max(1),
            ..self
        }
    }

    pub fn is_stale(&self, record: Option<&RefreshRecord>, now_unix_ms: i64) -> bool {
        let Some(record) = record else {
            return true;
        };
        if record.status != RefreshStatus::Success {
            return true;
        }
        if self.refresh_on_version_change && record.provider_version != self.version {
            return true;
        }
        let interval_ms = i64::try_from(self.refresh_interval.as_millis()).unwrap_or(i64::MAX);
        now_unix_ms.saturating_sub(record.last_refreshed_unix_ms) >= interval_ms
    }

    pub fn stamp(&self, status: RefreshStatus, now_unix_ms: i64) -> RefreshRecord {
        RefreshRecord {
            last_refreshed_unix_ms: now_unix_ms,
            status,
            provider_version: self.version.to_string(),
        }
    }
}

/// An online source of artist images.
#[async_trait]
pub trait ArtistImageProvider: Send + Sync {
    /// Key under which refresh records are stored.
    fn name(&self) -> &'static str;

    fn version(&self) -> &'static str;

    /// `true` when the subject is eligible and its record is stale.
    fn needs_refresh(&self, subject: &ArtistSubject, record: Option<&RefreshRecord>) -> bool;

    /// Runs one refresh cycle; `Ok(true)` means the subject changed and must be persisted.
    async fn fetch(
        &self,
        subject: &mut ArtistSubject,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, RefreshError>;
}

#[cfg(test)]
mod tests {
    use super::{StalenessPolicy, DAY};
    use crate::protocol::RefreshStatus;
    use std::time::Duration;

    fn policy() -> StalenessPolicy {
        StalenessPolicy {
            version: "5",
            refresh_on_version_change: true,
            refresh_interval: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_missing_record_is_stale() {
        assert!(policy().is_stale(None, 0));
    }

    #[test]
    fn test_fresh_success_record_is_current() {
        let policy = policy();
        let record = policy.stamp(RefreshStatus::Success, 1_000);
        assert!(!policy.is_stale(Some(&record), 30_000));
        assert!(policy.is_stale(Some(&record), 61_000));
    }

    #[test]
    fn test_failed_record_is_stale() {
        let policy = policy();
        let record = policy.stamp(RefreshStatus::Failure, 1_000);
        assert!(policy.is_stale(Some(&record), 1_000));
    }

    #[test]
    fn test_version_change_triggers_refresh_only_when_enabled() {
        let mut record = policy().stamp(RefreshStatus::Success, 1_000);
        record.provider_version = "4".to_string();
        assert!(policy().is_stale(Some(&record), 1_000));

        let lenient = StalenessPolicy {
            refresh_on_version_change: false,
            ..policy()
        };
        assert!(!lenient.is_stale(Some(&record), 1_000));
    }

    #[test]
    fn test_interval_days_never_drop_below_one_day() {
        assert_eq!(policy().with_interval_days(0).refresh_interval, DAY);
        assert_eq!(policy().with_interval_days(30).refresh_interval, DAY * 30);
    }
}
