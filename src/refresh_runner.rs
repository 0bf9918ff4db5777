//! Runs refresh cycles for many artists concurrently and persists the results.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info};
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::db_manager::DbManager;
use crate::fanart::FanArtArtistProvider;
use crate::protocol::{ArtistSubject, CycleReport};
use crate::provider::ArtistImageProvider;

/// A cycle that ended in `Failed`, or whose result could not be saved.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FailedCycle {
    pub subject_id: String,
    pub cancelled: bool,
    pub error: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RefreshSummary {
    pub reports: Vec<CycleReport>,
    pub failures: Vec<FailedCycle>,
}

impl RefreshSummary {
    pub fn completed(&self) -> usize {
        self.reports.iter().filter(|r| r.work_performed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.reports.len() - self.completed()
    }
}

/// Spawns one cycle per subject; the provider's shared limiter bounds the
/// network work. Completed subjects are written back to the catalog.
///
/// Every subject ends up in either `reports` or `failures`, including
/// subjects whose task panicked or whose state could not be saved.
pub async fn refresh_subjects(
    provider: Arc<FanArtArtistProvider>,
    db_manager: &DbManager,
    subjects: Vec<ArtistSubject>,
    force: bool,
    cancel: &CancellationToken,
) -> RefreshSummary {
    let due = subjects
        .iter()
        .filter(|subject| {
            provider.needs_refresh(subject, subject.refresh_record(provider.name()))
        })
        .count();
    debug!(
        "{} v{}: {} of {} artists due for refresh (force={})",
        provider.name(),
        provider.version(),
        due,
        subjects.len(),
        force
    );

    let mut tasks = JoinSet::new();
    let mut task_subjects: HashMap<Id, String> = HashMap::new();
    for subject in subjects {
        let provider = Arc::clone(&provider);
        let cancel = cancel.clone();
        let subject_id = subject.id.clone();
        let handle = tasks.spawn(async move {
            let mut subject = subject;
            let result = provider.run_cycle(&mut subject, force, &cancel).await;
            (subject, result)
        });
        task_subjects.insert(handle.id(), subject_id);
    }

    let mut summary = RefreshSummary::default();
    while let Some(joined) = tasks.join_next_with_id().await {
        let (subject, result) = match joined {
            Ok((_, output)) => output,
            Err(err) => {
                let subject_id = task_subjects.remove(&err.id()).unwrap_or_default();
                error!(
                    "Refresh task for {} terminated unexpectedly: {}",
                    subject_id, err
                );
                summary.failures.push(FailedCycle {
                    subject_id,
                    cancelled: err.is_cancelled(),
                    error: err.to_string(),
                });
                continue;
            }
        };
        match result {
            Ok(report) => {
                if report.work_performed() {
                    if let Err(err) = db_manager.save_artist_state(&subject) {
                        error!(
                            "Failed to save refresh result for {}: {}",
                            subject.label(),
                            err
                        );
                        summary.failures.push(FailedCycle {
                            subject_id: subject.id.clone(),
                            cancelled: false,
                            error: format!("failed to save artist state: {err}"),
                        });
                        continue;
                    }
                }
                summary.reports.push(report);
            }
            Err(err) => summary.failures.push(FailedCycle {
                subject_id: subject.id.clone(),
                cancelled: err.is_cancelled(),
                error: err.to_string(),
            }),
        }
    }

    summary
        .reports
        .sort_by(|a, b| a.subject_id.cmp(&b.subject_id));
    summary
        .failures
        .sort_by(|a, b| a.subject_id.cmp(&b.subject_id));
    info!(
        "Refresh finished. completed={} skipped={} failed={}",
        summary.completed(),
        summary.skipped(),
        summary.failures.len()
    );
    summary
}
