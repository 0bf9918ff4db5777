//! Process-wide gate for requests to the fanart service and its image hosts.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::state::NotKeyed;
use governor::{Quota, RateLimiter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::Cancelled;

type DirectLimiter =
    RateLimiter<NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// Bounds in-flight network operations across every subject and category.
///
/// Constructed once and shared as `Arc<DownloadLimiter>`. Waiters are served
/// in the order the underlying semaphore queues them.
pub struct DownloadLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
    request_spacing: Option<DirectLimiter>,
}

/// Exclusive right to perform one network operation. Dropping it releases the slot.
#[derive(Debug)]
pub struct DownloadPermit {
    _permit: OwnedSemaphorePermit,
}

impl DownloadPermit {
    /// Explicit release; equivalent to dropping the permit.
    pub fn release(self) {}
}

impl DownloadLimiter {
    #[cfg(test)]
    pub fn new(capacity: usize) -> Self {
        Self::with_min_interval(capacity, Duration::ZERO)
    }

    /// `min_interval` of zero disables request spacing.
    pub fn with_min_interval(capacity: usize, min_interval: Duration) -> Self {
        let capacity = capacity.max(1);
        let request_spacing = Quota::with_period(min_interval).map(|quota| {
            RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN))
        });
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            request_spacing,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a free slot (and the request spacing, when configured).
    ///
    /// Fails with [`Cancelled`] as soon as `cancel` fires; no permit is held
    /// afterwards in that case.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<DownloadPermit, Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| Cancelled)?
            }
        };

        if let Some(spacing) = &self.request_spacing {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = spacing.until_ready() => {}
            }
        }

        Ok(DownloadPermit { _permit: permit })
    }
}

#[cfg(test)]
mod tests {
    use super::DownloadLimiter;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_permits_bound_concurrency_and_release_on_drop() {
        let limiter = DownloadLimiter::new(2);
        let cancel = CancellationToken::new();

        let first = limiter.acquire(&cancel).await.expect("first permit");
        let second = limiter.acquire(&cancel).await.expect("second permit");
        assert_eq!(limiter.available_permits(), 0);

        drop(first);
        assert_eq!(limiter.available_permits(), 1);
        second.release();
        assert_eq!(limiter.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_wait_fails_without_granting_a_permit() {
        let limiter = Arc::new(DownloadLimiter::new(1));
        let cancel = CancellationToken::new();
        let held = limiter.acquire(&cancel).await.expect("held permit");

        let waiter = {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire(&cancel).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = waiter.await.expect("waiter task");
        assert!(result.is_err());
        drop(held);
        assert_eq!(limiter.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_fails_immediately() {
        let limiter = DownloadLimiter::new(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(limiter.acquire(&cancel).await.is_err());
        assert_eq!(limiter.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_min_interval_spaces_consecutive_requests() {
        let limiter = DownloadLimiter::with_min_interval(4, Duration::from_millis(50));
        let cancel = CancellationToken::new();

        let started = Instant::now();
        limiter.acquire(&cancel).await.expect("first permit").release();
        limiter.acquire(&cancel).await.expect("second permit").release();
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        assert_eq!(DownloadLimiter::new(0).capacity(), 1);
    }
}
