//! Submissions and the retry policy applied to them.

use std::time::Duration;
use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

/// A fully built delivery unit.
///
/// The deadline is fixed when the submission is created and never moves,
/// however many times delivery is retried.
#[derive(Debug, Clone)]
pub struct Submission {
    id: Uuid,
    uri: Url,
    enqueued_at: Instant,
    deadline: Instant,
}

impl Submission {
    pub fn new(uri: Url, expiry: Duration) -> Self {
        let enqueued_at = Instant::now();
        Self {
            id: Uuid::new_v4(),
            uri,
            enqueued_at,
            deadline: saturating_deadline(enqueued_at, expiry),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// True once `now` is past the deadline.
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.deadline
    }
}

/// Roughly thirty years; used in place of instants the clock cannot represent.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `at + delay`, clamped to a far-future instant instead of overflowing.
pub(crate) fn saturating_deadline(at: Instant, delay: Duration) -> Instant {
    at.checked_add(delay)
        .or_else(|| at.checked_add(FAR_FUTURE))
        .unwrap_or(at)
}

/// Retry cadence and backlog limits for the delivery worker.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for the doubling delay
    pub max_backoff: Duration,
    /// Upper bound for a single delivery attempt
    pub request_timeout: Duration,
    /// Maximum number of pending submissions
    pub max_backlog: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            max_backlog: crate::DEFAULT_EXPIRY_MINUTES as usize,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `failures` consecutive failures.
    ///
    /// Doubles from `initial_backoff` and saturates at `max_backoff`; never zero.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        let delay = self
            .initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff);
        delay.max(Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(5));
        assert_eq!(policy.backoff(2), Duration::from_secs(10));
        assert_eq!(policy.backoff(4), Duration::from_secs(40));
        assert_eq!(policy.backoff(5), Duration::from_secs(60));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_never_zero() {
        let policy = RetryPolicy {
            initial_backoff: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert!(policy.backoff(1) > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_strictly_after_deadline() {
        let uri = Url::parse("http://example.org/").unwrap();
        let submission = Submission::new(uri, Duration::from_secs(10));
        assert!(!submission.is_expired(submission.deadline()));
        assert!(submission.is_expired(submission.deadline() + Duration::from_millis(1)));
        assert_eq!(submission.deadline() - submission.enqueued_at(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_expiry_is_clamped() {
        let uri = Url::parse("http://example.org/").unwrap();
        let submission = Submission::new(uri, Duration::MAX);
        assert!(submission.deadline() > submission.enqueued_at());
        assert!(!submission.is_expired(Instant::now() + Duration::from_secs(86400 * 365)));
    }
}
