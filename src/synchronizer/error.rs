//! Error types for the synchronizer engine

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("missing object key: {0}")]
    MissingObjectKey(&'static str),

    #[error("planning failed: {0}")]
    Plan(String),

    #[error("reconciliation timed out")]
    Timeout,
}

impl Error {
    /// Whether the error is a resource-version conflict on a write
    ///
    /// Conflicts on status updates are not failures; the synchronizer
    /// requeues shortly and picks up the fresh object.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(resp)) if resp.code == 409)
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => match e {
                kube::Error::Api(api_err) => {
                    // 4xx errors (except 409 Conflict, 429 TooManyRequests) are not retryable
                    let code = api_err.code;
                    if (400..500).contains(&code) {
                        return code == 409 || code == 429;
                    }
                    true
                }
                // Network and other errors are retryable
                _ => true,
            },
            Error::Serialization(_) => false,
            Error::MissingObjectKey(_) => false,
            Error::Plan(_) => false,
            Error::Timeout => true,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Escalating requeue delays for failed reconciliation passes
///
/// The escalation input is the consecutive-failure count the synchronizer
/// keeps on the owner's status, so the delay survives the stateless
/// error-policy callback. Retries start above the status-conflict requeue
/// (4 s) so error retries never outpace conflict retries, and double per
/// consecutive failure up to the cap. Beyond five minutes there is no
/// point waiting longer: a watch relist re-triggers the object on that
/// horizon anyway.
#[derive(Clone, Debug)]
pub struct RetryBackoff {
    /// Delay before the first retry
    pub base: Duration,
    /// Ceiling for escalated delays
    pub cap: Duration,
    /// Fraction of the delay randomized, spreading retries of objects
    /// that failed together (one broken webhook fails a whole namespace)
    pub jitter: f64,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            cap: Duration::from_secs(300),
            jitter: 0.1,
        }
    }
}

impl RetryBackoff {
    /// Delay for an error after the given number of consecutive failures
    ///
    /// Non-retryable errors are parked at the cap; only a spec or code
    /// change will fix them, and the watch delivers that change.
    pub fn delay_for(&self, error: &Error, consecutive_failures: u32) -> Duration {
        if error.is_retryable() {
            self.escalated(consecutive_failures)
        } else {
            self.cap
        }
    }

    fn escalated(&self, consecutive_failures: u32) -> Duration {
        let doubled = self
            .base
            .saturating_mul(2u32.saturating_pow(consecutive_failures.min(16)))
            .min(self.cap);
        let spread = 1.0 + self.jitter * (rand::random::<f64>() * 2.0 - 1.0);
        Duration::from_secs_f64((doubled.as_secs_f64() * spread).min(self.cap.as_secs_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> Error {
        Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    #[test]
    fn conflict_detection() {
        assert!(api_error(409).is_conflict());
        assert!(!api_error(500).is_conflict());
        assert!(!Error::MissingObjectKey("metadata.name").is_conflict());
    }

    #[test]
    fn retryability_by_status_code() {
        assert!(api_error(409).is_retryable());
        assert!(api_error(429).is_retryable());
        assert!(api_error(500).is_retryable());
        assert!(api_error(503).is_retryable());
        assert!(!api_error(400).is_retryable());
        assert!(!api_error(404).is_retryable());
        assert!(!api_error(403).is_retryable());
    }

    #[test]
    fn plan_errors_are_not_retryable() {
        assert!(!Error::Plan("bad name".to_string()).is_retryable());
    }

    #[test]
    fn backoff_escalates_with_consecutive_failures() {
        let backoff = RetryBackoff::default();
        let first = backoff.delay_for(&api_error(500), 0);
        let fifth = backoff.delay_for(&api_error(500), 4);
        // Jitter is 10%, escalation is 16x; order cannot flip
        assert!(first < fifth);
    }

    #[test]
    fn backoff_delay_is_capped() {
        let backoff = RetryBackoff::default();
        let delay = backoff.delay_for(&api_error(500), 20);
        assert!(delay <= backoff.cap);
    }

    #[test]
    fn non_retryable_errors_park_at_the_cap() {
        let backoff = RetryBackoff::default();
        assert_eq!(backoff.delay_for(&api_error(400), 0), backoff.cap);
        assert_eq!(
            backoff.delay_for(&Error::Plan("bad name".to_string()), 3),
            backoff.cap
        );
    }
}
