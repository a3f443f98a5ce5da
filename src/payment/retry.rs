//! Retry with Backoff

use std::time::Duration;

use tracing::warn;

use crate::services::ServiceError;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Exponentially growing delays, doubling from `min` and capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    /// Delays starting at `min`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { current: min, max }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current;

        self.current = self.current.saturating_mul(2).min(self.max);

        Some(current)
    }
}

/// How a failed payment-session call is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network trouble or a server-side fault; worth retrying.
    Transient,

    /// The provider is throttling us.
    RateLimited,

    /// Stock ran out between reservation and payment.
    Availability,

    /// The provider refused the request content.
    InvalidInput,

    /// Anything else.
    Other,
}

/// Classify `error`. Transport failures are always transient. For answers from the server the
/// body's wording is checked first and the status second.
///
/// Stock and rate-limit wording always wins, so a 5xx that says "out of stock" is not retried.
#[must_use]
pub fn classify(error: &ServiceError) -> FailureKind {
    match error {
        ServiceError::Network(_) => FailureKind::Transient,
        ServiceError::UnexpectedResponse(_) => FailureKind::Other,
        ServiceError::Rejected(message) => classify_message(message).unwrap_or(FailureKind::Other),
        ServiceError::Status { status, message } => {
            classify_message(message).unwrap_or(match status {
                429 => FailureKind::RateLimited,
                400 | 422 => FailureKind::InvalidInput,
                500.. => FailureKind::Transient,
                _ => FailureKind::Other,
            })
        }
    }
}

fn classify_message(message: &str) -> Option<FailureKind> {
    let message = message.to_lowercase();
    let mentions = |needles: &[&str]| needles.iter().any(|needle| message.contains(needle));

    if mentions(&["stock", "unavailable product", "sold out"]) {
        Some(FailureKind::Availability)
    } else if mentions(&["rate limit", "too many requests", "try again later"]) {
        Some(FailureKind::RateLimited)
    } else if mentions(&["invalid", "validation"]) {
        Some(FailureKind::InvalidInput)
    } else if mentions(&[
        "network",
        "fetch",
        "timeout",
        "timed out",
        "connection",
        "502",
        "503",
        "504",
    ]) {
        Some(FailureKind::Transient)
    } else {
        None
    }
}

/// Run `attempt` until it succeeds, fails with a non-transient error, or `max_retries` retries
/// have been spent. Attempts run one after another, each retry after the next backoff delay.
///
/// `attempt` receives the 1-based attempt number.
///
/// # Errors
///
/// Returns the error of the last attempt.
pub async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    initial_backoff: Duration,
    mut attempt: F,
) -> Result<T, ServiceError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut backoff = Backoff::new(initial_backoff, MAX_BACKOFF.max(initial_backoff));
    let mut number = 1;

    loop {
        let error = match attempt(number).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if number > max_retries || classify(&error) != FailureKind::Transient {
            return Err(error);
        }

        if let Some(delay) = backoff.next() {
            warn!(attempt = number, ?delay, "transient failure, retrying: {error}");

            tokio::time::sleep(delay).await;
        }

        number += 1;
    }
}
