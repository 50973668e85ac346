//! Retry policy support for unreliable provider APIs.

use std::time::Duration;

use reqwest::StatusCode;

/// Is this error a known transient error?
///
/// By default, we assume errors are not transient until they've been observed
/// in the wild and determined to be worth retrying. Retry budget spent on an
/// error that will never resolve is pure added latency for the teacher
/// waiting on the card.
pub trait IsKnownTransient {
    /// Is this error likely to be transient?
    fn is_known_transient(&self) -> bool;
}

impl IsKnownTransient for StatusCode {
    fn is_known_transient(&self) -> bool {
        let transient_failures = [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT,
        ];
        transient_failures.contains(self)
    }
}

/// Delay before retry attempt `attempt` (1-based): linear backoff,
/// `base * attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * attempt
}
