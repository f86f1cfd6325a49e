use std::future::Future;
use std::time::Duration;

use rand::{rng, Rng};

use crate::common::error::{FleetError, Result};

pub fn jittered_delay(base: u64) -> u64 {
    let mut rng = rng();
    let jitter: f64 = rng.random_range(0.5..=1.5); // ±50% jitter
    (base as f64 * jitter) as u64
}

/// Uniformly sampled delay in `[min_ms, max_ms]`.
pub fn pacing_delay(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rng().random_range(min_ms..=max_ms))
}

/// Names that are safe as directory identities and agent URL segments.
pub fn is_slug(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Runs a remote call under a deadline. Expiry is reported as `Unreachable`.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(FleetError::Unreachable(format!(
            "{} timed out after {:?}",
            what, limit
        ))),
    }
}
