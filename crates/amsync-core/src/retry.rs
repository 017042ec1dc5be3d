//! Indefinite, fixed-backoff retry loop.
//!
//! The fill engines wrap each resource's fetch-transform-write attempt in
//! this helper rather than a bounded-attempt retry crate: a resource that
//! keeps failing is expected to eventually succeed once the upstream
//! recovers, and the only way to give up is to kill the process (matching
//! `InitialFillStep.fill_tables`'s `while True` retry loop with
//! `RETRY_DELAY_SECONDS` between attempts). Per-request bounded retry
//! against transient HTTP failures is a separate, lower-level concern
//! handled inside the upstream clients themselves.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

/// Default delay between fill attempts for a single resource.
pub const RETRY_DELAY: Duration = Duration::from_secs(30);

/// Retry `f` forever (no attempt cap) until it returns `Ok`, sleeping
/// `delay` between attempts and logging each failure at WARN. The only
/// way out of the loop short of success is cancellation by the caller's
/// own future being dropped (e.g. on process shutdown).
pub async fn retry_forever<F, Fut, T, E>(label: &str, delay: Duration, mut f: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return value,
            Err(err) => {
                warn!(resource = label, attempt, %err, "fill attempt failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Same as [`retry_forever`] but logs the final give-up at ERROR after a
/// caller-supplied attempt cap. Used where giving up is the right answer,
/// e.g. the CLI's startup connectivity probes — unlike a per-resource
/// fill, there's no point retrying forever before the pipeline has even
/// started.
pub async fn retry_bounded<F, Fut, T, E>(
    label: &str,
    delay: Duration,
    max_attempts: u64,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts => {
                warn!(resource = label, attempt, %err, "attempt failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                error!(resource = label, attempt, %err, "giving up after max attempts");
                return Err(err);
            }
        }
    }
}
