//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap backend connects, request accumulation and relay reads with an
//!   optional deadline
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - A zero-second setting means "no deadline"
//! - Timeout errors are distinct from other errors

use std::future::Future;
use std::time::Duration;

/// The deadline elapsed before the operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed(pub Duration);

/// Convert a seconds setting into an optional deadline.
pub fn deadline(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Run `fut`, bounded by `limit` when one is set.
pub async fn with_deadline<F: Future>(limit: Option<Duration>, fut: F) -> Result<F::Output, Elapsed> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Elapsed(limit)),
        None => Ok(fut.await),
    }
}
