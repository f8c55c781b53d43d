//! Retry helper for writes that race other writers.
use std::{future::Future, time::Duration};

use rand::Rng;
use tracing::warn;

use crate::pagination::{RawResponse, CONFLICT};

/// Number of conflicting attempts tolerated before the final attempt.
pub const DEFAULT_CONFLICT_RETRIES: usize = 9;

/// Results that may report an HTTP 409 Conflict.
pub trait ConflictStatus {
    /// True if the result is a conflict worth retrying.
    fn is_conflict(&self) -> bool;
}

impl ConflictStatus for u16 {
    fn is_conflict(&self) -> bool {
        *self == CONFLICT
    }
}

impl ConflictStatus for reqwest::StatusCode {
    fn is_conflict(&self) -> bool {
        *self == reqwest::StatusCode::CONFLICT
    }
}

impl ConflictStatus for reqwest::Response {
    fn is_conflict(&self) -> bool {
        self.status().is_conflict()
    }
}

impl ConflictStatus for RawResponse {
    fn is_conflict(&self) -> bool {
        self.status.is_conflict()
    }
}

impl<T: ConflictStatus, E> ConflictStatus for Result<T, E> {
    fn is_conflict(&self) -> bool {
        matches!(self, Ok(value) if value.is_conflict())
    }
}

/// Run `op` until it returns something other than a conflict.
///
/// Up to `retries` attempts are made, each followed by a random pause below one
/// second when it conflicts. Then one last attempt is made and its result is
/// returned as is, so `op` runs at most `retries + 1` times.
pub async fn retry_on_conflict<F, Fut, T>(retries: usize, mut op: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    T: ConflictStatus,
{
    for attempt in 1..=retries {
        let result = op().await;
        if !result.is_conflict() {
            return result;
        }
        let pause = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
        warn!(attempt, retries, ?pause, "conflict, retrying");
        tokio::time::sleep(pause).await;
    }
    op().await
}
