//! Single retry of metadata writes that lost a lock race.

use crate::metrics::CONFLICT_RETRIES;
use hoard_metadata::{MetadataError, MetadataResult};
use std::future::Future;
use std::time::Duration;

/// Pause before the one retry.
pub const CONFLICT_BACKOFF: Duration = Duration::from_millis(50);

/// Run `op`, and run it once more after [`CONFLICT_BACKOFF`] if it reports
/// `MetadataError::Conflict`. Any other error, or a second conflict, is returned as is.
pub async fn retry_on_conflict<T, F, Fut>(what: &str, mut op: F) -> MetadataResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = MetadataResult<T>>,
{
    match op().await {
        Err(MetadataError::Conflict(msg)) => {
            CONFLICT_RETRIES.inc();
            tracing::debug!(operation = what, error = %msg, "metadata conflict, retrying once");
            tokio::time::sleep(CONFLICT_BACKOFF).await;
            op().await
        }
        other => other,
    }
}
