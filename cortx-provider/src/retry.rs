//! Retry helpers keyed on storage error kinds

use std::future::Future;
use std::time::Duration;

use cortx_core::retry::{RetryPolicy, retry_until, retry_until_cancellable};
use tokio_util::sync::CancellationToken;

use crate::client::{ErrorKind, StorageError, StorageResult};

/// How long to wait for a new bucket to become visible
pub const BUCKET_CREATED_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// How long to wait for bucket configuration to propagate
pub const PROPAGATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry `operation` while it fails with one of `kinds`
///
/// Any other kind is returned immediately. See [`retry_until`] for the
/// final-attempt rule.
pub async fn retry_when_kind<T, F, Fut>(
    timeout: Duration,
    operation: F,
    kinds: &[ErrorKind],
) -> StorageResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    retry_until(timeout, &RetryPolicy::default(), operation, |err: &StorageError| {
        kinds.contains(&err.kind)
    })
    .await
}

/// [`retry_when_kind`] that gives up waiting once `cancel` fires
pub async fn retry_when_kind_cancellable<T, F, Fut>(
    cancel: &CancellationToken,
    timeout: Duration,
    operation: F,
    kinds: &[ErrorKind],
) -> StorageResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    retry_until_cancellable(
        cancel,
        timeout,
        &RetryPolicy::default(),
        operation,
        |err: &StorageError| kinds.contains(&err.kind),
    )
    .await
}
