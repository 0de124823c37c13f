//! Bucket teardown
//!
//! Empties a bucket completely so that it can be deleted: every object version
//! is removed first, then every delete marker. Versions held by a legal hold are
//! unlocked and deleted one at a time. Partial progress is always reported:
//! each operation returns the number of entries removed together with the first
//! error, so that a caller can tell "deleted 1998 of 2000" from "deleted none".
//!
//! Listing order is whatever the backend returns; nothing here depends on it.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::client::{
    DeletionOutcome, ErrorKind, ObjectVersionRef, PageToken, StorageClient, StorageError,
    VersionPage,
};
use crate::retry::retry_when_kind_cancellable;

/// What a batch delete was removing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Versions,
    DeleteMarkers,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Versions => write!(f, "objects"),
            Target::DeleteMarkers => write!(f, "delete markers"),
        }
    }
}

/// Failure to delete one object version
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObjectError {
    /// Failure reported by the batch delete for this item
    #[error("deleting: S3 object ({key}) version ({version_id}): {code}: {message}")]
    Delete {
        key: String,
        version_id: String,
        kind: ErrorKind,
        code: String,
        message: String,
    },

    /// Clearing the legal hold failed
    #[error("removing legal hold: S3 object ({key}) version ({version_id}): {source}")]
    RemoveLegalHold {
        key: String,
        version_id: String,
        source: StorageError,
    },

    /// The single-item delete after clearing the hold failed
    #[error("deleting: S3 object ({key}) version ({version_id}): {source}")]
    DeleteAfterHold {
        key: String,
        version_id: String,
        source: StorageError,
    },
}

impl From<&DeletionOutcome> for ObjectError {
    fn from(outcome: &DeletionOutcome) -> Self {
        ObjectError::Delete {
            key: outcome.key.clone(),
            version_id: outcome.version_id.clone(),
            kind: outcome.kind,
            code: outcome.code.clone(),
            message: outcome.message.clone(),
        }
    }
}

/// Errors raised while emptying a bucket
#[derive(Debug, Error)]
pub enum TeardownError {
    /// The listing call itself failed
    #[error("listing S3 Bucket ({bucket}) object versions: {source}")]
    List { bucket: String, source: StorageError },

    /// The batch delete call itself failed
    #[error("deleting S3 Bucket ({bucket}) {target}: {source}")]
    Delete {
        bucket: String,
        target: Target,
        source: StorageError,
    },

    /// Some items could not be deleted; every failure is kept
    #[error("deleting S3 Bucket ({bucket}) {target}: {}", format_errors(.errors))]
    Objects {
        bucket: String,
        target: Target,
        errors: Vec<ObjectError>,
    },

    #[error("S3 Bucket ({bucket}) teardown cancelled")]
    Cancelled { bucket: String },
}

impl TeardownError {
    /// Per-item failures carried by this error, if any
    pub fn object_errors(&self) -> &[ObjectError] {
        match self {
            TeardownError::Objects { errors, .. } => errors,
            _ => &[],
        }
    }
}

fn format_errors(errors: &[ObjectError]) -> String {
    let mut out = if errors.len() == 1 {
        "1 error occurred:".to_string()
    } else {
        format!("{} errors occurred:", errors.len())
    };
    for err in errors {
        out.push_str("\n\t* ");
        out.push_str(&err.to_string());
    }
    out
}

pub type TeardownResult<T> = Result<T, TeardownError>;

/// Entries removed so far and how the operation ended
#[derive(Debug)]
#[must_use]
pub struct Outcome {
    pub deleted: i64,
    pub result: TeardownResult<()>,
}

impl Outcome {
    pub fn ok(deleted: i64) -> Self {
        Self {
            deleted,
            result: Ok(()),
        }
    }

    pub fn failed(deleted: i64, error: TeardownError) -> Self {
        Self {
            deleted,
            result: Err(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Drop the count on failure
    pub fn into_result(self) -> TeardownResult<i64> {
        self.result.map(|()| self.deleted)
    }
}

/// How to retry clearing a legal hold before the single-item delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LegalHoldRetry {
    /// One attempt
    #[default]
    Once,
    /// Retry transient conflicts until the timeout
    Bounded(Duration),
}

/// Receives each page produced by [`for_each_object_versions_page`]
#[async_trait]
pub trait PageConsumer: Send + Sync {
    async fn consume(
        &self,
        cancel: &CancellationToken,
        client: &dyn StorageClient,
        bucket: &str,
        page: &VersionPage,
    ) -> Outcome;
}

/// Run `fut` unless `cancel` fires first
async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    bucket: &str,
    fut: F,
) -> TeardownResult<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TeardownError::Cancelled { bucket: bucket.to_string() }),
        output = fut => Ok(output),
    }
}

/// Walk every page of versions and delete markers, handing each to `consumer`
///
/// Counts are accumulated even when a page fails. Pagination stops at the
/// first consumer error; the count of everything removed so far is kept.
pub async fn for_each_object_versions_page<C>(
    cancel: &CancellationToken,
    client: &dyn StorageClient,
    bucket: &str,
    consumer: &C,
) -> Outcome
where
    C: PageConsumer + ?Sized,
{
    let mut deleted = 0;
    let mut token: Option<PageToken> = None;

    loop {
        let listed = until_cancelled(
            cancel,
            bucket,
            client.list_object_versions_page(bucket, token.as_ref()),
        )
        .await;

        let page = match listed {
            Ok(Ok(page)) => page,
            Ok(Err(source)) => {
                return Outcome::failed(
                    deleted,
                    TeardownError::List {
                        bucket: bucket.to_string(),
                        source,
                    },
                );
            }
            Err(cancelled) => return Outcome::failed(deleted, cancelled),
        };

        let outcome = consumer.consume(cancel, client, bucket, &page).await;
        deleted += outcome.deleted;
        if let Err(err) = outcome.result {
            return Outcome::failed(deleted, err);
        }

        match page.next {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    Outcome::ok(deleted)
}

/// Issue one quiet batch delete
///
/// A vanished bucket counts as nothing left to do.
async fn delete_batch(
    cancel: &CancellationToken,
    client: &dyn StorageClient,
    bucket: &str,
    refs: &[ObjectVersionRef],
    target: Target,
) -> TeardownResult<Option<Vec<DeletionOutcome>>> {
    let bypass_governance = target == Target::Versions;
    match until_cancelled(cancel, bucket, client.delete_objects(bucket, refs, bypass_governance))
        .await?
    {
        Ok(failures) => Ok(Some(failures)),
        Err(err) if err.is(ErrorKind::NoSuchBucket) => {
            debug!("S3 Bucket ({}) already gone while deleting {}", bucket, target);
            Ok(None)
        }
        Err(source) => Err(TeardownError::Delete {
            bucket: bucket.to_string(),
            target,
            source,
        }),
    }
}

/// Deletes object versions, recovering items blocked by a legal hold
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteObjectVersions {
    pub legal_hold: LegalHoldRetry,
}

impl DeleteObjectVersions {
    pub fn new(legal_hold: LegalHoldRetry) -> Self {
        Self { legal_hold }
    }

    /// Clear the legal hold of a denied version, then delete it on its own
    ///
    /// Returns the item errors; an empty list means the version is gone.
    async fn recover(
        &self,
        cancel: &CancellationToken,
        client: &dyn StorageClient,
        bucket: &str,
        failure: &DeletionOutcome,
    ) -> TeardownResult<Vec<ObjectError>> {
        let key = failure.key.as_str();
        let version_id = failure.version_id.as_str();
        warn!(
            "S3 Bucket ({}) object ({}) version ({}) denied, removing legal hold",
            bucket, key, version_id
        );

        let cleared = match self.legal_hold {
            LegalHoldRetry::Once => {
                until_cancelled(
                    cancel,
                    bucket,
                    client.delete_object_legal_hold(bucket, key, version_id),
                )
                .await?
            }
            LegalHoldRetry::Bounded(timeout) => {
                let result = retry_when_kind_cancellable(
                    cancel,
                    timeout,
                    || client.delete_object_legal_hold(bucket, key, version_id),
                    &[ErrorKind::Conflict],
                )
                .await;
                if cancel.is_cancelled() {
                    return Err(TeardownError::Cancelled {
                        bucket: bucket.to_string(),
                    });
                }
                result
            }
        };

        if let Err(source) = cleared {
            return Ok(vec![
                ObjectError::from(failure),
                ObjectError::RemoveLegalHold {
                    key: key.to_string(),
                    version_id: version_id.to_string(),
                    source,
                },
            ]);
        }

        let deleted =
            until_cancelled(cancel, bucket, client.delete_object(bucket, key, version_id)).await?;
        match deleted {
            Ok(()) => Ok(Vec::new()),
            Err(source) => Ok(vec![
                ObjectError::from(failure),
                ObjectError::DeleteAfterHold {
                    key: key.to_string(),
                    version_id: version_id.to_string(),
                    source,
                },
            ]),
        }
    }
}

#[async_trait]
impl PageConsumer for DeleteObjectVersions {
    async fn consume(
        &self,
        cancel: &CancellationToken,
        client: &dyn StorageClient,
        bucket: &str,
        page: &VersionPage,
    ) -> Outcome {
        if page.versions.is_empty() {
            return Outcome::ok(0);
        }

        let failures =
            match delete_batch(cancel, client, bucket, &page.versions, Target::Versions).await {
                Ok(Some(failures)) => failures,
                Ok(None) => return Outcome::ok(0),
                Err(err) => return Outcome::failed(0, err),
            };

        let mut deleted = page.versions.len() as i64 - failures.len() as i64;
        let mut errors = Vec::new();

        for failure in &failures {
            match failure.kind {
                ErrorKind::NotFound => continue,
                kind if kind.is_access_denied() => {
                    match self.recover(cancel, client, bucket, failure).await {
                        Ok(item_errors) if item_errors.is_empty() => deleted += 1,
                        Ok(mut item_errors) => errors.append(&mut item_errors),
                        Err(cancelled) => return Outcome::failed(deleted, cancelled),
                    }
                }
                _ => errors.push(ObjectError::from(failure)),
            }
        }

        debug!(
            "S3 Bucket ({}): deleted {} of {} object versions in page",
            bucket,
            deleted,
            page.versions.len()
        );

        if errors.is_empty() {
            Outcome::ok(deleted)
        } else {
            Outcome::failed(
                deleted,
                TeardownError::Objects {
                    bucket: bucket.to_string(),
                    target: Target::Versions,
                    errors,
                },
            )
        }
    }
}

/// Deletes delete markers; they cannot be held, so every failure is recorded
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteDeleteMarkers;

#[async_trait]
impl PageConsumer for DeleteDeleteMarkers {
    async fn consume(
        &self,
        cancel: &CancellationToken,
        client: &dyn StorageClient,
        bucket: &str,
        page: &VersionPage,
    ) -> Outcome {
        if page.delete_markers.is_empty() {
            return Outcome::ok(0);
        }

        let failures = match delete_batch(
            cancel,
            client,
            bucket,
            &page.delete_markers,
            Target::DeleteMarkers,
        )
        .await
        {
            Ok(Some(failures)) => failures,
            Ok(None) => return Outcome::ok(0),
            Err(err) => return Outcome::failed(0, err),
        };

        let deleted = page.delete_markers.len() as i64 - failures.len() as i64;
        if failures.is_empty() {
            return Outcome::ok(deleted);
        }

        Outcome::failed(
            deleted,
            TeardownError::Objects {
                bucket: bucket.to_string(),
                target: Target::DeleteMarkers,
                errors: failures.iter().map(ObjectError::from).collect(),
            },
        )
    }
}

/// Delete one page (at most 1000) of object versions
pub async fn delete_page_of_object_versions(
    cancel: &CancellationToken,
    client: &dyn StorageClient,
    bucket: &str,
    page: &VersionPage,
) -> Outcome {
    DeleteObjectVersions::default()
        .consume(cancel, client, bucket, page)
        .await
}

/// Delete one page (at most 1000) of delete markers
pub async fn delete_page_of_delete_markers(
    cancel: &CancellationToken,
    client: &dyn StorageClient,
    bucket: &str,
    page: &VersionPage,
) -> Outcome {
    DeleteDeleteMarkers.consume(cancel, client, bucket, page).await
}

/// Force-empty settings
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyBucket {
    pub legal_hold: LegalHoldRetry,
}

impl EmptyBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_legal_hold_retry(mut self, legal_hold: LegalHoldRetry) -> Self {
        self.legal_hold = legal_hold;
        self
    }

    /// Retry legal-hold removal on conflicts until `timeout` elapses
    pub fn with_bounded_legal_hold_retry(self, timeout: Duration) -> Self {
        self.with_legal_hold_retry(LegalHoldRetry::Bounded(timeout))
    }

    /// Delete every object version, then every delete marker
    ///
    /// Versions go first because a backend may refuse to remove delete markers
    /// while locked versions of the same key remain. The second pass is skipped
    /// when the first fails.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        client: &dyn StorageClient,
        bucket: &str,
    ) -> Outcome {
        let versions = DeleteObjectVersions::new(self.legal_hold);
        let first = for_each_object_versions_page(cancel, client, bucket, &versions).await;
        if first.result.is_err() {
            return first;
        }

        let second =
            for_each_object_versions_page(cancel, client, bucket, &DeleteDeleteMarkers).await;
        Outcome {
            deleted: first.deleted + second.deleted,
            result: second.result,
        }
    }
}

/// Empty a bucket with default settings
pub async fn empty_bucket(
    cancel: &CancellationToken,
    client: &dyn StorageClient,
    bucket: &str,
) -> Outcome {
    EmptyBucket::default().run(cancel, client, bucket).await
}
