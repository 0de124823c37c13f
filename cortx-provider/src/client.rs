//! Storage client capability
//!
//! The subset of the S3 API the provider needs, expressed as a trait so that the
//! teardown logic and CRUD handlers can run against the AWS SDK client or an
//! in-memory fake. Backend error codes are translated into [`ErrorKind`] in
//! exactly one place, [`ErrorKind::from_code`]; nothing else compares codes.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Version id S3 reports for objects written while versioning was never enabled
pub const NULL_VERSION_ID: &str = "null";

/// Maximum number of keys per list page and per batch delete
pub const MAX_KEYS_PER_PAGE: usize = 1000;

/// Classification of a backend error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Key, version or resource not found (possibly not visible yet)
    NotFound,
    /// The bucket does not exist
    NoSuchBucket,
    /// The bucket still contains objects
    BucketNotEmpty,
    /// Access denied because the object version is under legal hold or lock
    AccessDeniedHeld,
    /// Access denied for any other reason
    AccessDeniedOther,
    /// A conflicting operation is in progress (OperationAborted)
    Conflict,
    Other,
}

impl ErrorKind {
    /// Translate a backend error code (and message, for access-denied) into a kind
    pub fn from_code(code: &str, message: &str) -> Self {
        match code {
            "NoSuchKey"
            | "NoSuchVersion"
            | "NotFound"
            | "ObjectLockConfigurationNotFoundError" => ErrorKind::NotFound,
            "NoSuchBucket" => ErrorKind::NoSuchBucket,
            "BucketNotEmpty" => ErrorKind::BucketNotEmpty,
            "AccessDenied" => {
                let message = message.to_ascii_lowercase();
                if message.contains("legal hold")
                    || message.contains("object lock")
                    || message.contains("locked")
                {
                    ErrorKind::AccessDeniedHeld
                } else {
                    ErrorKind::AccessDeniedOther
                }
            }
            "OperationAborted" => ErrorKind::Conflict,
            _ => ErrorKind::Other,
        }
    }

    pub fn is_access_denied(self) -> bool {
        matches!(self, ErrorKind::AccessDeniedHeld | ErrorKind::AccessDeniedOther)
    }
}

/// Error returned by a storage client call
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{operation}: {code}: {message}")]
pub struct StorageError {
    pub kind: ErrorKind,
    /// Backend error code as reported (e.g., "NoSuchBucket")
    pub code: String,
    pub message: String,
    /// API operation that failed (e.g., "DeleteObjects")
    pub operation: &'static str,
}

impl StorageError {
    pub fn from_code(
        operation: &'static str,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let code = code.into();
        let message = message.into();
        Self {
            kind: ErrorKind::from_code(&code, &message),
            code,
            message,
            operation,
        }
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// One immutable version of one object, or one delete marker
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectVersionRef {
    pub key: String,
    pub version_id: String,
}

impl ObjectVersionRef {
    pub fn new(key: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: version_id.into(),
        }
    }
}

/// Continuation markers for the next page of a version listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken {
    pub key_marker: Option<String>,
    pub version_id_marker: Option<String>,
}

/// One page of a version listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionPage {
    pub versions: Vec<ObjectVersionRef>,
    pub delete_markers: Vec<ObjectVersionRef>,
    /// Markers for the following page; `None` on the last page
    pub next: Option<PageToken>,
}

impl VersionPage {
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty() && self.delete_markers.is_empty()
    }

    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// A per-item failure reported by a batch delete
#[derive(Debug, Clone, PartialEq)]
pub struct DeletionOutcome {
    pub key: String,
    pub version_id: String,
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl DeletionOutcome {
    pub fn new(
        key: impl Into<String>,
        version_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let code = code.into();
        let message = message.into();
        Self {
            key: key.into(),
            version_id: version_id.into(),
            kind: ErrorKind::from_code(&code, &message),
            code,
            message,
        }
    }
}

/// Bucket versioning status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersioningStatus {
    Enabled,
    Suspended,
}

impl VersioningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersioningStatus::Enabled => "Enabled",
            VersioningStatus::Suspended => "Suspended",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Enabled" => Some(VersioningStatus::Enabled),
            "Suspended" => Some(VersioningStatus::Suspended),
            _ => None,
        }
    }
}

/// Versioning configuration sent with PutBucketVersioning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersioningConfig {
    pub status: Option<VersioningStatus>,
    pub mfa_delete: Option<bool>,
}

impl VersioningConfig {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.mfa_delete.is_none()
    }
}

/// Arguments of a HeadObject request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadObjectRequest {
    pub key: String,
    pub version_id: Option<String>,
    pub range: Option<String>,
}

/// Object metadata returned by HeadObject
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectHead {
    pub bucket_key_enabled: bool,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_length: i64,
    pub content_type: Option<String>,
    pub delete_marker: bool,
    pub etag: Option<String>,
    /// Already formatted as an RFC 1123 HTTP date
    pub last_modified: Option<String>,
    pub metadata: HashMap<String, String>,
    pub version_id: Option<String>,
    pub website_redirect_location: Option<String>,
}

/// Object-store operations used by the provider
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Check that a bucket exists and is accessible
    async fn head_bucket(&self, bucket: &str) -> StorageResult<()>;

    async fn create_bucket(&self, bucket: &str, object_lock_enabled: bool) -> StorageResult<()>;

    /// Delete an empty bucket
    ///
    /// Fails with [`ErrorKind::BucketNotEmpty`] when objects remain.
    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()>;

    /// Region the bucket lives in
    async fn get_bucket_location(&self, bucket: &str) -> StorageResult<String>;

    /// Current versioning status, `None` if versioning was never configured
    async fn get_bucket_versioning(&self, bucket: &str) -> StorageResult<Option<VersioningStatus>>;

    async fn put_bucket_versioning(
        &self,
        bucket: &str,
        config: &VersioningConfig,
    ) -> StorageResult<()>;

    /// Whether object lock is enabled on the bucket
    async fn get_object_lock_enabled(&self, bucket: &str) -> StorageResult<bool>;

    /// Fetch one page of object versions and delete markers
    async fn list_object_versions_page(
        &self,
        bucket: &str,
        token: Option<&PageToken>,
    ) -> StorageResult<VersionPage>;

    /// Delete up to [`MAX_KEYS_PER_PAGE`] versions in one quiet batch call
    ///
    /// Only failures are returned.
    async fn delete_objects(
        &self,
        bucket: &str,
        refs: &[ObjectVersionRef],
        bypass_governance: bool,
    ) -> StorageResult<Vec<DeletionOutcome>>;

    /// Switch the legal hold of one object version off
    async fn delete_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> StorageResult<()>;

    /// Permanently delete one object version
    async fn delete_object(&self, bucket: &str, key: &str, version_id: &str) -> StorageResult<()>;

    async fn head_object(
        &self,
        bucket: &str,
        request: &HeadObjectRequest,
    ) -> StorageResult<ObjectHead>;
}
