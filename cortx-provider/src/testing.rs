//! In-memory storage client for tests
//!
//! Versions and delete markers are kept per bucket, ordered by key and version
//! id. Listing pages are cut with a marker, so deleting entries while walking the
//! listing behaves like the real service. Failures can be scripted per call or
//! per item.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::ops::Bound;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::client::{
    DeletionOutcome, ErrorKind, HeadObjectRequest, MAX_KEYS_PER_PAGE, ObjectHead,
    ObjectVersionRef, PageToken, StorageClient, StorageError, StorageResult, VersionPage,
    VersioningConfig, VersioningStatus,
};

/// A call received by [`FakeStorage`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    HeadBucket(String),
    CreateBucket {
        bucket: String,
        object_lock_enabled: bool,
    },
    DeleteBucket(String),
    GetBucketLocation(String),
    GetBucketVersioning(String),
    PutBucketVersioning {
        bucket: String,
        config: VersioningConfig,
    },
    GetObjectLockConfiguration(String),
    ListObjectVersions,
    DeleteObjects {
        refs: usize,
        bypass_governance: bool,
    },
    DeleteObjectLegalHold(ObjectVersionRef),
    DeleteObject(ObjectVersionRef),
    HeadObject(HeadObjectRequest),
}

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    delete_marker: bool,
    head: ObjectHead,
}

#[derive(Debug, Clone)]
struct FakeBucket {
    region: String,
    versioning: Option<VersioningStatus>,
    object_lock_enabled: bool,
    entries: BTreeMap<ObjectVersionRef, Entry>,
}

impl FakeBucket {
    fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            versioning: None,
            object_lock_enabled: false,
            entries: BTreeMap::new(),
        }
    }
}

#[derive(Default)]
struct Inner {
    buckets: HashMap<String, FakeBucket>,
    legal_holds: HashSet<(String, ObjectVersionRef)>,
    calls: Vec<Call>,
    call_counts: HashMap<&'static str, usize>,
    next_failures: HashMap<&'static str, VecDeque<StorageError>>,
    nth_failures: HashMap<(&'static str, usize), StorageError>,
    item_failures: HashMap<(String, ObjectVersionRef), (String, String)>,
    cancel_after: Vec<(&'static str, usize, CancellationToken)>,
    repeat_item_failures: bool,
    hidden: HashMap<String, usize>,
    seq: u64,
}

impl Inner {
    /// Record a call and return any scripted failure for it
    fn begin(&mut self, operation: &'static str, call: Call) -> StorageResult<()> {
        self.calls.push(call);
        let count = self.call_counts.entry(operation).or_insert(0);
        *count += 1;
        let count = *count;

        for (op, n, token) in &self.cancel_after {
            if *op == operation && *n == count {
                token.cancel();
            }
        }

        if let Some(err) = self.nth_failures.remove(&(operation, count)) {
            return Err(err);
        }
        if let Some(err) = self
            .next_failures
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        Ok(())
    }

    fn bucket(&mut self, operation: &'static str, bucket: &str) -> StorageResult<&mut FakeBucket> {
        self.buckets.get_mut(bucket).ok_or_else(|| {
            StorageError::from_code(
                operation,
                "NoSuchBucket",
                "The specified bucket does not exist",
            )
        })
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// In-memory [`StorageClient`]
pub struct FakeStorage {
    inner: Mutex<Inner>,
    page_size: usize,
    region: String,
}

impl Default for FakeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::with_page_size(MAX_KEYS_PER_PAGE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            page_size,
            region: "us-east-1".to_string(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn add_bucket(&self, bucket: &str) {
        let region = self.region.clone();
        self.lock()
            .buckets
            .insert(bucket.to_string(), FakeBucket::new(&region));
    }

    pub fn add_bucket_in_region(&self, bucket: &str, region: &str) {
        self.lock()
            .buckets
            .insert(bucket.to_string(), FakeBucket::new(region));
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.lock().buckets.contains_key(bucket)
    }

    pub fn set_versioning(&self, bucket: &str, status: VersioningStatus) {
        if let Some(b) = self.lock().buckets.get_mut(bucket) {
            b.versioning = Some(status);
        }
    }

    pub fn versioning(&self, bucket: &str) -> Option<VersioningStatus> {
        self.lock().buckets.get(bucket).and_then(|b| b.versioning)
    }

    /// Report the bucket as missing for the next `head_calls` HeadBucket calls
    pub fn hide_bucket(&self, bucket: &str, head_calls: usize) {
        self.lock().hidden.insert(bucket.to_string(), head_calls);
    }

    pub fn put_version(&self, bucket: &str, key: &str, version_id: &str) {
        self.put_object(bucket, key, version_id, ObjectHead::default());
    }

    /// Store an object version with the given metadata
    pub fn put_object(&self, bucket: &str, key: &str, version_id: &str, head: ObjectHead) {
        self.insert(bucket, key, version_id, false, head);
    }

    pub fn put_delete_marker(&self, bucket: &str, key: &str, version_id: &str) {
        self.insert(bucket, key, version_id, true, ObjectHead::default());
    }

    fn insert(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
        delete_marker: bool,
        head: ObjectHead,
    ) {
        let mut inner = self.lock();
        let seq = inner.next_seq();
        let b = inner
            .buckets
            .get_mut(bucket)
            .expect("bucket must exist before adding objects");
        b.entries.insert(
            ObjectVersionRef::new(key, version_id),
            Entry {
                seq,
                delete_marker,
                head,
            },
        );
    }

    pub fn set_legal_hold(&self, bucket: &str, key: &str, version_id: &str) {
        self.lock()
            .legal_holds
            .insert((bucket.to_string(), ObjectVersionRef::new(key, version_id)));
    }

    pub fn has_version(&self, bucket: &str, key: &str, version_id: &str) -> bool {
        self.lock()
            .buckets
            .get(bucket)
            .is_some_and(|b| b.entries.contains_key(&ObjectVersionRef::new(key, version_id)))
    }

    /// Number of versions and delete markers left in the bucket
    pub fn entry_count(&self, bucket: &str) -> usize {
        self.lock()
            .buckets
            .get(bucket)
            .map_or(0, |b| b.entries.len())
    }

    /// Fail the next call of `operation`; repeated calls queue up
    pub fn fail_next(&self, operation: &'static str, err: StorageError) {
        self.lock()
            .next_failures
            .entry(operation)
            .or_default()
            .push_back(err);
    }

    /// Fail the `n`th call (1-based) of `operation`
    pub fn fail_nth(&self, operation: &'static str, n: usize, err: StorageError) {
        self.lock().nth_failures.insert((operation, n), err);
    }

    /// Report a per-item failure whenever a batch delete includes this version
    pub fn fail_item(&self, bucket: &str, key: &str, version_id: &str, code: &str, message: &str) {
        self.lock().item_failures.insert(
            (bucket.to_string(), ObjectVersionRef::new(key, version_id)),
            (code.to_string(), message.to_string()),
        );
    }

    /// Report every per-item batch failure twice, as a misbehaving backend might
    pub fn repeat_item_failures(&self) {
        self.lock().repeat_item_failures = true;
    }

    /// Cancel `token` while serving the `n`th call of `operation`
    pub fn cancel_after_calls(&self, token: &CancellationToken, operation: &'static str, n: usize) {
        self.lock().cancel_after.push((operation, n, token.clone()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn head_bucket(&self, bucket: &str) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.begin("HeadBucket", Call::HeadBucket(bucket.to_string()))?;

        if let Some(remaining) = inner.hidden.get_mut(bucket) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::from_code("HeadBucket", "NotFound", "Not Found"));
            }
        }
        if !inner.buckets.contains_key(bucket) {
            return Err(StorageError::from_code("HeadBucket", "NotFound", "Not Found"));
        }
        Ok(())
    }

    async fn create_bucket(&self, bucket: &str, object_lock_enabled: bool) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.begin(
            "CreateBucket",
            Call::CreateBucket {
                bucket: bucket.to_string(),
                object_lock_enabled,
            },
        )?;

        if inner.buckets.contains_key(bucket) {
            return Err(StorageError::from_code(
                "CreateBucket",
                "BucketAlreadyOwnedByYou",
                "Your previous request to create the named bucket succeeded and you already own it.",
            ));
        }
        let mut created = FakeBucket::new(&self.region);
        created.object_lock_enabled = object_lock_enabled;
        if object_lock_enabled {
            created.versioning = Some(VersioningStatus::Enabled);
        }
        inner.buckets.insert(bucket.to_string(), created);
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.begin("DeleteBucket", Call::DeleteBucket(bucket.to_string()))?;

        if !inner.bucket("DeleteBucket", bucket)?.entries.is_empty() {
            return Err(StorageError::from_code(
                "DeleteBucket",
                "BucketNotEmpty",
                "The bucket you tried to delete is not empty",
            ));
        }
        inner.buckets.remove(bucket);
        Ok(())
    }

    async fn get_bucket_location(&self, bucket: &str) -> StorageResult<String> {
        let mut inner = self.lock();
        inner.begin("GetBucketLocation", Call::GetBucketLocation(bucket.to_string()))?;
        Ok(inner.bucket("GetBucketLocation", bucket)?.region.clone())
    }

    async fn get_bucket_versioning(&self, bucket: &str) -> StorageResult<Option<VersioningStatus>> {
        let mut inner = self.lock();
        inner.begin("GetBucketVersioning", Call::GetBucketVersioning(bucket.to_string()))?;
        Ok(inner.bucket("GetBucketVersioning", bucket)?.versioning)
    }

    async fn put_bucket_versioning(
        &self,
        bucket: &str,
        config: &VersioningConfig,
    ) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.begin(
            "PutBucketVersioning",
            Call::PutBucketVersioning {
                bucket: bucket.to_string(),
                config: config.clone(),
            },
        )?;
        let b = inner.bucket("PutBucketVersioning", bucket)?;
        if let Some(status) = config.status {
            b.versioning = Some(status);
        }
        Ok(())
    }

    async fn get_object_lock_enabled(&self, bucket: &str) -> StorageResult<bool> {
        let mut inner = self.lock();
        inner.begin(
            "GetObjectLockConfiguration",
            Call::GetObjectLockConfiguration(bucket.to_string()),
        )?;
        Ok(inner
            .bucket("GetObjectLockConfiguration", bucket)?
            .object_lock_enabled)
    }

    async fn list_object_versions_page(
        &self,
        bucket: &str,
        token: Option<&PageToken>,
    ) -> StorageResult<VersionPage> {
        let mut inner = self.lock();
        inner.begin("ListObjectVersions", Call::ListObjectVersions)?;
        let b = inner.bucket("ListObjectVersions", bucket)?;

        let start = match token {
            Some(t) => Bound::Excluded(ObjectVersionRef::new(
                t.key_marker.clone().unwrap_or_default(),
                t.version_id_marker.clone().unwrap_or_default(),
            )),
            None => Bound::Unbounded,
        };

        let mut range = b.entries.range((start, Bound::Unbounded));
        let chunk: Vec<(ObjectVersionRef, bool)> = range
            .by_ref()
            .take(self.page_size)
            .map(|(r, e)| (r.clone(), e.delete_marker))
            .collect();
        let truncated = range.next().is_some();

        let next = if truncated {
            chunk.last().map(|(last, _)| PageToken {
                key_marker: Some(last.key.clone()),
                version_id_marker: Some(last.version_id.clone()),
            })
        } else {
            None
        };

        let (markers, versions): (Vec<_>, Vec<_>) = chunk.into_iter().partition(|(_, dm)| *dm);
        Ok(VersionPage {
            versions: versions.into_iter().map(|(r, _)| r).collect(),
            delete_markers: markers.into_iter().map(|(r, _)| r).collect(),
            next,
        })
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        refs: &[ObjectVersionRef],
        bypass_governance: bool,
    ) -> StorageResult<Vec<DeletionOutcome>> {
        let mut inner = self.lock();
        inner.begin(
            "DeleteObjects",
            Call::DeleteObjects {
                refs: refs.len(),
                bypass_governance,
            },
        )?;
        inner.bucket("DeleteObjects", bucket)?;

        let mut failures = Vec::new();
        for r in refs {
            let held_key = (bucket.to_string(), r.clone());
            if let Some((code, message)) = inner.item_failures.get(&held_key) {
                failures.push(DeletionOutcome::new(&r.key, &r.version_id, code, message));
                continue;
            }
            if inner.legal_holds.contains(&held_key) {
                failures.push(DeletionOutcome::new(
                    &r.key,
                    &r.version_id,
                    "AccessDenied",
                    "Object is under legal hold",
                ));
                continue;
            }
            if let Some(b) = inner.buckets.get_mut(bucket) {
                b.entries.remove(r);
            }
        }
        if inner.repeat_item_failures {
            failures.extend(failures.clone());
        }
        Ok(failures)
    }

    async fn delete_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> StorageResult<()> {
        let r = ObjectVersionRef::new(key, version_id);
        let mut inner = self.lock();
        inner.begin("PutObjectLegalHold", Call::DeleteObjectLegalHold(r.clone()))?;
        inner.bucket("PutObjectLegalHold", bucket)?;
        inner.legal_holds.remove(&(bucket.to_string(), r));
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str, version_id: &str) -> StorageResult<()> {
        let r = ObjectVersionRef::new(key, version_id);
        let mut inner = self.lock();
        inner.begin("DeleteObject", Call::DeleteObject(r.clone()))?;

        if inner.legal_holds.contains(&(bucket.to_string(), r.clone())) {
            return Err(StorageError::from_code(
                "DeleteObject",
                "AccessDenied",
                "Object is under legal hold",
            ));
        }
        inner.bucket("DeleteObject", bucket)?.entries.remove(&r);
        Ok(())
    }

    async fn head_object(
        &self,
        bucket: &str,
        request: &HeadObjectRequest,
    ) -> StorageResult<ObjectHead> {
        let mut inner = self.lock();
        inner.begin("HeadObject", Call::HeadObject(request.clone()))?;
        let b = inner.bucket("HeadObject", bucket)?;

        let found = match &request.version_id {
            Some(version_id) => b
                .entries
                .get(&ObjectVersionRef::new(&request.key, version_id))
                .map(|e| (version_id.clone(), e)),
            None => b
                .entries
                .iter()
                .filter(|(r, _)| r.key == request.key)
                .max_by_key(|(_, e)| e.seq)
                .map(|(r, e)| (r.version_id.clone(), e)),
        };

        match found {
            // S3 answers a plain HEAD on a deleted key with 404
            Some((_, entry)) if entry.delete_marker && request.version_id.is_none() => {
                Err(StorageError::from_code("HeadObject", "NotFound", "Not Found"))
            }
            Some((version_id, entry)) => Ok(ObjectHead {
                delete_marker: entry.delete_marker,
                version_id: Some(version_id),
                ..entry.head.clone()
            }),
            None => Err(StorageError::from_code("HeadObject", "NotFound", "Not Found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listing_pages_survive_deletes() {
        let storage = FakeStorage::with_page_size(2);
        storage.add_bucket("b");
        for key in ["a", "b", "c"] {
            storage.put_version("b", key, "1");
        }

        let first = storage.list_object_versions_page("b", None).await.unwrap();
        assert_eq!(first.versions.len(), 2);
        storage.delete_objects("b", &first.versions, true).await.unwrap();

        let second = storage
            .list_object_versions_page("b", first.next.as_ref())
            .await
            .unwrap();
        assert_eq!(second.versions, vec![ObjectVersionRef::new("c", "1")]);
        assert!(second.is_last());
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let storage = FakeStorage::new();
        storage.add_bucket("b");
        storage.fail_next(
            "HeadBucket",
            StorageError::from_code("HeadBucket", "OperationAborted", "busy"),
        );

        let err = storage.head_bucket("b").await.unwrap_err();
        assert!(err.is(ErrorKind::Conflict));
        assert!(storage.head_bucket("b").await.is_ok());
    }
}
