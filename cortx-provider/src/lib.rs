//! CORTX Provider
//!
//! Provisions buckets on a CORTX (S3-compatible) object store and reads bucket
//! and object data sources. Deleting a bucket with `force_destroy` set empties
//! it first, legal holds included; see [`teardown`].

mod bucket;
pub mod client;
pub mod config;
mod data_source;
pub mod endpoints;
pub mod retry;
pub mod s3;
pub mod teardown;
#[cfg(test)]
pub(crate) mod testing;
pub mod validation;

use std::sync::Arc;
use std::time::Duration;

use cortx_core::provider::{
    BoxFuture, Provider, ProviderError, ProviderResult, ResourceSchema, ResourceType,
};
use cortx_core::resource::{Resource, ResourceId, State};
use tokio_util::sync::CancellationToken;

use crate::client::StorageClient;
use crate::config::{ConfigError, ProviderConfig};
use crate::s3::S3StorageClient;
use crate::teardown::{EmptyBucket, Outcome};

pub use data_source::object_identifier;

pub const BUCKET_TYPE: &str = "cortx.bucket";
pub const OBJECT_TYPE: &str = "cortx.object";

/// Default number of empty-then-delete rounds before giving up on a bucket
pub const DEFAULT_MAX_EMPTY_ROUNDS: usize = 10;

/// Bucket resource type
pub struct BucketType;

impl ResourceType for BucketType {
    fn name(&self) -> &'static str {
        BUCKET_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::default()
            .with_force_new(&["bucket", "object_lock_enabled"])
            .with_local_only(&["force_destroy"])
    }
}

/// Object data source type
pub struct ObjectType;

impl ResourceType for ObjectType {
    fn name(&self) -> &'static str {
        OBJECT_TYPE
    }
}

/// How long the CRUD handlers wait on eventual consistency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// New bucket becoming visible, and create conflicts settling
    pub bucket_created: Duration,
    /// Configuration changes reaching every node
    pub propagation: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            bucket_created: retry::BUCKET_CREATED_TIMEOUT,
            propagation: retry::PROPAGATION_TIMEOUT,
        }
    }
}

/// CORTX Provider
pub struct CortxProvider {
    client: Arc<dyn StorageClient>,
    region: String,
    cancel: CancellationToken,
    retry_legal_hold: bool,
    timeouts: Timeouts,
    max_empty_rounds: usize,
}

impl CortxProvider {
    /// Create a new CORTX Provider connected to the configured endpoint
    pub async fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let client = S3StorageClient::connect(config).await?;
        Ok(Self::with_client(Arc::new(client), config.region.clone()))
    }

    /// Create with a specific storage client (for testing)
    pub fn with_client(client: Arc<dyn StorageClient>, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
            cancel: CancellationToken::new(),
            retry_legal_hold: false,
            timeouts: Timeouts::default(),
            max_empty_rounds: DEFAULT_MAX_EMPTY_ROUNDS,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Retry clearing legal holds for the propagation timeout instead of once
    pub fn with_legal_hold_retry(mut self, enabled: bool) -> Self {
        self.retry_legal_hold = enabled;
        self
    }

    pub fn with_max_empty_rounds(mut self, rounds: usize) -> Self {
        self.max_empty_rounds = rounds;
        self
    }

    /// Use `cancel` to abort retries and bucket teardown
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn teardown(&self) -> EmptyBucket {
        if self.retry_legal_hold {
            EmptyBucket::new().with_bounded_legal_hold_retry(self.timeouts.propagation)
        } else {
            EmptyBucket::new()
        }
    }

    /// Remove every object version and delete marker from a bucket
    pub async fn empty_bucket(&self, bucket: &str) -> Outcome {
        self.teardown()
            .run(&self.cancel, self.client.as_ref(), bucket)
            .await
    }
}

fn unknown_type(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

impl Provider for CortxProvider {
    fn name(&self) -> &'static str {
        "cortx"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        vec![Box::new(BucketType), Box::new(ObjectType)]
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(str::to_owned);
        Box::pin(async move {
            match id.resource_type.as_str() {
                BUCKET_TYPE => {
                    let bucket = identifier.as_deref().unwrap_or(&id.name);
                    self.read_bucket(&id, bucket, false).await
                }
                OBJECT_TYPE => Err(ProviderError::new(
                    "cortx.object is a data source and can only be read as one",
                )
                .for_resource(id.clone())),
                _ => Err(unknown_type(&id)),
            }
        })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                BUCKET_TYPE => self.read_bucket_data_source(&resource).await,
                OBJECT_TYPE => self.read_object_data_source(&resource).await,
                _ => Err(unknown_type(&resource.id)),
            }
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                BUCKET_TYPE => self.create_bucket(resource).await,
                _ => Err(unknown_type(&resource.id)),
            }
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            match id.resource_type.as_str() {
                BUCKET_TYPE => self.update_bucket(id, &identifier, &from, to).await,
                _ => Err(unknown_type(&id)),
            }
        })
    }

    fn delete(&self, resource: &Resource, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let resource = resource.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                BUCKET_TYPE => self.delete_bucket(&resource, &identifier).await,
                _ => Err(unknown_type(&resource.id)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StorageError;
    use crate::testing::{Call, FakeStorage};

    fn held_bucket_with_conflicts(conflicts: usize) -> Arc<FakeStorage> {
        let storage = Arc::new(FakeStorage::new());
        storage.add_bucket("vault");
        storage.put_version("vault", "held", "v1");
        storage.set_legal_hold("vault", "held", "v1");
        for _ in 0..conflicts {
            storage.fail_next(
                "PutObjectLegalHold",
                StorageError::from_code(
                    "PutObjectLegalHold",
                    "OperationAborted",
                    "A conflicting conditional operation is currently in progress",
                ),
            );
        }
        storage
    }

    #[test]
    fn bucket_schema() {
        let schema = BucketType.schema();
        assert!(schema.is_force_new("bucket"));
        assert!(schema.is_force_new("object_lock_enabled"));
        assert!(schema.is_local_only("force_destroy"));
        assert!(!schema.is_force_new("versioning"));
    }

    #[tokio::test]
    async fn unknown_types_are_rejected() {
        let provider = CortxProvider::with_client(Arc::new(FakeStorage::new()), "us-east-1");
        let resource = Resource::new("cortx.queue", "jobs");

        let err = provider.create(&resource).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "[cortx.queue.jobs] Unknown resource type: cortx.queue"
        );
    }

    #[tokio::test]
    async fn objects_are_data_sources_only() {
        let provider = CortxProvider::with_client(Arc::new(FakeStorage::new()), "us-east-1");
        let id = ResourceId::new(OBJECT_TYPE, "readme");
        assert!(provider.read(&id, None).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn legal_hold_retry_follows_propagation_timeout() {
        let storage = held_bucket_with_conflicts(30);
        let provider = CortxProvider::with_client(storage.clone(), "us-east-1")
            .with_legal_hold_retry(true)
            .with_timeouts(Timeouts {
                propagation: Duration::from_secs(10 * 60),
                ..Timeouts::default()
            });

        let outcome = provider.empty_bucket("vault").await;

        assert_eq!(outcome.into_result().unwrap(), 1);
        assert_eq!(
            storage.count_calls(|c| matches!(c, Call::DeleteObjectLegalHold(_))),
            31
        );
    }

    #[tokio::test(start_paused = true)]
    async fn legal_hold_retry_gives_up_after_default_propagation_timeout() {
        let storage = held_bucket_with_conflicts(30);
        let provider =
            CortxProvider::with_client(storage.clone(), "us-east-1").with_legal_hold_retry(true);

        let outcome = provider.empty_bucket("vault").await;

        assert!(!outcome.is_ok());
        assert!(storage.has_version("vault", "held", "v1"));
    }

    #[tokio::test]
    async fn legal_hold_cleared_once_without_retry() {
        let storage = held_bucket_with_conflicts(1);
        let provider = CortxProvider::with_client(storage.clone(), "us-east-1");

        let outcome = provider.empty_bucket("vault").await;

        assert!(!outcome.is_ok());
        assert_eq!(
            storage.count_calls(|c| matches!(c, Call::DeleteObjectLegalHold(_))),
            1
        );
    }
}
