//! Bucket resource handlers

use std::collections::HashMap;

use cortx_core::provider::{ProviderError, ProviderResult};
use cortx_core::resource::{Resource, ResourceId, State, Value};
use log::{debug, info};

use crate::CortxProvider;
use crate::client::{ErrorKind, VersioningConfig, VersioningStatus};
use crate::endpoints;
use crate::retry::retry_when_kind_cancellable;
use crate::validation::{parse_versioning, validate_bucket, validate_bucket_name};

fn bucket_name(resource: &Resource) -> &str {
    resource.get_string("bucket").unwrap_or(&resource.id.name)
}

impl CortxProvider {
    /// Read a bucket
    ///
    /// A bucket that was just created may not be visible yet, so `is_new`
    /// retries "not found" until the bucket-created timeout.
    pub(crate) async fn read_bucket(
        &self,
        id: &ResourceId,
        bucket: &str,
        is_new: bool,
    ) -> ProviderResult<State> {
        let head = if is_new {
            retry_when_kind_cancellable(
                &self.cancel,
                self.timeouts.bucket_created,
                || self.client.head_bucket(bucket),
                &[ErrorKind::NotFound, ErrorKind::NoSuchBucket],
            )
            .await
        } else {
            self.client.head_bucket(bucket).await
        };

        match head {
            Ok(()) => {}
            Err(err)
                if !is_new && (err.is(ErrorKind::NotFound) || err.is(ErrorKind::NoSuchBucket)) =>
            {
                return Ok(State::not_found(id.clone()));
            }
            Err(err) => {
                return Err(
                    ProviderError::new(format!("Failed on HeadBucket ({}): {}", bucket, err))
                        .for_resource(id.clone())
                        .with_cause(err),
                );
            }
        }

        let mut attributes = HashMap::new();
        attributes.insert("bucket".to_string(), Value::String(bucket.to_string()));
        attributes.insert(
            "arn".to_string(),
            Value::String(endpoints::bucket_arn(bucket)),
        );
        attributes.insert(
            "bucket_domain_name".to_string(),
            Value::String(endpoints::bucket_domain_name(bucket)),
        );
        attributes.insert(
            "bucket_regional_domain_name".to_string(),
            Value::String(endpoints::bucket_regional_domain_name(bucket, &self.region)),
        );

        let versioning = self.client.get_bucket_versioning(bucket).await.map_err(|e| {
            ProviderError::new(format!("Failed to read versioning ({}): {}", bucket, e))
                .for_resource(id.clone())
                .with_cause(e)
        })?;
        if let Some(status) = versioning {
            attributes.insert(
                "versioning".to_string(),
                Value::String(status.as_str().to_string()),
            );
        }

        let object_lock_enabled = self.client.get_object_lock_enabled(bucket).await.map_err(|e| {
            ProviderError::new(format!("Failed to read object lock ({}): {}", bucket, e))
                .for_resource(id.clone())
                .with_cause(e)
        })?;
        attributes.insert(
            "object_lock_enabled".to_string(),
            Value::Bool(object_lock_enabled),
        );

        Ok(State::existing(id.clone(), attributes).with_identifier(bucket))
    }

    /// Create a bucket
    pub(crate) async fn create_bucket(&self, resource: Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let bucket = bucket_name(&resource).to_string();

        validate_bucket(&resource.attributes)
            .and_then(|()| validate_bucket_name(&bucket).map_err(|e| vec![e]))
            .map_err(|errors| {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                ProviderError::new(format!("Invalid bucket: {}", messages.join(", ")))
                    .for_resource(id.clone())
            })?;

        let object_lock_enabled = resource.get_bool_or("object_lock_enabled", false);
        retry_when_kind_cancellable(
            &self.cancel,
            self.timeouts.bucket_created,
            || self.client.create_bucket(&bucket, object_lock_enabled),
            &[ErrorKind::Conflict],
        )
        .await
        .map_err(|e| {
            ProviderError::new(format!("Failed on CreateBucket ({}): {}", bucket, e))
                .for_resource(id.clone())
                .with_cause(e)
        })?;
        info!("Created S3 Bucket ({})", bucket);

        // A new bucket starts unversioned; only enabling needs a call
        if let Some(VersioningStatus::Enabled) = resource
            .get_string("versioning")
            .and_then(parse_versioning)
        {
            self.put_versioning(&id, &bucket, VersioningStatus::Enabled)
                .await?;
        }

        self.read_bucket(&id, &bucket, true).await
    }

    /// Update a bucket's versioning status
    pub(crate) async fn update_bucket(
        &self,
        id: ResourceId,
        identifier: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        if let Some(value) = to.get_string("versioning") {
            let status = parse_versioning(value).ok_or_else(|| {
                ProviderError::new(format!(
                    "Invalid versioning value '{}'. Must be one of: enabled, suspended",
                    value
                ))
                .for_resource(id.clone())
            })?;

            let current = from.attributes.get("versioning").and_then(Value::as_str);
            if current != Some(status.as_str()) {
                self.put_versioning(&id, identifier, status).await?;
            }
        }

        self.read_bucket(&id, identifier, false).await
    }

    async fn put_versioning(
        &self,
        id: &ResourceId,
        bucket: &str,
        status: VersioningStatus,
    ) -> ProviderResult<()> {
        let config = VersioningConfig {
            status: Some(status),
            mfa_delete: None,
        };

        retry_when_kind_cancellable(
            &self.cancel,
            self.timeouts.bucket_created,
            || self.client.put_bucket_versioning(bucket, &config),
            &[ErrorKind::NoSuchBucket],
        )
        .await
        .map_err(|e| {
            ProviderError::new(format!(
                "Failed on PutBucketVersioning ({}): {}",
                bucket, e
            ))
            .for_resource(id.clone())
            .with_cause(e)
        })
    }

    /// Delete a bucket
    ///
    /// A bucket that is already gone counts as deleted. With `force_destroy` a
    /// non-empty bucket is emptied and deletion is tried again, for at most
    /// `max_empty_rounds` rounds.
    pub(crate) async fn delete_bucket(
        &self,
        resource: &Resource,
        identifier: &str,
    ) -> ProviderResult<()> {
        let id = &resource.id;
        let force_destroy = resource.get_bool_or("force_destroy", false);
        let mut rounds = 0;

        loop {
            match self.client.delete_bucket(identifier).await {
                Ok(()) => {
                    info!("Deleted S3 Bucket ({})", identifier);
                    return Ok(());
                }
                Err(err) if err.is(ErrorKind::NoSuchBucket) => {
                    debug!("S3 Bucket ({}) already deleted", identifier);
                    return Ok(());
                }
                Err(err)
                    if err.is(ErrorKind::BucketNotEmpty)
                        && force_destroy
                        && rounds < self.max_empty_rounds =>
                {
                    rounds += 1;
                    debug!("S3 Bucket attempting to forceDestroy {}", err);

                    let deleted = self.empty_bucket(identifier).await.into_result().map_err(|e| {
                        ProviderError::new(format!("emptying S3 Bucket ({}): {}", identifier, e))
                            .for_resource(id.clone())
                            .with_cause(e)
                    })?;
                    debug!("Deleted {} S3 objects", deleted);
                }
                Err(err) => {
                    return Err(ProviderError::new(format!(
                        "Failed on DeleteBucket ({}): {}",
                        identifier, err
                    ))
                    .for_resource(id.clone())
                    .with_cause(err));
                }
            }
        }
    }
}
