//! AWS SDK backed storage client

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::DateTimeFormat;
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration, Delete, MfaDelete,
    ObjectIdentifier, ObjectLockEnabled, ObjectLockLegalHold, ObjectLockLegalHoldStatus,
    VersioningConfiguration,
};

use crate::client::{
    DeletionOutcome, ErrorKind, HeadObjectRequest, MAX_KEYS_PER_PAGE, NULL_VERSION_ID,
    ObjectHead, ObjectVersionRef, PageToken, StorageClient, StorageError, StorageResult,
    VersionPage, VersioningConfig, VersioningStatus,
};
use crate::config::{ConfigError, ProviderConfig};

/// Storage client talking to a CORTX (or any S3-compatible) endpoint
pub struct S3StorageClient {
    client: Client,
    region: String,
}

impl S3StorageClient {
    /// Connect using the given provider configuration
    ///
    /// CORTX requires path-style addressing, so it is always forced on.
    pub async fn connect(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let sdk_config = config.load_sdk_config().await?;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            region: config.region.clone(),
        })
    }

    /// Create with a specific client (for testing)
    pub fn with_client(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }
}

/// Translate an SDK error into a [`StorageError`]
///
/// HEAD requests carry no error body, so a bare 404 is reported as `NotFound`.
fn translate<E>(operation: &'static str, err: SdkError<E>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let service = err.as_service_error();
    let code = service.and_then(|e| e.code()).map(str::to_owned);
    let message = service
        .and_then(|e| e.message())
        .map(str::to_owned)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

    match (code, status) {
        (Some(code), _) => StorageError::from_code(operation, code, message),
        (None, Some(404)) => StorageError::from_code(operation, "NotFound", message),
        (None, Some(403)) => StorageError::from_code(operation, "AccessDenied", message),
        (None, _) => StorageError {
            kind: ErrorKind::Other,
            code: "RequestFailed".to_string(),
            message,
            operation,
        },
    }
}

fn build_error(operation: &'static str, err: impl std::fmt::Display) -> StorageError {
    StorageError::from_code(operation, "InvalidRequest", err.to_string())
}

#[async_trait]
impl StorageClient for S3StorageClient {
    async fn head_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| translate("HeadBucket", e))?;
        Ok(())
    }

    async fn create_bucket(&self, bucket: &str, object_lock_enabled: bool) -> StorageResult<()> {
        let mut req = self
            .client
            .create_bucket()
            .bucket(bucket)
            .object_lock_enabled_for_bucket(object_lock_enabled);

        // LocationConstraint must be omitted for us-east-1
        if self.region != "us-east-1" {
            let config = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build();
            req = req.create_bucket_configuration(config);
        }

        req.send().await.map_err(|e| translate("CreateBucket", e))?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| translate("DeleteBucket", e))?;
        Ok(())
    }

    async fn get_bucket_location(&self, bucket: &str) -> StorageResult<String> {
        let output = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| translate("GetBucketLocation", e))?;

        // An empty constraint means the legacy default region
        Ok(output
            .location_constraint()
            .map(|c| c.as_str())
            .filter(|c| !c.is_empty())
            .unwrap_or("us-east-1")
            .to_string())
    }

    async fn get_bucket_versioning(&self, bucket: &str) -> StorageResult<Option<VersioningStatus>> {
        let output = self
            .client
            .get_bucket_versioning()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| translate("GetBucketVersioning", e))?;

        Ok(output.status().and_then(|s| VersioningStatus::parse(s.as_str())))
    }

    async fn put_bucket_versioning(
        &self,
        bucket: &str,
        config: &VersioningConfig,
    ) -> StorageResult<()> {
        let status = config.status.map(|s| match s {
            VersioningStatus::Enabled => BucketVersioningStatus::Enabled,
            VersioningStatus::Suspended => BucketVersioningStatus::Suspended,
        });
        let mfa_delete = config.mfa_delete.map(|enabled| {
            if enabled {
                MfaDelete::Enabled
            } else {
                MfaDelete::Disabled
            }
        });
        let versioning = VersioningConfiguration::builder()
            .set_status(status)
            .set_mfa_delete(mfa_delete)
            .build();

        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(versioning)
            .send()
            .await
            .map_err(|e| translate("PutBucketVersioning", e))?;
        Ok(())
    }

    async fn get_object_lock_enabled(&self, bucket: &str) -> StorageResult<bool> {
        match self
            .client
            .get_object_lock_configuration()
            .bucket(bucket)
            .send()
            .await
        {
            Ok(output) => Ok(output
                .object_lock_configuration()
                .and_then(|c| c.object_lock_enabled())
                .is_some_and(|e| *e == ObjectLockEnabled::Enabled)),
            Err(err) => {
                let err = translate("GetObjectLockConfiguration", err);
                if err.is(ErrorKind::NotFound) {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn list_object_versions_page(
        &self,
        bucket: &str,
        token: Option<&PageToken>,
    ) -> StorageResult<VersionPage> {
        let mut req = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .max_keys(MAX_KEYS_PER_PAGE as i32);

        if let Some(token) = token {
            req = req
                .set_key_marker(token.key_marker.clone())
                .set_version_id_marker(token.version_id_marker.clone());
        }

        let output = req
            .send()
            .await
            .map_err(|e| translate("ListObjectVersions", e))?;

        let versions = output
            .versions()
            .iter()
            .filter_map(|v| {
                Some(ObjectVersionRef::new(
                    v.key()?,
                    v.version_id().unwrap_or(NULL_VERSION_ID),
                ))
            })
            .collect();

        let delete_markers = output
            .delete_markers()
            .iter()
            .filter_map(|m| {
                Some(ObjectVersionRef::new(
                    m.key()?,
                    m.version_id().unwrap_or(NULL_VERSION_ID),
                ))
            })
            .collect();

        let next = if output.is_truncated().unwrap_or(false) {
            Some(PageToken {
                key_marker: output.next_key_marker().map(str::to_owned),
                version_id_marker: output.next_version_id_marker().map(str::to_owned),
            })
        } else {
            None
        };

        Ok(VersionPage {
            versions,
            delete_markers,
            next,
        })
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        refs: &[ObjectVersionRef],
        bypass_governance: bool,
    ) -> StorageResult<Vec<DeletionOutcome>> {
        let objects = refs
            .iter()
            .map(|r| {
                ObjectIdentifier::builder()
                    .key(&r.key)
                    .version_id(&r.version_id)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| build_error("DeleteObjects", e))?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| build_error("DeleteObjects", e))?;

        let mut req = self.client.delete_objects().bucket(bucket).delete(delete);
        if bypass_governance {
            req = req.bypass_governance_retention(true);
        }

        let output = req
            .send()
            .await
            .map_err(|e| translate("DeleteObjects", e))?;

        Ok(output
            .errors()
            .iter()
            .map(|e| {
                DeletionOutcome::new(
                    e.key().unwrap_or_default(),
                    e.version_id().unwrap_or_default(),
                    e.code().unwrap_or_default(),
                    e.message().unwrap_or_default(),
                )
            })
            .collect())
    }

    async fn delete_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> StorageResult<()> {
        let hold = ObjectLockLegalHold::builder()
            .status(ObjectLockLegalHoldStatus::Off)
            .build();

        self.client
            .put_object_legal_hold()
            .bucket(bucket)
            .key(key)
            .version_id(version_id)
            .legal_hold(hold)
            .send()
            .await
            .map_err(|e| translate("PutObjectLegalHold", e))?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str, version_id: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .version_id(version_id)
            .send()
            .await
            .map_err(|e| translate("DeleteObject", e))?;
        Ok(())
    }

    async fn head_object(
        &self,
        bucket: &str,
        request: &HeadObjectRequest,
    ) -> StorageResult<ObjectHead> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(&request.key)
            .set_version_id(request.version_id.clone())
            .set_range(request.range.clone())
            .send()
            .await
            .map_err(|e| translate("HeadObject", e))?;

        Ok(ObjectHead {
            bucket_key_enabled: output.bucket_key_enabled().unwrap_or(false),
            cache_control: output.cache_control().map(str::to_owned),
            content_disposition: output.content_disposition().map(str::to_owned),
            content_encoding: output.content_encoding().map(str::to_owned),
            content_language: output.content_language().map(str::to_owned),
            content_length: output.content_length().unwrap_or(0),
            content_type: output.content_type().map(str::to_owned),
            delete_marker: output.delete_marker().unwrap_or(false),
            etag: output.e_tag().map(str::to_owned),
            last_modified: output
                .last_modified()
                .and_then(|t| t.fmt(DateTimeFormat::HttpDate).ok()),
            metadata: output.metadata().cloned().unwrap_or_default(),
            version_id: output.version_id().map(str::to_owned),
            website_redirect_location: output.website_redirect_location().map(str::to_owned),
        })
    }
}
