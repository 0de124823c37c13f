//! Bucket and object data sources

use std::collections::HashMap;

use cortx_core::provider::{ProviderError, ProviderResult};
use cortx_core::resource::{Resource, State, Value};

use crate::CortxProvider;
use crate::client::HeadObjectRequest;
use crate::endpoints;
use crate::validation::validate_object;

/// Identifier of an object data source: `bucket/key`, plus `?versionId=<id>`
/// when a specific version was requested
pub fn object_identifier(bucket: &str, key: &str, version_id: Option<&str>) -> String {
    match version_id {
        Some(version_id) => format!("{}/{}?versionId={}", bucket, key, version_id),
        None => format!("{}/{}", bucket, key),
    }
}

fn insert_optional(attributes: &mut HashMap<String, Value>, key: &str, value: Option<&String>) {
    if let Some(value) = value {
        attributes.insert(key.to_string(), Value::String(value.clone()));
    }
}

impl CortxProvider {
    pub(crate) async fn read_bucket_data_source(
        &self,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let id = resource.id.clone();
        let bucket = resource.get_string("bucket").unwrap_or(&id.name).to_string();

        self.client.head_bucket(&bucket).await.map_err(|e| {
            ProviderError::new(format!("Failed on HeadBucket ({}): {}", bucket, e))
                .for_resource(id.clone())
                .with_cause(e)
        })?;

        let region = self.client.get_bucket_location(&bucket).await.map_err(|e| {
            ProviderError::new(format!("Failed on GetBucketLocation ({}): {}", bucket, e))
                .for_resource(id.clone())
                .with_cause(e)
        })?;

        let hosted_zone_id = endpoints::hosted_zone_id(&region).ok_or_else(|| {
            ProviderError::new(format!(
                "Failed on GetBucketHostedZone ({}): no hosted zone for region {}",
                bucket, region
            ))
            .for_resource(id.clone())
        })?;

        let mut attributes = HashMap::new();
        attributes.insert("bucket".to_string(), Value::String(bucket.clone()));
        attributes.insert(
            "arn".to_string(),
            Value::String(endpoints::bucket_arn(&bucket)),
        );
        attributes.insert(
            "bucket_domain_name".to_string(),
            Value::String(endpoints::bucket_domain_name(&bucket)),
        );
        attributes.insert(
            "bucket_regional_domain_name".to_string(),
            Value::String(endpoints::bucket_regional_domain_name(&bucket, &region)),
        );
        attributes.insert(
            "hosted_zone_id".to_string(),
            Value::String(hosted_zone_id.to_string()),
        );
        attributes.insert(
            "website_domain".to_string(),
            Value::String(endpoints::website_domain(&region)),
        );
        attributes.insert(
            "website_endpoint".to_string(),
            Value::String(endpoints::website_endpoint(&bucket, &region)),
        );
        attributes.insert("region".to_string(), Value::String(region));

        Ok(State::existing(id, attributes).with_identifier(bucket))
    }

    pub(crate) async fn read_object_data_source(
        &self,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let id = resource.id.clone();
        validate_object(&resource.attributes).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            ProviderError::new(format!("Invalid object: {}", messages.join(", ")))
                .for_resource(id.clone())
        })?;

        let bucket = resource.get_string("bucket").unwrap_or_default();
        let request = HeadObjectRequest {
            key: resource.get_string("key").unwrap_or_default().to_string(),
            version_id: resource.get_string("version_id").map(str::to_owned),
            range: resource.get_string("range").map(str::to_owned),
        };
        let identifier = object_identifier(bucket, &request.key, request.version_id.as_deref());

        let head = self.client.head_object(bucket, &request).await.map_err(|e| {
            ProviderError::new(format!(
                "Failed getting Bucket ({}) Object ({}): {}",
                bucket, request.key, e
            ))
            .for_resource(id.clone())
            .with_cause(e)
        })?;

        if head.delete_marker {
            return Err(ProviderError::new(format!(
                "Requested Object ({}) has been deleted",
                identifier
            ))
            .for_resource(id));
        }

        let mut attributes = HashMap::new();
        attributes.insert("bucket".to_string(), Value::String(bucket.to_string()));
        attributes.insert("key".to_string(), Value::String(request.key.clone()));
        insert_optional(&mut attributes, "range", request.range.as_ref());
        attributes.insert(
            "bucket_key_enabled".to_string(),
            Value::Bool(head.bucket_key_enabled),
        );
        insert_optional(&mut attributes, "cache_control", head.cache_control.as_ref());
        insert_optional(
            &mut attributes,
            "content_disposition",
            head.content_disposition.as_ref(),
        );
        insert_optional(&mut attributes, "content_encoding", head.content_encoding.as_ref());
        insert_optional(&mut attributes, "content_language", head.content_language.as_ref());
        attributes.insert(
            "content_length".to_string(),
            Value::Int(head.content_length),
        );
        insert_optional(&mut attributes, "content_type", head.content_type.as_ref());
        if let Some(etag) = &head.etag {
            attributes.insert(
                "etag".to_string(),
                Value::String(etag.trim_matches('"').to_string()),
            );
        }
        insert_optional(&mut attributes, "last_modified", head.last_modified.as_ref());
        attributes.insert(
            "metadata".to_string(),
            Value::Map(
                head.metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        );
        insert_optional(&mut attributes, "version_id", head.version_id.as_ref());
        insert_optional(
            &mut attributes,
            "website_redirect_location",
            head.website_redirect_location.as_ref(),
        );

        Ok(State::existing(id, attributes).with_identifier(identifier))
    }
}
